//! Plan construction: decompose a transform request into an ordered list of
//! fully specialized passes.
//!
//! Building happens in two phases. The sketch phase picks the radix
//! sequence per axis (dynamic programming over the cost model, wisdom
//! consulted per radix) and lays out resolve passes for the real kinds.
//! The assembly phase routes surfaces through the ping-pong temporaries,
//! fixes per-pass precision at the user-facing edges, legalizes the
//! recommended workgroup geometry and emits the final parameter records.
//!
//! Everything here is pure CPU work: given the same request, limits and
//! wisdom, the emitted pass list is byte-identical.

use crate::cost;
use crate::error::{FftError, Result};
use crate::options::{shared_sub_radix, OptionSpace};
use crate::shader::PassUniforms;
use crate::types::{
    BarrierMask, Direction, FftOptions, Kind, Mode, Parameters, Performance, Precision, Target,
};
use crate::wisdom::{SizeKey, Wisdom};

pub const MAX_DIMENSION: u32 = 1 << 20;

/// A full transform request, independent of any GPU object.
#[derive(Debug, Clone, Copy)]
pub struct PlanRequest {
    pub nx: u32,
    pub ny: u32,
    pub kind: Kind,
    pub direction: Direction,
    pub input_target: Target,
    pub output_target: Target,
    pub options: FftOptions,
}

/// Platform facts the builder needs, captured from the context once.
#[derive(Debug, Clone, Copy)]
pub struct PlatformLimits {
    pub max_invocations: u32,
    pub max_shared_bytes: u32,
}

/// Which resource a pass reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    UserInput,
    UserOutput,
    TempA,
    TempB,
}

/// One fully specialized pass, ready for program lookup and dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassSpec {
    pub parameters: Parameters,
    pub uniforms: PassUniforms,
    pub workgroups_x: u32,
    pub workgroups_y: u32,
    /// Texel-per-element factor along x for sampled input (2 when a complex
    /// element spans two real texels).
    pub uv_scale_x: u32,
    pub barriers: BarrierMask,
    pub input: Route,
    pub output: Route,
}

/// The assembled plan: passes plus the byte footprints the runtime needs
/// for allocation and contract checks.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanLayout {
    pub passes: Vec<PassSpec>,
    pub cost: f64,
    pub temp_bytes: u64,
    pub input_bytes: u64,
    pub output_bytes: u64,
}

fn element_bytes(components: u32, fp16: bool) -> u64 {
    u64::from(components) * if fp16 { 2 } else { 4 }
}

/// Complex row widths of the user input field, the interior field, and the
/// user output field.
fn row_widths(req: &PlanRequest) -> (u32, u32, u32) {
    match req.kind {
        Kind::ComplexToComplex | Kind::ComplexToComplexDual => (req.nx, req.nx, req.nx),
        Kind::RealToComplex => (req.nx / 2, req.nx / 2, req.nx / 2 + 1),
        Kind::ComplexToReal => (req.nx / 2 + 1, req.nx / 2, req.nx / 2),
    }
}

fn validate(req: &PlanRequest) -> Result<()> {
    for (name, n) in [("Nx", req.nx), ("Ny", req.ny)] {
        if n == 0 || !n.is_power_of_two() {
            return Err(FftError::Configuration(format!(
                "{name} = {n} is not a positive power of two"
            )));
        }
        if n > MAX_DIMENSION {
            return Err(FftError::Configuration(format!(
                "{name} = {n} exceeds the supported maximum of {MAX_DIMENSION}"
            )));
        }
    }
    if req.nx < 2 {
        return Err(FftError::Configuration(
            "Nx must be at least 2 elements".into(),
        ));
    }
    if req.kind.is_real() && req.nx < 4 {
        return Err(FftError::Configuration(format!(
            "real transforms need Nx >= 4, got {}",
            req.nx
        )));
    }

    let supported = match (req.input_target, req.output_target) {
        (Target::Ssbo, Target::Ssbo) => true,
        (Target::Image, Target::Ssbo) => !matches!(req.kind, Kind::RealToComplex),
        (Target::ImageReal, Target::Ssbo) => req.kind == Kind::RealToComplex,
        (Target::Ssbo, Target::Image) => req.kind != Kind::ComplexToReal,
        (Target::Ssbo, Target::ImageReal) => req.kind == Kind::ComplexToReal,
        // Image to image is not supported in any combination.
        _ => false,
    };
    if !supported {
        return Err(FftError::Configuration(format!(
            "unsupported combination: {:?} from {:?} to {:?}",
            req.kind, req.input_target, req.output_target
        )));
    }

    match req.kind {
        Kind::RealToComplex if req.direction != Direction::Forward => {
            return Err(FftError::Configuration(
                "R2C only supports the forward direction".into(),
            ));
        }
        Kind::ComplexToReal if req.direction != Direction::Inverse => {
            return Err(FftError::Configuration(
                "C2R only supports the inverse direction".into(),
            ));
        }
        _ => {}
    }
    Ok(())
}

/// Clamp a recommended performance tuple to something the kernels accept
/// for this context. Preference order: keep the recommendation, shrink it,
/// and only fall back to the cheapest enumerated candidate if repair fails.
fn legalize(radix: u32, recommended: &Performance, space: &OptionSpace) -> Option<Performance> {
    let mut perf = *recommended;

    if perf.vector_size == 8 && !space.fp16_core {
        perf.vector_size = 2;
    }
    if perf.vector_size == 4 && space.surface_components < 4 {
        perf.vector_size = 2;
    }
    if !matches!(perf.vector_size, 2 | 4 | 8) {
        perf.vector_size = 2;
    }
    if radix <= 8 {
        perf.shared_banked = false;
    }

    let (mut axis_wg, mut transverse_wg) = if space.vertical {
        (perf.workgroup_size_y, perf.workgroup_size_x)
    } else {
        (perf.workgroup_size_x, perf.workgroup_size_y)
    };
    if !axis_wg.is_power_of_two() || !transverse_wg.is_power_of_two() {
        return space.best_for_radix(radix).map(|c| c.performance);
    }

    let sub = shared_sub_radix(radix).unwrap_or(1);
    let cpt = perf.vector_size / 2;
    if space.length % radix != 0 || (space.length / radix) % cpt != 0 {
        return space.best_for_radix(radix).map(|c| c.performance);
    }
    let threads_axis = sub * (space.length / radix / cpt);
    axis_wg = axis_wg.clamp(sub, 128);
    while axis_wg > sub && threads_axis % axis_wg != 0 {
        axis_wg /= 2;
    }
    while axis_wg * transverse_wg > space.max_invocations && transverse_wg > 1 {
        transverse_wg /= 2;
    }

    let repaired = if space.vertical {
        Performance {
            workgroup_size_x: transverse_wg,
            workgroup_size_y: axis_wg,
            ..perf
        }
    } else {
        Performance {
            workgroup_size_x: axis_wg,
            workgroup_size_y: transverse_wg,
            ..perf
        }
    };

    if space.allows(radix, &repaired) {
        Some(repaired)
    } else {
        space.best_for_radix(radix).map(|c| c.performance)
    }
}

/// Pick the radix sequence for one axis, minimizing summed model cost.
/// Ties break toward fewer passes, then toward larger early radices.
///
/// `per_radix` is probed with the pass position: the leading pass runs at
/// p == 1 and its learned options (and stride behavior) differ from the
/// later stages of the same radix.
fn decompose_axis(
    length: u32,
    mut per_radix: impl FnMut(u32, bool) -> Option<f64>,
) -> Result<Vec<u32>> {
    #[derive(Clone)]
    struct Choice {
        cost: f64,
        seq: Vec<u32>,
    }

    fn better(a: &Choice, b: &Choice) -> bool {
        if (a.cost - b.cost).abs() > 1e-9 {
            return a.cost < b.cost;
        }
        if a.seq.len() != b.seq.len() {
            return a.seq.len() < b.seq.len();
        }
        a.seq > b.seq
    }

    let n = length.trailing_zeros() as usize;
    if n == 0 {
        return Ok(Vec::new());
    }

    // dp[m]: best suffix covering m log2 units, every pass at p > 1.
    let mut dp: Vec<Option<Choice>> = vec![None; n];
    dp[0] = Some(Choice {
        cost: 0.0,
        seq: Vec::new(),
    });

    for m in 1..n {
        for part in [6usize, 4, 3, 2, 1] {
            if part > m {
                continue;
            }
            let radix = 1u32 << part;
            let Some(pass_cost) = per_radix(radix, false) else {
                continue;
            };
            let Some(prev) = dp[m - part].clone() else {
                continue;
            };
            let mut seq = Vec::with_capacity(prev.seq.len() + 1);
            seq.push(radix);
            seq.extend_from_slice(&prev.seq);
            let candidate = Choice {
                cost: pass_cost + prev.cost,
                seq,
            };
            match &dp[m] {
                Some(best) if !better(&candidate, best) => {}
                _ => dp[m] = Some(candidate),
            }
        }
    }

    let mut best: Option<Choice> = None;
    for part in [6usize, 4, 3, 2, 1] {
        if part > n {
            continue;
        }
        let radix = 1u32 << part;
        let Some(first_cost) = per_radix(radix, true) else {
            continue;
        };
        let Some(rest) = dp[n - part].clone() else {
            continue;
        };
        let mut seq = Vec::with_capacity(rest.seq.len() + 1);
        seq.push(radix);
        seq.extend_from_slice(&rest.seq);
        let candidate = Choice {
            cost: first_cost + rest.cost,
            seq,
        };
        match &best {
            Some(b) if !better(&candidate, b) => {}
            _ => best = Some(candidate),
        }
    }

    best.map(|c| c.seq)
        .ok_or_else(|| FftError::Configuration(format!("no legal decomposition for length {length}")))
}

/// Phase-1 stage description, before surfaces and precision are routed.
#[derive(Debug, Clone, Copy)]
enum Stage {
    Stockham { radix: u32, p: u32, vertical: bool },
    Resolve { real_to_complex: bool },
}

fn sketch(req: &PlanRequest, limits: &PlatformLimits, wisdom: &Wisdom) -> Result<Vec<Stage>> {
    let (_, interior_row, _) = row_widths(req);
    let comps = req.kind.components();
    let fp16_core = req.options.precision.fp16;

    let axis_sequence = |length: u32, vertical: bool| -> Result<Vec<u32>> {
        let space = OptionSpace {
            length,
            vertical,
            surface_components: comps,
            fp16_core,
            max_invocations: limits.max_invocations,
            max_shared_bytes: limits.max_shared_bytes,
        };
        decompose_axis(length, |radix, first| {
            let key = SizeKey {
                length,
                radix,
                first_pass: first,
                mode: stockham_mode(req.kind, vertical),
                input_target: Target::Ssbo,
                output_target: Target::Ssbo,
                fp16_core,
                fp16_input: fp16_core,
                fp16_output: fp16_core,
            };
            let recommended = wisdom.recommend(&key, &req.options.performance);
            let perf = legalize(radix, &recommended, &space)?;
            // Every pass past the first scatters at stride p > 1.
            Some(cost::pass_cost(radix, &perf, comps, !first))
        })
    };

    let mut stages = Vec::new();
    if req.kind == Kind::ComplexToReal {
        stages.push(Stage::Resolve {
            real_to_complex: false,
        });
    }

    let mut p = 1;
    for radix in axis_sequence(interior_row, false)? {
        stages.push(Stage::Stockham {
            radix,
            p,
            vertical: false,
        });
        p *= radix;
    }

    if req.ny > 1 {
        let mut p = 1;
        for radix in axis_sequence(req.ny, true)? {
            stages.push(Stage::Stockham {
                radix,
                p,
                vertical: true,
            });
            p *= radix;
        }
    }

    if req.kind == Kind::RealToComplex {
        stages.push(Stage::Resolve {
            real_to_complex: true,
        });
    }

    Ok(stages)
}

fn stockham_mode(kind: Kind, vertical: bool) -> Mode {
    match (kind == Kind::ComplexToComplexDual, vertical) {
        (false, false) => Mode::Horizontal,
        (false, true) => Mode::Vertical,
        (true, false) => Mode::HorizontalDual,
        (true, true) => Mode::VerticalDual,
    }
}

/// Assembly: routes, precision edges, geometry, uniforms, barriers.
fn assemble(req: &PlanRequest, limits: &PlatformLimits, wisdom: &Wisdom, stages: &[Stage]) -> Result<PlanLayout> {
    let (input_row, interior_row, output_row) = row_widths(req);
    let comps = req.kind.components();
    let precision = req.options.precision;
    let count = stages.len();
    let mut passes = Vec::with_capacity(count);
    let mut total_cost = 0.0;

    for (index, stage) in stages.iter().enumerate() {
        let first = index == 0;
        let last = index + 1 == count;

        let input = if first {
            Route::UserInput
        } else if index % 2 == 1 {
            Route::TempA
        } else {
            Route::TempB
        };
        let output = if last {
            Route::UserOutput
        } else if index % 2 == 0 {
            Route::TempA
        } else {
            Route::TempB
        };

        let input_target = if first { req.input_target } else { Target::Ssbo };
        let output_target = if last { req.output_target } else { Target::Ssbo };

        // Interior hops inherit the core storage precision; the user-facing
        // edges follow the io flags.
        let pass_precision = Precision {
            fp16: precision.fp16,
            input_fp16: if first { precision.input_fp16 } else { precision.fp16 },
            output_fp16: if last { precision.output_fp16 } else { precision.fp16 },
            normalize: precision.normalize,
        };

        // Row widths only deviate from the interior field at the resolve
        // boundaries; every Stockham pass sees interior strides, which also
        // keeps single-stage benchmark plans faithful to the full plan.
        let (mode, radix, p, n_axis, vertical, in_row, out_row) = match *stage {
            Stage::Stockham { radix, p, vertical } => (
                stockham_mode(req.kind, vertical),
                radix,
                p,
                if vertical { req.ny } else { interior_row },
                vertical,
                interior_row,
                interior_row,
            ),
            Stage::Resolve { real_to_complex } => (
                if real_to_complex {
                    Mode::ResolveRealToComplex
                } else {
                    Mode::ResolveComplexToReal
                },
                2,
                1,
                req.nx / 2,
                false,
                if real_to_complex { interior_row } else { input_row },
                if real_to_complex { output_row } else { interior_row },
            ),
        };

        let direction = if req.direction == Direction::InverseConvolve && !first {
            Direction::Inverse
        } else {
            req.direction
        };

        let space = OptionSpace {
            length: n_axis,
            vertical,
            surface_components: comps,
            fp16_core: precision.fp16,
            max_invocations: limits.max_invocations,
            max_shared_bytes: limits.max_shared_bytes,
        };

        let is_resolve = matches!(stage, Stage::Resolve { .. });
        let key = SizeKey {
            length: n_axis,
            radix,
            first_pass: !is_resolve && p == 1,
            mode,
            input_target,
            output_target,
            fp16_core: pass_precision.fp16,
            fp16_input: pass_precision.input_fp16,
            fp16_output: pass_precision.output_fp16,
        };
        let mut perf = wisdom.recommend(&key, &req.options.performance);
        if is_resolve {
            // The combine stage is one thread per spectrum element.
            perf.vector_size = 2;
            perf.shared_banked = false;
        } else {
            perf = legalize(radix, &perf, &space).ok_or_else(|| {
                FftError::Configuration(format!(
                    "no legal workgroup geometry for radix {radix} over length {n_axis}"
                ))
            })?;
        }
        if perf.workgroup_size_x * perf.workgroup_size_y > limits.max_invocations {
            return Err(FftError::Configuration(format!(
                "workgroup {}x{} exceeds the platform limit of {} invocations",
                perf.workgroup_size_x, perf.workgroup_size_y, limits.max_invocations
            )));
        }

        // Butterfly scatter spacing is the Stockham p: a power of two
        // greater than one on every pass past the first of its axis.
        let pow2_stride = !is_resolve && p > 1;
        let parameters = Parameters::new(
            perf,
            pass_precision,
            radix,
            direction,
            mode,
            input_target,
            output_target,
            !is_resolve && p == 1,
            pow2_stride,
        );

        let lines = if vertical { interior_row } else { req.ny };
        let (in_stride, in_line_stride, out_stride, out_line_stride) = if vertical {
            (in_row, 1, out_row, 1)
        } else {
            (1, in_row, 1, out_row)
        };

        let norm_scale = if precision.normalize && direction.is_inverse() && !is_resolve && p == 1
        {
            1.0 / n_axis as f32
        } else {
            1.0
        };

        let uniforms = PassUniforms {
            p,
            n_axis,
            in_stride,
            in_line_stride,
            out_stride,
            out_line_stride,
            lines,
            norm_scale,
            uv_offset: [0.0; 2],
            uv_scale: [0.0; 2],
        };

        let (workgroups_x, workgroups_y) = if is_resolve {
            (
                n_axis.div_ceil(perf.workgroup_size_x),
                lines.div_ceil(perf.workgroup_size_y),
            )
        } else {
            let sub = shared_sub_radix(radix).unwrap_or(1);
            let cpt = perf.vector_size / 2;
            let threads_axis = sub * (n_axis / radix / cpt);
            if vertical {
                (
                    lines.div_ceil(perf.workgroup_size_x),
                    threads_axis / perf.workgroup_size_y,
                )
            } else {
                (
                    threads_axis / perf.workgroup_size_x,
                    lines.div_ceil(perf.workgroup_size_y),
                )
            }
        };

        total_cost += cost::pass_cost(radix, &perf, comps, pow2_stride);

        passes.push(PassSpec {
            parameters,
            uniforms,
            workgroups_x,
            workgroups_y,
            uv_scale_x: if input_target == Target::ImageReal { 2 } else { 1 },
            barriers: if last {
                BarrierMask::ALL
            } else {
                BarrierMask::STORAGE_BUFFER
            },
            input,
            output,
        });
    }

    let temp_bytes = if count > 1 {
        u64::from(interior_row)
            * u64::from(req.ny)
            * element_bytes(comps, precision.fp16)
    } else {
        0
    };

    Ok(PlanLayout {
        passes,
        cost: total_cost,
        temp_bytes,
        input_bytes: u64::from(input_row)
            * u64::from(req.ny)
            * element_bytes(comps, precision.input_fp16),
        output_bytes: u64::from(output_row)
            * u64::from(req.ny)
            * element_bytes(comps, precision.output_fp16),
    })
}

/// Build a complete plan for a request.
pub fn build(req: &PlanRequest, limits: &PlatformLimits, wisdom: &Wisdom) -> Result<PlanLayout> {
    validate(req)?;
    let stages = sketch(req, limits, wisdom)?;
    let layout = assemble(req, limits, wisdom, &stages)?;
    log::debug!(
        "plan {}x{} {:?} {:?}: {} passes, cost {:.2}",
        req.nx,
        req.ny,
        req.kind,
        req.direction,
        layout.passes.len(),
        layout.cost
    );
    Ok(layout)
}

/// Build a single-stage plan: one Stockham (or resolve) pass with explicit
/// radix and p, used by benchmarking and wisdom learning.
pub fn single_stage(
    req: &PlanRequest,
    limits: &PlatformLimits,
    radix: u32,
    p: u32,
    mode: Mode,
) -> Result<PlanLayout> {
    validate_single(req, radix, mode)?;
    let stages = [match mode {
        Mode::ResolveRealToComplex => Stage::Resolve {
            real_to_complex: true,
        },
        Mode::ResolveComplexToReal => Stage::Resolve {
            real_to_complex: false,
        },
        _ => Stage::Stockham {
            radix,
            p,
            vertical: mode.is_vertical(),
        },
    }];
    // A one-pass plan: wisdom is not consulted, the caller's performance
    // options are taken as-is (then legalized).
    assemble(req, limits, &Wisdom::empty(), &stages)
}

fn validate_single(req: &PlanRequest, radix: u32, mode: Mode) -> Result<()> {
    validate(req)?;
    if !mode.is_resolve() {
        let length = if mode.is_vertical() {
            req.ny
        } else {
            row_widths(req).1
        };
        if !crate::options::RADICES.contains(&radix) || length % radix != 0 {
            return Err(FftError::Configuration(format!(
                "radix {radix} does not divide axis length {length}"
            )));
        }
    }
    Ok(())
}
