//! Per-size auto-tuning: measured winners, a renderer static prior, and
//! the exhaustive learner that fills the map by micro-benchmarking
//! single-pass plans.

use crate::cache::ProgramCache;
use crate::context::GpuContext;
use crate::error::Result;
use crate::fft::{Fft, Surface};
use crate::options::{Candidate, OptionSpace};
use crate::plan::{self, PlanRequest, PlatformLimits};
use crate::types::{
    Direction, FftOptions, Kind, Mode, Parameters, Performance, Precision, Target,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Identity of one tuning slot: the facts that change which options win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SizeKey {
    /// Transform length along the pass axis, in complex elements.
    pub length: u32,
    pub radix: u32,
    /// p == 1 passes read with unit butterfly spacing and behave unlike
    /// later stages of the same radix.
    pub first_pass: bool,
    pub mode: Mode,
    pub input_target: Target,
    pub output_target: Target,
    pub fp16_core: bool,
    pub fp16_input: bool,
    pub fp16_output: bool,
}

impl SizeKey {
    pub fn for_pass(length: u32, params: &Parameters) -> SizeKey {
        SizeKey {
            length,
            radix: params.radix,
            first_pass: params.p1 != 0,
            mode: params.mode(),
            input_target: params.input_target(),
            output_target: params.output_target(),
            fp16_core: params.fft_fp16 != 0,
            fp16_input: params.input_fp16 != 0,
            fp16_output: params.output_fp16 != 0,
        }
    }
}

/// A measured winner: the options to use and the time that won them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Learned {
    pub performance: Performance,
    /// Mean seconds per dispatch measured for the winner.
    pub cost: f64,
}

/// Known-good defaults for a device family, keyed off a substring of the
/// renderer identity string. Data, not logic: extend the table to teach the
/// library about new hardware.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StaticPrior {
    pub fp32: Performance,
    pub fp16: Performance,
}

const fn prior(
    wg_x: u32,
    wg_y: u32,
    fp32_vector: u32,
    fp16_vector: u32,
    banked: bool,
) -> StaticPrior {
    StaticPrior {
        fp32: Performance {
            workgroup_size_x: wg_x,
            workgroup_size_y: wg_y,
            vector_size: fp32_vector,
            shared_banked: banked,
        },
        fp16: Performance {
            workgroup_size_x: wg_x,
            workgroup_size_y: wg_y,
            vector_size: fp16_vector,
            shared_banked: banked,
        },
    }
}

static STATIC_PRIORS: &[(&str, StaticPrior)] = &[
    ("GeForce", prior(32, 1, 2, 8, false)),
    ("NVIDIA", prior(32, 1, 2, 8, false)),
    ("Radeon", prior(64, 1, 2, 8, true)),
    ("AMD", prior(64, 1, 2, 8, true)),
    ("Intel", prior(16, 1, 2, 8, false)),
    ("Mali", prior(4, 1, 4, 8, false)),
    ("Adreno", prior(32, 2, 2, 8, false)),
    ("Apple", prior(32, 1, 2, 8, false)),
];

/// Benchmark knobs used during learning.
#[derive(Debug, Clone, Copy)]
pub struct BenchParams {
    pub warmup: u32,
    pub iterations: u32,
    pub dispatches: u32,
    pub max_time: f64,
}

impl Default for BenchParams {
    fn default() -> Self {
        BenchParams {
            warmup: 2,
            iterations: 20,
            dispatches: 50,
            max_time: 1.0,
        }
    }
}

#[derive(Debug, Default)]
pub struct Wisdom {
    entries: HashMap<SizeKey, Learned>,
    static_prior: Option<StaticPrior>,
    bench: BenchParams,
}

#[derive(Serialize, Deserialize)]
struct WisdomFile {
    static_prior: Option<StaticPrior>,
    entries: Vec<(SizeKey, Learned)>,
}

impl Wisdom {
    /// No measurements, no prior: lookups fall through to the caller's
    /// options.
    pub fn empty() -> Wisdom {
        Wisdom::default()
    }

    /// Wisdom seeded with the static prior matching a renderer identity
    /// string, if any.
    pub fn for_renderer(renderer: &str) -> Wisdom {
        let mut wisdom = Wisdom::empty();
        if let Some(prior) = Wisdom::static_prior_from_renderer(renderer) {
            wisdom.set_static_prior(prior);
        }
        wisdom
    }

    /// Look up the prior table by renderer substring.
    pub fn static_prior_from_renderer(renderer: &str) -> Option<StaticPrior> {
        STATIC_PRIORS
            .iter()
            .find(|(needle, _)| renderer.contains(needle))
            .map(|(name, prior)| {
                log::info!("static wisdom matched renderer family {name}");
                *prior
            })
    }

    pub fn set_static_prior(&mut self, prior: StaticPrior) {
        self.static_prior = Some(prior);
    }

    pub fn set_bench_params(&mut self, warmup: u32, iterations: u32, dispatches: u32, max_time: f64) {
        self.bench = BenchParams {
            warmup,
            iterations,
            dispatches,
            max_time,
        };
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, key: &SizeKey) -> Option<&Learned> {
        self.entries.get(key)
    }

    /// Best-known options for a slot: a measured winner, else the static
    /// prior for the precision profile, else the caller's fallback.
    pub fn recommend(&self, key: &SizeKey, fallback: &Performance) -> Performance {
        if let Some(learned) = self.entries.get(key) {
            return learned.performance;
        }
        if let Some(prior) = &self.static_prior {
            return if key.fp16_core { prior.fp16 } else { prior.fp32 };
        }
        *fallback
    }

    /// Learn winners for every distinct (length, pass-position, surface)
    /// tuple a transform of this shape will use, by exhaustively
    /// benchmarking the legal candidates on single-pass plans.
    #[allow(clippy::too_many_arguments)]
    pub fn learn_optimal_options_exhaustive(
        &mut self,
        ctx: &GpuContext,
        cache: &Arc<ProgramCache>,
        nx: u32,
        ny: u32,
        kind: Kind,
        input_target: Target,
        output_target: Target,
        precision: Precision,
    ) -> Result<()> {
        let req = PlanRequest {
            nx,
            ny,
            kind,
            direction: if kind == Kind::ComplexToReal {
                Direction::Inverse
            } else {
                Direction::Forward
            },
            input_target,
            output_target,
            options: FftOptions {
                performance: Performance::default(),
                precision,
            },
        };
        let limits = PlatformLimits {
            max_invocations: ctx.max_workgroup_invocations(),
            max_shared_bytes: ctx.max_shared_bytes(),
        };

        // Scratch surfaces sized for the worst-case segment any tuple will
        // see: the full field, so single-pass benches observe the same
        // strides the full plan will use.
        let probe = plan::build(&req, &limits, &self.provisional())?;
        let scratch_bytes = probe
            .input_bytes
            .max(probe.output_bytes)
            .max(probe.temp_bytes);
        let input_buffer = ctx.create_storage_buffer(scratch_bytes, "wisdom scratch in");
        let output_buffer = ctx.create_storage_buffer(scratch_bytes, "wisdom scratch out");
        let textures = ScratchTextures::new(ctx, &req);
        let bench = self.bench;

        self.learn_exhaustive_with(&req, &limits, |key, candidate| {
            let mut options = req.options;
            options.performance = candidate.performance;
            let stage_req = PlanRequest {
                input_target: key.input_target,
                output_target: key.output_target,
                options,
                ..req
            };
            let p = if key.first_pass {
                1
            } else {
                (key.length / key.radix).min(key.radix).max(1)
            };
            let fft = Fft::new_single_stage(ctx, Arc::clone(cache), &stage_req, key.radix, p, key.mode)?;

            let input = match key.input_target {
                Target::Ssbo => Surface::Buffer(&input_buffer),
                _ => Surface::Texture(textures.input_view.as_ref().expect("textured tuple without scratch texture")),
            };
            let output = match key.output_target {
                Target::Ssbo => Surface::Buffer(&output_buffer),
                _ => Surface::Texture(textures.output_view.as_ref().expect("textured tuple without scratch texture")),
            };

            let result = fft.bench(
                ctx,
                output,
                input,
                bench.warmup,
                bench.iterations,
                bench.dispatches,
                bench.max_time,
            )?;
            Ok(result.average_seconds)
        })
    }

    /// The learning core, with the measurement injected. Deterministic for
    /// a deterministic measurement function.
    pub(crate) fn learn_exhaustive_with(
        &mut self,
        req: &PlanRequest,
        limits: &PlatformLimits,
        mut measure: impl FnMut(&SizeKey, &Candidate) -> Result<f64>,
    ) -> Result<()> {
        let probe = plan::build(req, limits, &self.provisional())?;

        let mut tuples: Vec<SizeKey> = Vec::new();
        for pass in &probe.passes {
            let key = SizeKey::for_pass(pass.uniforms.n_axis, &pass.parameters);
            if !tuples.contains(&key) {
                tuples.push(key);
            }
        }

        for key in tuples {
            let space = OptionSpace {
                length: key.length,
                vertical: key.mode.is_vertical(),
                surface_components: req.kind.components(),
                fp16_core: key.fp16_core,
                max_invocations: limits.max_invocations,
                max_shared_bytes: limits.max_shared_bytes,
            };

            let mut winner: Option<(f64, f64, Candidate)> = None;
            for candidate in space.candidates() {
                if candidate.radix != key.radix {
                    continue;
                }
                if key.mode.is_resolve()
                    && (candidate.performance.vector_size != 2
                        || candidate.performance.shared_banked)
                {
                    continue;
                }
                let seconds = measure(&key, &candidate)?;
                let model = crate::cost::pass_cost(
                    key.radix,
                    &candidate.performance,
                    req.kind.components(),
                    !key.first_pass,
                );
                log::debug!(
                    "  candidate wg {}x{} v{} banked {}: {:.3} us",
                    candidate.performance.workgroup_size_x,
                    candidate.performance.workgroup_size_y,
                    candidate.performance.vector_size,
                    candidate.performance.shared_banked,
                    seconds * 1e6
                );
                let area = candidate.performance.workgroup_size_x
                    * candidate.performance.workgroup_size_y;
                let is_better = match &winner {
                    None => true,
                    Some((best_seconds, best_model, best)) => {
                        let best_area =
                            best.performance.workgroup_size_x * best.performance.workgroup_size_y;
                        (seconds, model, area) < (*best_seconds, *best_model, best_area)
                    }
                };
                if is_better {
                    winner = Some((seconds, model, candidate));
                }
            }

            if let Some((seconds, _, candidate)) = winner {
                log::info!(
                    "wisdom: len {} radix {} {:?}{} -> wg {}x{} v{} banked {} ({:.3} us)",
                    key.length,
                    key.radix,
                    key.mode,
                    if key.first_pass { " p1" } else { "" },
                    candidate.performance.workgroup_size_x,
                    candidate.performance.workgroup_size_y,
                    candidate.performance.vector_size,
                    candidate.performance.shared_banked,
                    seconds * 1e6
                );
                self.entries.insert(
                    key,
                    Learned {
                        performance: candidate.performance,
                        cost: seconds,
                    },
                );
            }
        }
        Ok(())
    }

    /// The wisdom used for provisional decomposition during learning: the
    /// prior carries over, measured entries do not, so the tuple discovery
    /// never depends on earlier learning runs.
    fn provisional(&self) -> Wisdom {
        Wisdom {
            entries: HashMap::new(),
            static_prior: self.static_prior,
            bench: self.bench,
        }
    }

    pub fn to_json(&self) -> String {
        let mut entries: Vec<(SizeKey, Learned)> =
            self.entries.iter().map(|(k, v)| (*k, *v)).collect();
        entries.sort_by_key(|(k, _)| *k);
        serde_json::to_string_pretty(&WisdomFile {
            static_prior: self.static_prior,
            entries,
        })
        .expect("wisdom serialization cannot fail")
    }

    pub fn from_json(json: &str) -> anyhow::Result<Wisdom> {
        let file: WisdomFile = serde_json::from_str(json)?;
        Ok(Wisdom {
            entries: file.entries.into_iter().collect(),
            static_prior: file.static_prior,
            bench: BenchParams::default(),
        })
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        std::fs::write(path, self.to_json())?;
        Ok(())
    }

    pub fn load(path: &Path) -> anyhow::Result<Wisdom> {
        Wisdom::from_json(&std::fs::read_to_string(path)?)
    }
}

struct ScratchTextures {
    _input: Option<wgpu::Texture>,
    input_view: Option<wgpu::TextureView>,
    _output: Option<wgpu::Texture>,
    output_view: Option<wgpu::TextureView>,
}

impl ScratchTextures {
    fn new(ctx: &GpuContext, req: &PlanRequest) -> ScratchTextures {
        let make = |target: Target, fp16: bool, storage: bool, label: &str| {
            let format = match (target, req.kind, fp16) {
                (Target::ImageReal, _, _) => wgpu::TextureFormat::R32Float,
                (_, Kind::ComplexToComplexDual, false) => wgpu::TextureFormat::Rgba32Float,
                (_, _, true) => wgpu::TextureFormat::Rgba16Float,
                _ => wgpu::TextureFormat::Rg32Float,
            };
            let texture = if storage {
                ctx.create_storage_texture(req.nx.max(2), req.ny, format, label)
            } else {
                ctx.create_sampled_texture(req.nx.max(2), req.ny, format, label)
            };
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            (texture, view)
        };

        let (input, input_view) = if req.input_target != Target::Ssbo {
            let (t, v) = make(
                req.input_target,
                req.options.precision.input_fp16,
                false,
                "wisdom scratch tex in",
            );
            (Some(t), Some(v))
        } else {
            (None, None)
        };
        let (output, output_view) = if req.output_target != Target::Ssbo {
            let (t, v) = make(
                req.output_target,
                req.options.precision.output_fp16,
                true,
                "wisdom scratch tex out",
            );
            (Some(t), Some(v))
        } else {
            (None, None)
        };

        ScratchTextures {
            _input: input,
            input_view,
            _output: output,
            output_view,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> PlatformLimits {
        PlatformLimits {
            max_invocations: 256,
            max_shared_bytes: 16384,
        }
    }

    fn request(nx: u32, ny: u32) -> PlanRequest {
        PlanRequest {
            nx,
            ny,
            kind: Kind::ComplexToComplex,
            direction: Direction::Forward,
            input_target: Target::Ssbo,
            output_target: Target::Ssbo,
            options: FftOptions::default(),
        }
    }

    /// A deterministic fake timer: prefers wide vectors, then bigger
    /// workgroups, with a device-like bias.
    fn fake_measure(_key: &SizeKey, candidate: &Candidate) -> Result<f64> {
        let perf = &candidate.performance;
        let threads = (perf.workgroup_size_x * perf.workgroup_size_y) as f64;
        Ok(1.0 / (threads.min(64.0) * f64::from(perf.vector_size)))
    }

    #[test]
    fn learning_is_idempotent() {
        let req = request(256, 64);
        let mut wisdom = Wisdom::empty();
        wisdom
            .learn_exhaustive_with(&req, &limits(), fake_measure)
            .unwrap();
        let first = wisdom.to_json();

        wisdom
            .learn_exhaustive_with(&req, &limits(), fake_measure)
            .unwrap();
        assert_eq!(first, wisdom.to_json());
    }

    #[test]
    fn learning_covers_both_axes() {
        let req = request(256, 64);
        let mut wisdom = Wisdom::empty();
        wisdom
            .learn_exhaustive_with(&req, &limits(), fake_measure)
            .unwrap();
        assert!(!wisdom.is_empty());
        let has_horizontal = wisdom.entries.keys().any(|k| k.mode == Mode::Horizontal);
        let has_vertical = wisdom.entries.keys().any(|k| k.mode == Mode::Vertical);
        assert!(has_horizontal && has_vertical);
    }

    #[test]
    fn measured_winner_feeds_recommendations() {
        let req = request(64, 1);
        let mut wisdom = Wisdom::empty();
        // A measurement that only rewards four lines per workgroup.
        wisdom
            .learn_exhaustive_with(&req, &limits(), |_, c| {
                Ok(if c.performance.workgroup_size_y == 4 {
                    1.0
                } else {
                    2.0
                })
            })
            .unwrap();
        let key = *wisdom.entries.keys().next().unwrap();
        let perf = wisdom.recommend(&key, &Performance::default());
        assert_eq!(perf.workgroup_size_y, 4);
    }

    #[test]
    fn constant_measurements_break_ties_deterministically() {
        let req = request(128, 1);
        let mut a = Wisdom::empty();
        let mut b = Wisdom::empty();
        a.learn_exhaustive_with(&req, &limits(), |_, _| Ok(1.0)).unwrap();
        b.learn_exhaustive_with(&req, &limits(), |_, _| Ok(1.0)).unwrap();
        assert_eq!(a.to_json(), b.to_json());
    }

    #[test]
    fn recommend_falls_back_through_prior_to_options() {
        let key = SizeKey {
            length: 64,
            radix: 4,
            first_pass: true,
            mode: Mode::Horizontal,
            input_target: Target::Ssbo,
            output_target: Target::Ssbo,
            fp16_core: false,
            fp16_input: false,
            fp16_output: false,
        };
        let fallback = Performance {
            workgroup_size_x: 2,
            ..Performance::default()
        };

        let empty = Wisdom::empty();
        assert_eq!(empty.recommend(&key, &fallback), fallback);

        let seeded = Wisdom::for_renderer("NVIDIA GeForce RTX 4070");
        assert_eq!(seeded.recommend(&key, &fallback).workgroup_size_x, 32);

        let fp16_key = SizeKey {
            fp16_core: true,
            ..key
        };
        assert_eq!(seeded.recommend(&fp16_key, &fallback).vector_size, 8);
    }

    #[test]
    fn unknown_renderer_has_no_prior() {
        assert!(Wisdom::static_prior_from_renderer("llvmpipe (LLVM 17)").is_none());
    }

    #[test]
    fn json_round_trip_preserves_entries() {
        let req = request(128, 1);
        let mut wisdom = Wisdom::empty();
        wisdom.set_static_prior(STATIC_PRIORS[0].1);
        wisdom
            .learn_exhaustive_with(&req, &limits(), fake_measure)
            .unwrap();

        let restored = Wisdom::from_json(&wisdom.to_json()).unwrap();
        assert_eq!(restored.to_json(), wisdom.to_json());
        assert_eq!(restored.len(), wisdom.len());
    }
}
