//! Conformance and benchmark front-end.
//!
//! `wgfft test` runs the numbered conformance matrix against the CPU
//! reference; `wgfft bench` auto-tunes and times one transform shape.

use anyhow::{anyhow, bail, Result};
use rand::{Rng, SeedableRng};
use std::process::ExitCode;
use std::sync::Arc;
use wgfft::{
    reference, Direction, Fft, FftOptions, GpuContext, Kind, ProgramCache, Surface, Target, Wisdom,
};

fn main() -> ExitCode {
    env_logger::init();
    let args: Vec<String> = std::env::args().skip(1).collect();

    let outcome = match args.first().map(String::as_str) {
        Some("test") => cli_test(&args[1..]),
        Some("bench") => cli_bench(&args[1..]),
        Some("help") => {
            print_help();
            Ok(true)
        }
        _ => {
            print_help();
            Ok(false)
        }
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn print_help() {
    println!("Usage: wgfft [test | bench | help] (args...)");
    println!();
    println!("test  [--test N] [--test-range A B] [--test-all] [--exit-on-fail]");
    println!("      [--minimum-snr-fp16 dB] [--minimum-snr-fp32 dB]");
    println!("      [--epsilon-fp16 e] [--epsilon-fp32 e]");
    println!("bench [--width W] [--height H] [--warmup n] [--iterations n]");
    println!("      [--dispatches n] [--timeout s] [--type T] [--fp16]");
    println!("      [--input-texture] [--output-texture]");
    println!("      T: ComplexToComplex, ComplexToComplexDual, ComplexToReal, RealToComplex");
}

// ---------------------------------------------------------------------------
// test

struct SuiteArgs {
    test_min: usize,
    test_max: usize,
    exhaustive: bool,
    exit_on_fail: bool,
    min_snr_fp16: f64,
    min_snr_fp32: f64,
    epsilon_fp16: f64,
    epsilon_fp32: f64,
}

impl Default for SuiteArgs {
    fn default() -> Self {
        SuiteArgs {
            test_min: 0,
            test_max: usize::MAX,
            exhaustive: true,
            exit_on_fail: false,
            min_snr_fp16: 50.0,
            min_snr_fp32: 100.0,
            epsilon_fp16: 1e-3,
            epsilon_fp32: 1e-6,
        }
    }
}

fn cli_test(args: &[String]) -> Result<bool> {
    let mut suite = SuiteArgs::default();
    let mut i = 0;
    while i < args.len() {
        let take = |offset: usize| -> Result<&String> {
            args.get(i + offset)
                .ok_or_else(|| anyhow!("missing value for {}", args[i]))
        };
        match args[i].as_str() {
            "help" => {
                print_help();
                return Ok(true);
            }
            "--test" => {
                suite.test_min = take(1)?.parse()?;
                suite.test_max = suite.test_min;
                suite.exhaustive = false;
                i += 2;
            }
            "--test-range" => {
                suite.test_min = take(1)?.parse()?;
                suite.test_max = take(2)?.parse()?;
                suite.exhaustive = false;
                i += 3;
            }
            "--test-all" => {
                suite.exhaustive = true;
                i += 1;
            }
            "--exit-on-fail" => {
                suite.exit_on_fail = true;
                i += 1;
            }
            "--minimum-snr-fp16" => {
                suite.min_snr_fp16 = take(1)?.parse()?;
                i += 2;
            }
            "--minimum-snr-fp32" => {
                suite.min_snr_fp32 = take(1)?.parse()?;
                i += 2;
            }
            "--epsilon-fp16" => {
                suite.epsilon_fp16 = take(1)?.parse()?;
                i += 2;
            }
            "--epsilon-fp32" => {
                suite.epsilon_fp32 = take(1)?.parse()?;
                i += 2;
            }
            other => bail!("unknown test argument: {other}"),
        }
    }
    run_test_suite(&suite)
}

#[derive(Debug, Clone, Copy)]
struct TestCase {
    nx: u32,
    ny: u32,
    kind: Kind,
    direction: Direction,
    input_target: Target,
    output_target: Target,
    fp16: bool,
}

fn test_cases() -> Vec<TestCase> {
    let sizes = [
        (32u32, 1u32),
        (64, 1),
        (256, 1),
        (1024, 1),
        (32, 32),
        (128, 64),
        (256, 256),
        (1024, 512),
    ];
    let mut cases = Vec::new();
    for &fp16 in &[false, true] {
        for &(kind, direction) in &[
            (Kind::ComplexToComplex, Direction::Forward),
            (Kind::ComplexToComplex, Direction::Inverse),
            (Kind::ComplexToComplex, Direction::InverseConvolve),
            (Kind::ComplexToComplexDual, Direction::Forward),
            (Kind::ComplexToComplexDual, Direction::Inverse),
            (Kind::RealToComplex, Direction::Forward),
            (Kind::ComplexToReal, Direction::Inverse),
        ] {
            // Squared spectra of large transforms overflow fp16 storage.
            if fp16 && direction == Direction::InverseConvolve {
                continue;
            }
            for &(nx, ny) in &sizes {
                cases.push(TestCase {
                    nx,
                    ny,
                    kind,
                    direction,
                    input_target: Target::Ssbo,
                    output_target: Target::Ssbo,
                    fp16,
                });
            }
        }
    }
    // Sampled-image input coverage, fp32 only.
    for &(kind, direction, input_target) in &[
        (Kind::ComplexToComplex, Direction::Forward, Target::Image),
        (Kind::ComplexToComplexDual, Direction::Forward, Target::Image),
        (Kind::RealToComplex, Direction::Forward, Target::ImageReal),
    ] {
        for &(nx, ny) in &[(64u32, 64u32), (256, 128)] {
            cases.push(TestCase {
                nx,
                ny,
                kind,
                direction,
                input_target,
                output_target: Target::Ssbo,
                fp16: false,
            });
        }
    }
    cases
}

fn run_test_suite(suite: &SuiteArgs) -> Result<bool> {
    let ctx = GpuContext::new()?;
    let cache = Arc::new(ProgramCache::new());
    let wisdom = Wisdom::for_renderer(ctx.renderer_string());

    let cases = test_cases();
    let max = suite.test_max.min(cases.len() - 1);
    let min = suite.test_min.min(max);
    let selected = if suite.exhaustive { 0..cases.len() } else { min..max + 1 };

    let mut failures = 0usize;
    let total = selected.len();
    for id in selected {
        let case = cases[id];
        let label = format!(
            "test {id}: {}x{} {:?} {:?} {:?}->{:?} {}",
            case.nx,
            case.ny,
            case.kind,
            case.direction,
            case.input_target,
            case.output_target,
            if case.fp16 { "FP16" } else { "FP32" }
        );
        match run_case(&ctx, &cache, &wisdom, &case) {
            Ok((snr, max_err)) => {
                let (min_snr, epsilon) = if case.fp16 {
                    (suite.min_snr_fp16, suite.epsilon_fp16)
                } else {
                    (suite.min_snr_fp32, suite.epsilon_fp32)
                };
                // Convolution squares the spectrum, which costs headroom.
                let epsilon = if case.direction == Direction::InverseConvolve {
                    epsilon * 1.5
                } else {
                    epsilon
                };
                let pass = snr >= min_snr || f64::from(max_err) <= epsilon;
                println!(
                    "{label}: SNR {snr:.1} dB, max error {max_err:.3e} [{}]",
                    if pass { "PASS" } else { "FAIL" }
                );
                if !pass {
                    failures += 1;
                    if suite.exit_on_fail {
                        bail!("{label} failed");
                    }
                }
            }
            Err(e) => {
                println!("{label}: ERROR {e:#}");
                failures += 1;
                if suite.exit_on_fail {
                    return Err(e);
                }
            }
        }
    }

    println!("{} / {} tests passed", total - failures, total);
    Ok(failures == 0)
}

/// Gaussian via Box-Muller over a seeded generator, so reruns see the same
/// signals.
fn normal_signal(rng: &mut rand::rngs::StdRng, len: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        let u1: f32 = rng.gen_range(f32::EPSILON..1.0);
        let u2: f32 = rng.gen_range(0.0..1.0);
        let r = (-2.0 * u1.ln()).sqrt();
        let (s, c) = (2.0 * std::f32::consts::PI * u2).sin_cos();
        out.push(r * c);
        if out.len() < len {
            out.push(r * s);
        }
    }
    out
}

fn floats_to_fp16_bytes(data: &[f32]) -> Vec<u8> {
    data.iter()
        .flat_map(|&v| half::f16::from_f32(v).to_le_bytes())
        .collect()
}

fn fp16_bytes_to_floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|c| half::f16::from_le_bytes([c[0], c[1]]).to_f32())
        .collect()
}

fn bytes_to_floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// CPU expectation for a case, on fp32 copies of the input.
fn expected_output(case: &TestCase, input: &[f32]) -> Vec<f32> {
    let nx = case.nx as usize;
    let ny = case.ny as usize;
    let inverse = case.direction.is_inverse();
    let norm = 1.0 / (nx * ny) as f32;

    let complex_of = |floats: &[f32]| -> Vec<reference::Complex> {
        floats.chunks_exact(2).map(|c| [c[0], c[1]]).collect()
    };
    let flatten = |cs: Vec<reference::Complex>| -> Vec<f32> {
        cs.into_iter().flatten().collect()
    };

    match case.kind {
        Kind::ComplexToComplex => {
            let mut data = complex_of(input);
            if case.direction == Direction::InverseConvolve {
                for c in &mut data {
                    *c = [c[0] * c[0] - c[1] * c[1], 2.0 * c[0] * c[1]];
                }
            }
            reference::fft_2d(&mut data, nx, ny, inverse);
            let mut out = flatten(data);
            if inverse {
                for v in &mut out {
                    *v *= norm;
                }
            }
            out
        }
        Kind::ComplexToComplexDual => {
            // Deinterleave the two packed signals, transform separately.
            let mut lane0 = Vec::with_capacity(nx * ny);
            let mut lane1 = Vec::with_capacity(nx * ny);
            for e in input.chunks_exact(4) {
                lane0.push([e[0], e[1]]);
                lane1.push([e[2], e[3]]);
            }
            reference::fft_2d(&mut lane0, nx, ny, inverse);
            reference::fft_2d(&mut lane1, nx, ny, inverse);
            let mut out = Vec::with_capacity(input.len());
            for (a, b) in lane0.iter().zip(&lane1) {
                out.extend_from_slice(&[a[0], a[1], b[0], b[1]]);
            }
            if inverse {
                for v in &mut out {
                    *v *= norm;
                }
            }
            out
        }
        Kind::RealToComplex => flatten(reference::r2c_2d(input, nx, ny)),
        Kind::ComplexToReal => {
            let spectrum = complex_of(input);
            let mut out = reference::c2r_2d(&spectrum, nx, ny);
            for v in &mut out {
                *v *= norm;
            }
            out
        }
    }
}

fn input_float_count(case: &TestCase) -> usize {
    let nx = case.nx as usize;
    let ny = case.ny as usize;
    match case.kind {
        Kind::ComplexToComplex => nx * ny * 2,
        Kind::ComplexToComplexDual => nx * ny * 4,
        Kind::RealToComplex => nx * ny,
        Kind::ComplexToReal => (nx / 2 + 1) * ny * 2,
    }
}

fn output_float_count(case: &TestCase) -> usize {
    let nx = case.nx as usize;
    let ny = case.ny as usize;
    match case.kind {
        Kind::ComplexToComplex => nx * ny * 2,
        Kind::ComplexToComplexDual => nx * ny * 4,
        Kind::RealToComplex => (nx / 2 + 1) * ny * 2,
        Kind::ComplexToReal => nx * ny,
    }
}

fn run_case(
    ctx: &GpuContext,
    cache: &Arc<ProgramCache>,
    wisdom: &Wisdom,
    case: &TestCase,
) -> Result<(f64, f32)> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(
        u64::from(case.nx) << 32 | u64::from(case.ny) | (case.kind as u64) << 8,
    );

    let input = if case.kind == Kind::ComplexToReal {
        // A genuine half spectrum, so the Hermitian edge bins agree with
        // the reference mirror.
        let reals = normal_signal(&mut rng, (case.nx * case.ny) as usize);
        reference::r2c_2d(&reals, case.nx as usize, case.ny as usize)
            .into_iter()
            .flatten()
            .collect()
    } else {
        normal_signal(&mut rng, input_float_count(case))
    };

    let mut options = FftOptions::default();
    options.precision.fp16 = case.fp16;
    options.precision.input_fp16 = case.fp16 && case.input_target == Target::Ssbo;
    options.precision.output_fp16 = case.fp16 && case.output_target == Target::Ssbo;
    options.precision.normalize = case.direction.is_inverse();

    let fft = Fft::new(
        ctx,
        case.nx,
        case.ny,
        case.kind,
        case.direction,
        case.input_target,
        case.output_target,
        Arc::clone(cache),
        &options,
        wisdom,
    )?;

    // Upload.
    let input_buffer;
    let input_texture;
    let input_surface = match case.input_target {
        Target::Ssbo => {
            let bytes = if options.precision.input_fp16 {
                floats_to_fp16_bytes(&input)
            } else {
                bytemuck::cast_slice(&input).to_vec()
            };
            let buffer = ctx.create_storage_buffer(bytes.len() as u64, "test input");
            ctx.write_buffer(&buffer, 0, &bytes);
            input_buffer = buffer;
            Surface::Buffer(&input_buffer)
        }
        Target::Image | Target::ImageReal => {
            let (format, texel_bytes, width) = match (case.kind, case.input_target) {
                (Kind::RealToComplex, _) => (wgpu::TextureFormat::R32Float, 4, case.nx),
                (Kind::ComplexToComplexDual, _) => {
                    (wgpu::TextureFormat::Rgba32Float, 16, case.nx)
                }
                _ => (wgpu::TextureFormat::Rg32Float, 8, case.nx),
            };
            let texture = ctx.create_sampled_texture(width, case.ny, format, "test input tex");
            ctx.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                bytemuck::cast_slice(&input),
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(width * texel_bytes),
                    rows_per_image: Some(case.ny),
                },
                wgpu::Extent3d {
                    width,
                    height: case.ny,
                    depth_or_array_layers: 1,
                },
            );
            input_texture = texture.create_view(&wgpu::TextureViewDescriptor::default());
            Surface::Texture(&input_texture)
        }
    };

    let out_floats = output_float_count(case);
    let out_bytes = out_floats * if options.precision.output_fp16 { 2 } else { 4 };
    let output_buffer = ctx.create_storage_buffer(out_bytes as u64, "test output");

    let aux = match (case.direction, &input_surface) {
        (Direction::InverseConvolve, Surface::Buffer(buffer)) => Some(*buffer),
        _ => None,
    };
    fft.process(ctx, Surface::Buffer(&output_buffer), input_surface, aux)?;
    ctx.wait_idle();

    let raw = ctx.read_buffer(&output_buffer, 0, out_bytes as u64);
    let actual = if options.precision.output_fp16 {
        fp16_bytes_to_floats(&raw)
    } else {
        bytes_to_floats(&raw)
    };

    let expected = expected_output(case, &input);
    Ok((
        reference::snr_db(&expected, &actual),
        reference::max_error(&expected, &actual),
    ))
}

// ---------------------------------------------------------------------------
// bench

struct BenchArgs {
    width: u32,
    height: u32,
    warmup: u32,
    iterations: u32,
    dispatches: u32,
    timeout: f64,
    kind: Kind,
    fp16: bool,
    input_texture: bool,
    output_texture: bool,
}

impl Default for BenchArgs {
    fn default() -> Self {
        BenchArgs {
            width: 1024,
            height: 1024,
            warmup: 2,
            iterations: 20,
            dispatches: 50,
            timeout: 1.0,
            kind: Kind::ComplexToComplex,
            fp16: false,
            input_texture: false,
            output_texture: false,
        }
    }
}

fn parse_kind(name: &str) -> Result<Kind> {
    match name {
        "ComplexToComplex" => Ok(Kind::ComplexToComplex),
        "ComplexToComplexDual" => Ok(Kind::ComplexToComplexDual),
        "ComplexToReal" => Ok(Kind::ComplexToReal),
        "RealToComplex" => Ok(Kind::RealToComplex),
        other => bail!("unknown transform type: {other}"),
    }
}

fn cli_bench(args: &[String]) -> Result<bool> {
    let mut bench = BenchArgs::default();
    let mut i = 0;
    while i < args.len() {
        let take = || -> Result<&String> {
            args.get(i + 1)
                .ok_or_else(|| anyhow!("missing value for {}", args[i]))
        };
        match args[i].as_str() {
            "help" => {
                print_help();
                return Ok(true);
            }
            "--width" => {
                bench.width = take()?.parse()?;
                i += 2;
            }
            "--height" => {
                bench.height = take()?.parse()?;
                i += 2;
            }
            "--warmup" => {
                bench.warmup = take()?.parse()?;
                i += 2;
            }
            "--iterations" => {
                bench.iterations = take()?.parse()?;
                i += 2;
            }
            "--dispatches" => {
                bench.dispatches = take()?.parse()?;
                i += 2;
            }
            "--timeout" => {
                bench.timeout = take()?.parse()?;
                i += 2;
            }
            "--type" => {
                bench.kind = parse_kind(take()?)?;
                i += 2;
            }
            "--fp16" => {
                bench.fp16 = true;
                i += 1;
            }
            "--input-texture" => {
                bench.input_texture = true;
                i += 1;
            }
            "--output-texture" => {
                bench.output_texture = true;
                i += 1;
            }
            other => bail!("unknown bench argument: {other}"),
        }
    }
    run_benchmark(&bench)
}

fn run_benchmark(args: &BenchArgs) -> Result<bool> {
    let ctx = GpuContext::new()?;
    let cache = Arc::new(ProgramCache::new());

    let mut options = FftOptions::default();
    options.precision.fp16 = args.fp16;
    options.precision.input_fp16 = args.fp16 && !args.input_texture;
    options.precision.output_fp16 = args.fp16 && !args.output_texture;

    let input_target = match (args.input_texture, args.kind) {
        (false, _) => Target::Ssbo,
        (true, Kind::RealToComplex) => Target::ImageReal,
        (true, _) => Target::Image,
    };
    let output_target = match (args.output_texture, args.kind) {
        (false, _) => Target::Ssbo,
        (true, Kind::ComplexToReal) => Target::ImageReal,
        (true, _) => Target::Image,
    };
    let direction = if args.kind == Kind::ComplexToReal {
        Direction::Inverse
    } else {
        Direction::Forward
    };

    let mut wisdom = Wisdom::for_renderer(ctx.renderer_string());
    wisdom.set_bench_params(args.warmup, args.iterations, args.dispatches, args.timeout);
    wisdom.learn_optimal_options_exhaustive(
        &ctx,
        &cache,
        args.width,
        args.height,
        args.kind,
        input_target,
        output_target,
        options.precision,
    )?;

    let fft = Fft::new(
        &ctx,
        args.width,
        args.height,
        args.kind,
        direction,
        input_target,
        output_target,
        Arc::clone(&cache),
        &options,
        &wisdom,
    )?;

    let field_bytes =
        u64::from(args.width) * u64::from(args.height) * u64::from(args.kind.components()) * 4;
    let input_buffer = ctx.create_storage_buffer(field_bytes, "bench input");
    let output_buffer = ctx.create_storage_buffer(field_bytes, "bench output");

    let texel = |target: Target| match (target, args.kind) {
        (Target::ImageReal, _) => wgpu::TextureFormat::R32Float,
        (_, Kind::ComplexToComplexDual) => wgpu::TextureFormat::Rgba32Float,
        _ => wgpu::TextureFormat::Rg32Float,
    };
    let input_view = (input_target != Target::Ssbo).then(|| {
        ctx.create_sampled_texture(args.width, args.height, texel(input_target), "bench in tex")
            .create_view(&wgpu::TextureViewDescriptor::default())
    });
    let output_view = (output_target != Target::Ssbo).then(|| {
        ctx.create_storage_texture(args.width, args.height, texel(output_target), "bench out tex")
            .create_view(&wgpu::TextureViewDescriptor::default())
    });

    let input = match &input_view {
        Some(view) => Surface::Texture(view),
        None => Surface::Buffer(&input_buffer),
    };
    let output = match &output_view {
        Some(view) => Surface::Texture(view),
        None => Surface::Buffer(&output_buffer),
    };

    let result = fft.bench(
        &ctx,
        output,
        input,
        args.warmup,
        args.iterations,
        args.dispatches,
        args.timeout,
    )?;

    println!("Benchmark:");
    println!(
        "  {} -> {}",
        if input_target == Target::Ssbo { "SSBO" } else { "Texture" },
        if output_target == Target::Ssbo { "SSBO" } else { "Image" },
    );
    println!(
        "  Size: {} x {} {:?} {}",
        args.width,
        args.height,
        args.kind,
        if args.fp16 { "FP16" } else { "FP32" }
    );
    println!(
        "  {:8.3} ms per transform ({} / {} iterations{})",
        1000.0 * result.average_seconds,
        result.completed_iterations,
        result.requested_iterations,
        if result.timed_out() { ", timed out" } else { "" }
    );
    println!("  {} programs compiled", cache.len());
    Ok(true)
}
