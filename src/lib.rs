//! wgfft: a GPU-resident FFT engine on wgpu compute shaders.
//!
//! 1-D and 2-D power-of-two transforms, complex or real, between storage
//! buffers and images. Three pieces carry the weight:
//!
//! * a plan compiler that decomposes a transform into a minimum-cost chain
//!   of radix-r Stockham passes (plus resolve passes for the real kinds);
//! * wisdom, a per-size auto-tuner that micro-benchmarks the legal option
//!   tuples and remembers the winners, seeded by a renderer static prior;
//! * a content-addressed program cache that deduplicates compiled compute
//!   pipelines across plans, benchmarks and repeated runs.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wgfft::{Direction, Fft, FftOptions, GpuContext, Kind, ProgramCache, Surface, Target, Wisdom};
//!
//! let ctx = GpuContext::new()?;
//! let cache = Arc::new(ProgramCache::new());
//! let wisdom = Wisdom::for_renderer(ctx.renderer_string());
//!
//! let fft = Fft::new(
//!     &ctx, 1024, 512,
//!     Kind::ComplexToComplex, Direction::Forward,
//!     Target::Ssbo, Target::Ssbo,
//!     Arc::clone(&cache), &FftOptions::default(), &wisdom,
//! )?;
//! fft.process(&ctx, Surface::Buffer(&output), Surface::Buffer(&input), None)?;
//! ctx.wait_idle();
//! ```

pub mod cache;
pub mod context;
pub mod cost;
pub mod error;
pub mod fft;
pub mod options;
pub mod plan;
pub mod reference;
pub mod shader;
pub mod types;
pub mod wisdom;

pub use cache::{ComputeProgram, ProgramCache};
pub use context::GpuContext;
pub use error::{FftError, Result};
pub use fft::{BenchResult, Fft, Surface};
pub use plan::{PlanRequest, PlatformLimits};
pub use types::{
    BarrierMask, Direction, FftOptions, Kind, Mode, Parameters, Performance, Precision, Target,
};
pub use wisdom::{Learned, SizeKey, StaticPrior, Wisdom};
