//! The FFT runtime: owns a compiled plan, its temporaries and binding
//! overlay, and executes or benchmarks it against user surfaces.

use crate::cache::{ComputeProgram, ProgramCache};
use crate::context::GpuContext;
use crate::error::{FftError, Result};
use crate::plan::{self, PlanLayout, PlanRequest, PlatformLimits, Route};
use crate::types::{Direction, FftOptions, Kind, Mode, Target};
use crate::wisdom::Wisdom;
use std::num::NonZeroU64;
use std::sync::Arc;

/// A user-supplied input or output resource.
#[derive(Clone, Copy)]
pub enum Surface<'a> {
    Buffer(&'a wgpu::Buffer),
    Texture(&'a wgpu::TextureView),
}

/// Outcome of a benchmark run. A timeout is not an error: the mean over the
/// completed iterations is valid, and `completed_iterations` falling short
/// of `requested_iterations` signals the early exit.
#[derive(Debug, Clone, Copy)]
pub struct BenchResult {
    pub average_seconds: f64,
    pub completed_iterations: u32,
    pub requested_iterations: u32,
}

impl BenchResult {
    pub fn timed_out(&self) -> bool {
        self.completed_iterations < self.requested_iterations
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct RangeOverlay {
    input: Option<(u64, u64)>,
    input_aux: Option<(u64, u64)>,
    output: Option<(u64, u64)>,
}

pub struct Fft {
    size_x: u32,
    size_y: u32,
    layout: PlanLayout,
    programs: Vec<Arc<ComputeProgram>>,
    uniform_buffers: Vec<wgpu::Buffer>,
    temp_a: Option<wgpu::Buffer>,
    temp_b: Option<wgpu::Buffer>,
    sampler: Option<wgpu::Sampler>,
    texture_offset: [f32; 2],
    texture_scale: [f32; 2],
    ranges: RangeOverlay,
    needs_aux: bool,
    cache: Arc<ProgramCache>,
}

fn limits_of(ctx: &GpuContext) -> PlatformLimits {
    PlatformLimits {
        max_invocations: ctx.max_workgroup_invocations(),
        max_shared_bytes: ctx.max_shared_bytes(),
    }
}

impl Fft {
    /// Build a full transform plan.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: &GpuContext,
        nx: u32,
        ny: u32,
        kind: Kind,
        direction: Direction,
        input_target: Target,
        output_target: Target,
        cache: Arc<ProgramCache>,
        options: &FftOptions,
        wisdom: &Wisdom,
    ) -> Result<Fft> {
        let req = PlanRequest {
            nx,
            ny,
            kind,
            direction,
            input_target,
            output_target,
            options: *options,
        };
        let layout = plan::build(&req, &limits_of(ctx), wisdom)?;
        Fft::from_layout(ctx, cache, &req, layout)
    }

    /// Build a single-stage plan with explicit radix and p. Useful for
    /// benchmarking partial transforms.
    #[allow(clippy::too_many_arguments)]
    pub fn new_single_stage(
        ctx: &GpuContext,
        cache: Arc<ProgramCache>,
        req: &PlanRequest,
        radix: u32,
        p: u32,
        mode: Mode,
    ) -> Result<Fft> {
        let layout = plan::single_stage(req, &limits_of(ctx), radix, p, mode)?;
        Fft::from_layout(ctx, cache, req, layout)
    }

    fn from_layout(
        ctx: &GpuContext,
        cache: Arc<ProgramCache>,
        req: &PlanRequest,
        layout: PlanLayout,
    ) -> Result<Fft> {
        let mut programs = Vec::with_capacity(layout.passes.len());
        let mut uniform_buffers = Vec::with_capacity(layout.passes.len());
        for (i, pass) in layout.passes.iter().enumerate() {
            programs.push(cache.get_or_compile(ctx, &pass.parameters)?);
            uniform_buffers.push(
                ctx.create_uniform_buffer(
                    std::mem::size_of::<crate::shader::PassUniforms>() as u64,
                    &format!("fft pass {i} uniforms"),
                ),
            );
        }

        let (temp_a, temp_b) = if layout.temp_bytes > 0 {
            (
                Some(ctx.create_storage_buffer(layout.temp_bytes, "fft temp a")),
                Some(ctx.create_storage_buffer(layout.temp_bytes, "fft temp b")),
            )
        } else {
            (None, None)
        };

        let sampler = layout
            .passes
            .first()
            .filter(|p| p.parameters.input_target() != Target::Ssbo)
            .map(|_| ctx.create_default_sampler());

        Ok(Fft {
            size_x: req.nx,
            size_y: req.ny,
            needs_aux: layout.passes.iter().any(|p| p.parameters.aux_input()),
            layout,
            programs,
            uniform_buffers,
            temp_a,
            temp_b,
            sampler,
            texture_offset: [0.0; 2],
            texture_scale: [1.0; 2],
            ranges: RangeOverlay::default(),
            cache,
        })
    }

    pub fn dimension_x(&self) -> u32 {
        self.size_x
    }

    pub fn dimension_y(&self) -> u32 {
        self.size_y
    }

    /// Estimated cost of the plan under the cost model.
    pub fn cost(&self) -> f64 {
        self.layout.cost
    }

    pub fn pass_count(&self) -> usize {
        self.layout.passes.len()
    }

    /// The fully specialized pass list, in dispatch order.
    pub fn passes(&self) -> &[plan::PassSpec] {
        &self.layout.passes
    }

    pub fn program_cache(&self) -> &Arc<ProgramCache> {
        &self.cache
    }

    /// Offset/scale applied to normalized uv when sampling textured input.
    pub fn set_texture_offset_scale(&mut self, offset_x: f32, offset_y: f32, scale_x: f32, scale_y: f32) {
        self.texture_offset = [offset_x, offset_y];
        self.texture_scale = [scale_x, scale_y];
    }

    pub fn set_input_buffer_range(&mut self, offset: u64, size: u64) {
        self.ranges.input = Some((offset, size));
    }

    pub fn set_input_aux_buffer_range(&mut self, offset: u64, size: u64) {
        self.ranges.input_aux = Some((offset, size));
    }

    pub fn set_output_buffer_range(&mut self, offset: u64, size: u64) {
        self.ranges.output = Some((offset, size));
    }

    /// Replace the default nearest/clamp sampler for textured input.
    pub fn set_samplers(&mut self, sampler: wgpu::Sampler) {
        self.sampler = Some(sampler);
    }

    fn check_range(
        range: Option<(u64, u64)>,
        needed: u64,
        what: &str,
    ) -> Result<()> {
        if let Some((_, size)) = range {
            if size < needed {
                return Err(FftError::ContractViolation(format!(
                    "{what} range of {size} bytes is smaller than the transform footprint of {needed} bytes"
                )));
            }
        }
        Ok(())
    }

    fn buffer_binding<'a>(
        buffer: &'a wgpu::Buffer,
        range: Option<(u64, u64)>,
    ) -> wgpu::BindingResource<'a> {
        match range {
            None => buffer.as_entire_binding(),
            Some((offset, size)) => wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer,
                offset,
                size: NonZeroU64::new(size),
            }),
        }
    }

    fn route_binding<'a>(
        &'a self,
        route: Route,
        input: &Surface<'a>,
        output: &Surface<'a>,
        expected: Target,
        range: Option<(u64, u64)>,
    ) -> Result<wgpu::BindingResource<'a>> {
        let surface = match route {
            Route::UserInput => input,
            Route::UserOutput => output,
            Route::TempA => {
                return Ok(self
                    .temp_a
                    .as_ref()
                    .expect("plan routed through a missing temporary")
                    .as_entire_binding());
            }
            Route::TempB => {
                return Ok(self
                    .temp_b
                    .as_ref()
                    .expect("plan routed through a missing temporary")
                    .as_entire_binding());
            }
        };
        match (*surface, expected) {
            (Surface::Buffer(buffer), Target::Ssbo) => Ok(Self::buffer_binding(buffer, range)),
            (Surface::Texture(view), Target::Image | Target::ImageReal) => {
                Ok(wgpu::BindingResource::TextureView(view))
            }
            (Surface::Buffer(_), _) => Err(FftError::ContractViolation(format!(
                "plan expects a {expected:?} surface but a buffer was supplied"
            ))),
            (Surface::Texture(_), _) => Err(FftError::ContractViolation(
                "plan expects a storage buffer but a texture was supplied".into(),
            )),
        }
    }

    fn write_pass_uniforms(&self, ctx: &GpuContext) {
        for (pass, buffer) in self.layout.passes.iter().zip(&self.uniform_buffers) {
            let mut uniforms = pass.uniforms;
            if pass.parameters.input_target() != Target::Ssbo {
                let vertical = pass.parameters.mode().is_vertical();
                let width = pass.uv_scale_x
                    * if vertical {
                        uniforms.in_stride
                    } else {
                        uniforms.in_line_stride
                    };
                let height = if vertical {
                    uniforms.n_axis
                } else {
                    uniforms.lines
                };
                uniforms.uv_scale = [
                    self.texture_scale[0] / width.max(1) as f32,
                    self.texture_scale[1] / height.max(1) as f32,
                ];
                uniforms.uv_offset = self.texture_offset;
            }
            ctx.write_buffer(buffer, 0, bytemuck::bytes_of(&uniforms));
        }
    }

    /// Run the plan once. The caller is responsible for any final barrier
    /// or idle wait it needs before reading the output.
    pub fn process(
        &self,
        ctx: &GpuContext,
        output: Surface,
        input: Surface,
        input_aux: Option<&wgpu::Buffer>,
    ) -> Result<()> {
        if self.needs_aux && input_aux.is_none() {
            return Err(FftError::ContractViolation(
                "inverse-convolve plans require the aux input buffer".into(),
            ));
        }
        Self::check_range(self.ranges.input, self.layout.input_bytes, "input")?;
        Self::check_range(self.ranges.input_aux, self.layout.input_bytes, "aux input")?;
        Self::check_range(self.ranges.output, self.layout.output_bytes, "output")?;
        if let Surface::Buffer(buffer) = input {
            let offset = self.ranges.input.map_or(0, |(o, _)| o);
            if buffer.size() < offset + self.layout.input_bytes {
                return Err(FftError::ContractViolation(format!(
                    "input buffer of {} bytes cannot hold the {}-byte transform footprint",
                    buffer.size(),
                    self.layout.input_bytes
                )));
            }
        }
        if let Surface::Buffer(buffer) = output {
            let offset = self.ranges.output.map_or(0, |(o, _)| o);
            if buffer.size() < offset + self.layout.output_bytes {
                return Err(FftError::ContractViolation(format!(
                    "output buffer of {} bytes cannot hold the {}-byte transform footprint",
                    buffer.size(),
                    self.layout.output_bytes
                )));
            }
        }

        self.write_pass_uniforms(ctx);

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("fft process"),
            });

        for ((pass, program), uniforms) in self
            .layout
            .passes
            .iter()
            .zip(&self.programs)
            .zip(&self.uniform_buffers)
        {
            let uniform_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("fft uniforms"),
                layout: &program.uniform_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniforms.as_entire_binding(),
                }],
            });

            let mut entries = Vec::with_capacity(4);
            entries.push(wgpu::BindGroupEntry {
                binding: 0,
                resource: self.route_binding(
                    pass.input,
                    &input,
                    &output,
                    pass.parameters.input_target(),
                    self.ranges.input,
                )?,
            });
            if pass.parameters.input_target() != Target::Ssbo {
                entries.push(wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(
                        self.sampler
                            .as_ref()
                            .expect("textured plans always carry a sampler"),
                    ),
                });
            }
            entries.push(wgpu::BindGroupEntry {
                binding: 2,
                resource: self.route_binding(
                    pass.output,
                    &input,
                    &output,
                    pass.parameters.output_target(),
                    self.ranges.output,
                )?,
            });
            if pass.parameters.aux_input() {
                let aux = input_aux.expect("aux presence checked above");
                entries.push(wgpu::BindGroupEntry {
                    binding: 3,
                    resource: Self::buffer_binding(aux, self.ranges.input_aux),
                });
            }

            let io_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("fft io"),
                layout: &program.io_layout,
                entries: &entries,
            });

            // One compute-pass scope per FFT pass: the scope boundary is
            // where the recorded barrier mask takes effect.
            let mut scope = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("fft pass"),
                timestamp_writes: None,
            });
            scope.set_pipeline(&program.pipeline);
            scope.set_bind_group(0, &uniform_group, &[]);
            scope.set_bind_group(1, &io_group, &[]);
            scope.dispatch_workgroups(pass.workgroups_x, pass.workgroups_y, 1);
        }

        ctx.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    /// Measure mean seconds per dispatch. Runs `warmup` untimed iterations,
    /// then up to `iterations` timed rounds of `dispatches` back-to-back
    /// runs each, waiting for GPU idle between rounds. Stops early once
    /// `max_time` seconds of wall time have accumulated.
    #[allow(clippy::too_many_arguments)]
    pub fn bench(
        &self,
        ctx: &GpuContext,
        output: Surface,
        input: Surface,
        warmup: u32,
        iterations: u32,
        dispatches: u32,
        max_time: f64,
    ) -> Result<BenchResult> {
        let aux = if self.needs_aux {
            match input {
                Surface::Buffer(buffer) => Some(buffer),
                Surface::Texture(_) => {
                    return Err(FftError::ContractViolation(
                        "cannot bench an inverse-convolve plan with textured input".into(),
                    ))
                }
            }
        } else {
            None
        };

        for _ in 0..warmup {
            self.process(ctx, output, input, aux)?;
        }
        ctx.wait_idle();

        let dispatches = dispatches.max(1);
        let started = ctx.now();
        let mut total = 0.0;
        let mut completed = 0;
        for _ in 0..iterations.max(1) {
            let round_start = ctx.now();
            for _ in 0..dispatches {
                self.process(ctx, output, input, aux)?;
            }
            ctx.wait_idle();
            total += ctx.now() - round_start;
            completed += 1;
            if ctx.now() - started > max_time {
                break;
            }
        }

        Ok(BenchResult {
            average_seconds: total / f64::from(completed * dispatches),
            completed_iterations: completed,
            requested_iterations: iterations.max(1),
        })
    }
}
