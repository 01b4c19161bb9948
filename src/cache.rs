//! Content-addressed cache of compiled compute pipelines.
//!
//! Keys are [`Parameters`] fingerprints compared byte-wise; values own the
//! pipeline plus the bind group layouts the runtime needs to bind resources.
//! The cache is shared between plans so repeated builds, benchmarks and
//! wisdom learning all reuse one compilation per fingerprint.

use crate::context::GpuContext;
use crate::error::Result;
use crate::shader;
use crate::types::{Parameters, Target};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A compiled specialization: pipeline + the layouts it was built against.
pub struct ComputeProgram {
    pub pipeline: wgpu::ComputePipeline,
    pub uniform_layout: wgpu::BindGroupLayout,
    pub io_layout: wgpu::BindGroupLayout,
}

fn texel_format(token: &str) -> wgpu::TextureFormat {
    match token {
        "r32float" => wgpu::TextureFormat::R32Float,
        "rg32float" => wgpu::TextureFormat::Rg32Float,
        "rgba32float" => wgpu::TextureFormat::Rgba32Float,
        "rgba16float" => wgpu::TextureFormat::Rgba16Float,
        other => unreachable!("unknown storage format token {other}"),
    }
}

/// The texel format a pass with an image output writes.
pub fn output_texture_format(params: &Parameters) -> wgpu::TextureFormat {
    texel_format(shader::storage_format(params))
}

impl ComputeProgram {
    pub fn compile(ctx: &GpuContext, params: &Parameters) -> Result<ComputeProgram> {
        let label = format!(
            "fft r{} {:?} {}",
            params.radix,
            params.mode(),
            if params.p1 != 0 { "p1" } else { "pn" }
        );
        let source = shader::source(params);
        let module = ctx.compile_shader_module(&source, &label).map_err(|e| {
            log::error!("rejected specialization {params:?}");
            e
        })?;

        let uniform_layout =
            ctx.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("fft uniforms"),
                    entries: &[wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    }],
                });

        let mut entries = Vec::with_capacity(4);
        match params.input_target() {
            Target::Ssbo => entries.push(wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }),
            Target::Image | Target::ImageReal => {
                entries.push(wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                });
                entries.push(wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                    count: None,
                });
            }
        }
        match params.output_target() {
            Target::Ssbo => entries.push(wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: false },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }),
            Target::Image | Target::ImageReal => entries.push(wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::StorageTexture {
                    access: wgpu::StorageTextureAccess::WriteOnly,
                    format: output_texture_format(params),
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
                count: None,
            }),
        }
        if params.aux_input() {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: 3,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            });
        }

        let io_layout = ctx
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("fft io"),
                entries: &entries,
            });

        let pipeline_layout = ctx
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label.as_str()),
                bind_group_layouts: &[&uniform_layout, &io_layout],
                push_constant_ranges: &[],
            });

        let pipeline = ctx
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label.as_str()),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some(shader::ENTRY_POINT),
                compilation_options: Default::default(),
                cache: None,
            });

        Ok(ComputeProgram {
            pipeline,
            uniform_layout,
            io_layout,
        })
    }
}

/// Dedup store mapping fingerprints to compiled programs.
#[derive(Default)]
pub struct ProgramCache {
    programs: Mutex<HashMap<Parameters, Arc<ComputeProgram>>>,
}

impl ProgramCache {
    pub fn new() -> ProgramCache {
        ProgramCache::default()
    }

    /// Look up a program without compiling. Never allocates a new entry.
    pub fn find(&self, params: &Parameters) -> Option<Arc<ComputeProgram>> {
        self.programs.lock().unwrap().get(params).cloned()
    }

    /// Insert a program, replacing any prior entry for the fingerprint.
    pub fn insert(&self, params: Parameters, program: ComputeProgram) -> Arc<ComputeProgram> {
        let program = Arc::new(program);
        self.programs
            .lock()
            .unwrap()
            .insert(params, Arc::clone(&program));
        program
    }

    /// Fetch the program for `params`, compiling and caching it on a miss.
    pub fn get_or_compile(
        &self,
        ctx: &GpuContext,
        params: &Parameters,
    ) -> Result<Arc<ComputeProgram>> {
        if let Some(program) = self.find(params) {
            return Ok(program);
        }
        log::debug!("compiling specialization r{} {:?}", params.radix, params.mode());
        let program = ComputeProgram::compile(ctx, params)?;
        Ok(self.insert(*params, program))
    }

    /// Number of distinct compiled programs.
    pub fn len(&self) -> usize {
        self.programs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ProgramCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgramCache")
            .field("programs", &self.len())
            .finish()
    }
}
