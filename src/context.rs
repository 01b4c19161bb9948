//! GPU context: the capability surface the engine consumes.
//!
//! Wraps a wgpu device/queue together with the platform facts captured once
//! at creation (invocation limits, renderer identity) and the small set of
//! operations every other module goes through: resource creation, shader
//! compilation, readback and idle waits.

use crate::error::{FftError, Result};
use std::time::Instant;

pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    renderer: String,
    max_workgroup_invocations: u32,
    max_shared_bytes: u32,
    epoch: Instant,
}

impl GpuContext {
    /// Bring up an adapter and device, preferring the high-performance GPU.
    pub fn new() -> Result<GpuContext> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| FftError::Resource(format!("no suitable GPU adapter: {e}")))?;

        let info = adapter.get_info();
        log::info!("using adapter: {} ({:?})", info.name, info.backend);

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("wgfft device"),
            ..Default::default()
        }))
        .map_err(|e| FftError::Resource(format!("device request failed: {e}")))?;

        Ok(Self::from_device(device, queue, info.name))
    }

    /// Wrap an externally created device, e.g. when embedding into an
    /// application that already owns one.
    pub fn from_device(
        device: wgpu::Device,
        queue: wgpu::Queue,
        renderer: impl Into<String>,
    ) -> GpuContext {
        let limits = device.limits();
        GpuContext {
            max_workgroup_invocations: limits.max_compute_invocations_per_workgroup,
            max_shared_bytes: limits.max_compute_workgroup_storage_size,
            device,
            queue,
            renderer: renderer.into(),
            epoch: Instant::now(),
        }
    }

    pub fn renderer_string(&self) -> &str {
        &self.renderer
    }

    pub fn max_workgroup_invocations(&self) -> u32 {
        self.max_workgroup_invocations
    }

    pub fn max_shared_bytes(&self) -> u32 {
        self.max_shared_bytes
    }

    /// Monotonic seconds since context creation.
    pub fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Block until all submitted GPU work has finished.
    pub fn wait_idle(&self) {
        let _ = self.device.poll(wgpu::PollType::wait());
    }

    pub fn create_storage_buffer(&self, bytes: u64, label: &str) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: bytes.max(4),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        })
    }

    pub fn create_uniform_buffer(&self, bytes: u64, label: &str) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: bytes,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    pub fn create_storage_texture(
        &self,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        label: &str,
    ) -> wgpu::Texture {
        self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        })
    }

    /// Texture for sampled input only; some sampleable formats (e.g. the
    /// fp16 pairs) do not admit storage binding, so this skips it.
    pub fn create_sampled_texture(
        &self,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        label: &str,
    ) -> wgpu::Texture {
        self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        })
    }

    /// Nearest/clamp sampler used for sampled image inputs unless the caller
    /// overrides it.
    pub fn create_default_sampler(&self) -> wgpu::Sampler {
        self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("wgfft sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        })
    }

    /// Validate WGSL and build a shader module from it. Validation runs on
    /// the CPU first so a bad synthesis surfaces as a typed error instead of
    /// a device fault.
    pub fn compile_shader_module(&self, source: &str, label: &str) -> Result<wgpu::ShaderModule> {
        let module = naga::front::wgsl::parse_str(source)
            .map_err(|e| FftError::Compilation(format!("{label}: {e}")))?;
        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        )
        .validate(&module)
        .map_err(|e| FftError::Compilation(format!("{label}: {e:?}")))?;

        Ok(self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            }))
    }

    /// Copy `size` bytes out of a buffer and block until they are readable.
    pub fn read_buffer(&self, buffer: &wgpu::Buffer, offset: u64, size: u64) -> Vec<u8> {
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("wgfft readback"),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("wgfft readback encoder"),
            });
        encoder.copy_buffer_to_buffer(buffer, offset, &staging, 0, size);
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.wait_idle();
        rx.recv()
            .expect("map_async callback dropped")
            .expect("buffer readback failed");

        let data = slice.get_mapped_range().to_vec();
        staging.unmap();
        data
    }

    /// Upload raw bytes into a buffer at the given offset.
    pub fn write_buffer(&self, buffer: &wgpu::Buffer, offset: u64, data: &[u8]) {
        self.queue.write_buffer(buffer, offset, data);
    }
}
