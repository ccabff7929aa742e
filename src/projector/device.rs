//! Projections on a GPU: one compute shader invocation per LOR.
//!
//! Each call uploads the LORs and its input, runs one dispatch, and blocks
//! until the result has been copied back. Backprojections from concurrent
//! invocations into the same voxel are combined with an atomic
//! compare-and-swap loop on the `f32` bit patterns.

use std::sync::{mpsc, Arc, Mutex};
use std::time::Instant;

use log::{debug, info};
use wgpu::util::DeviceExt;

use crate::LOR;
use crate::error::{ReconError, Result};
use crate::fov::FOV;
use crate::image::{Image, ImageData};

use super::ProjectionBackend;

const WORKGROUP_SIZE: u32 = 64;

const SIDDON:   &str = include_str!("wgsl/siddon.wgsl");
const FORWARD:  &str = include_str!("wgsl/forward.wgsl");
const BACKWARD: &str = include_str!("wgsl/backward.wgsl");

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Params {
    lower: [f32; 4],
    upper: [f32; 4],
    voxel_size: [f32; 4],
    n: [u32; 4],
    dispatch: [u32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct GpuLor {
    p1: [f32; 4],
    p2: [f32; 4],
}

impl From<&LOR> for GpuLor {
    fn from(lor: &LOR) -> Self {
        let [x1, y1, z1] = lor.p1.to_mm();
        let [x2, y2, z2] = lor.p2.to_mm();
        Self { p1: [x1, y1, z1, 0.0], p2: [x2, y2, z2, 0.0] }
    }
}

pub struct DeviceBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    layout: wgpu::BindGroupLayout,
    forward: wgpu::ComputePipeline,
    backward: wgpu::ComputePipeline,
    // First error raised by the device outside an error scope
    uncaptured: Arc<Mutex<Option<String>>>,
}

impl DeviceBackend {

    /// Fails with a configuration error if no usable GPU adapter is found, or
    /// if the adapter cannot compile the projection kernels.
    pub fn new() -> Result<Self> {
        pollster::block_on(Self::new_async())
    }

    async fn new_async() -> Result<Self> {
        // The GL backend cannot translate the compare-exchange loop of the
        // backward kernel
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                ..Default::default()
            })
            .await
            .map_err(|e| ReconError::configuration(format!("no compatible GPU adapter found: {e}")))?;

        let info = adapter.get_info();
        if info.backend == wgpu::Backend::Gl {
            return Err(ReconError::configuration(format!("GPU adapter {} only offers OpenGL", info.name)));
        }
        info!("Using GPU adapter {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("lmrecon device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                ..Default::default()
            })
            .await
            .map_err(|e| ReconError::configuration(format!("failed to request wgpu device: {e}")))?;

        let uncaptured = Arc::new(Mutex::new(None));
        let slot = uncaptured.clone();
        device.on_uncaptured_error(Box::new(move |e: wgpu::Error| {
            if let Ok(mut slot) = slot.lock() {
                if slot.is_none() { *slot = Some(e.to_string()) }
            }
        }));

        device.push_error_scope(wgpu::ErrorFilter::Internal);
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let storage = |binding, read_only| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ProjectionBindGroupLayout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage(1, true),  // LORs
                storage(2, true),  // image (forward) or per-LOR values (backward)
                storage(3, false), // per-LOR projections (forward) or image (backward)
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("ProjectionPipelineLayout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = |label: &str, kernel: &str, entry_point: &str| {
            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(format!("{SIDDON}\n{kernel}").into()),
            });
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some(entry_point),
                compilation_options: Default::default(),
                cache: None,
            })
        };

        let forward  = pipeline("SiddonForward" , FORWARD , "forward");
        let backward = pipeline("SiddonBackward", BACKWARD, "backward");

        let validation = device.pop_error_scope().await;
        let internal = device.pop_error_scope().await;
        if let Some(e) = validation.or(internal) {
            return Err(ReconError::configuration(format!(
                "GPU adapter {} cannot build the projection kernels: {e}", info.name
            )));
        }

        Ok(Self { device, queue, layout, forward, backward, uncaptured })
    }

    fn take_uncaptured_error(&self) -> Option<String> {
        self.uncaptured.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Run `pipeline` once per LOR. `input` is bound at binding 2; the
    /// returned data are the contents of the `output_len` floats at binding 3,
    /// which start as zeros.
    fn run(
        &self,
        pipeline: &wgpu::ComputePipeline,
        fov: &FOV,
        lors: &[LOR],
        input: &[f32],
        output_len: usize,
    ) -> Result<Vec<f32>> {
        let start = Instant::now();
        let limits = self.device.limits();

        let lor_payload: Vec<GpuLor> = lors.iter().map(GpuLor::from).collect();
        let lor_bytes    = std::mem::size_of_val(lor_payload.as_slice()) as u64;
        let input_bytes  = std::mem::size_of_val(input) as u64;
        let output_bytes = (output_len * std::mem::size_of::<f32>()) as u64;
        for (what, size) in [("LORs", lor_bytes), ("input", input_bytes), ("output", output_bytes)] {
            if size > limits.max_storage_buffer_binding_size as u64 || size > limits.max_buffer_size {
                return Err(ReconError::device(format!(
                    "{what} buffer of {size} bytes exceeds the device limit of {} bytes",
                    (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size)
                )));
            }
        }
        let n_lors = u32::try_from(lors.len())
            .map_err(|_| ReconError::device(format!("too many LORs for one dispatch: {}", lors.len())))?;

        // Spread the workgroups over a second dimension when one is not enough
        let workgroups = n_lors.div_ceil(WORKGROUP_SIZE);
        let max_per_dimension = limits.max_compute_workgroups_per_dimension;
        let (groups_x, groups_y) = if workgroups <= max_per_dimension {
            (workgroups, 1)
        } else {
            (max_per_dimension, workgroups.div_ceil(max_per_dimension))
        };
        if groups_y > max_per_dimension {
            return Err(ReconError::device(format!("too many LORs for one dispatch: {n_lors}")));
        }

        let lower = fov.lower_corner().to_mm();
        let upper = (fov.center + fov.half_width).to_mm();
        let size  = fov.voxel_size.to_mm();
        let [nx, ny, nz] = fov.n;
        let params = Params {
            lower:      [lower[0], lower[1], lower[2], 0.0],
            upper:      [upper[0], upper[1], upper[2], 0.0],
            voxel_size: [size[0], size[1], size[2], 0.0],
            n:          [nx as u32, ny as u32, nz as u32, n_lors],
            dispatch:   [groups_x * WORKGROUP_SIZE, 0, 0, 0],
        };

        let params_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let lor_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("LORs"),
            contents: bytemuck::cast_slice(&lor_payload),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let input_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Input"),
            contents: bytemuck::cast_slice(input),
            usage: wgpu::BufferUsages::STORAGE,
        });
        // wgpu zero-initializes new buffers
        let output_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Output"),
            size: output_bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Staging"),
            size: output_bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ProjectionBindGroup"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource:  params_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource:     lor_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource:   input_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource:  output_buffer.as_entire_binding() },
            ],
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("ProjectionEncoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor::default());
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups_x, groups_y, 1);
        }
        encoder.copy_buffer_to_buffer(&output_buffer, 0, &staging_buffer, 0, output_bytes);
        self.queue.submit(Some(encoder.finish()));

        let buffer_slice = staging_buffer.slice(..);
        let (sender, receiver) = mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| { let _ = sender.send(result); });
        self.device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| ReconError::device(format!("waiting for GPU failed: {e}")))?;
        if let Some(e) = self.take_uncaptured_error() {
            return Err(ReconError::device(e));
        }
        receiver.recv()
            .map_err(|_| ReconError::device("buffer mapping was abandoned"))?
            .map_err(|e| ReconError::device(format!("could not read GPU results: {e}")))?;

        let data = buffer_slice.get_mapped_range();
        let result: Vec<f32> = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        staging_buffer.unmap();

        debug!("GPU dispatch of {n_lors} LORs ({groups_x}x{groups_y} workgroups) took {:.1?}", start.elapsed());
        Ok(result)
    }
}

impl ProjectionBackend for DeviceBackend {

    fn name(&self) -> &'static str { "device" }

    fn forward(&self, image: &Image, lors: &[LOR]) -> Result<Vec<f32>> {
        if lors.is_empty() { return Ok(vec![]) }
        self.run(&self.forward, &image.fov, lors, &image.data, lors.len())
    }

    fn backward(&self, fov: &FOV, lors: &[LOR], values: &[f32]) -> Result<ImageData> {
        if lors.len() != values.len() {
            return Err(ReconError::geometry(format!("{} values for {} LORs", values.len(), lors.len())));
        }
        if lors.is_empty() { return Ok(Image::zeros_buffer(*fov)) }
        self.run(&self.backward, fov, lors, values, fov.n_voxels())
    }
}
