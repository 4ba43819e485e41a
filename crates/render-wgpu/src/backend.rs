use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytemuck::{Pod, Zeroable};
use pathtracer_render::{
    BackendError, BvhNode, GpuCamera, GpuMaterial, GpuTriangle, RenderBackend, SceneData,
    SubmissionId, TracePass,
};

use crate::fence::FenceTracker;
use crate::shaders;

/// Bounces per sample unless overridden.
pub const DEFAULT_MAX_BOUNCES: u32 = 4;
const WORKGROUP_SIZE: u32 = 8;
const POLL_INTERVAL: Duration = Duration::from_micros(200);

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct SceneUniform {
    camera: GpuCamera,
    node_count: u32,
    triangle_count: u32,
    _pad: [u32; 2],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
struct TraceParams {
    width: u32,
    height: u32,
    sample_index: u32,
    seed: u32,
    reset: u32,
    max_bounces: u32,
    _pad: [u32; 2],
}

const _: () = {
    assert!(std::mem::size_of::<SceneUniform>() == 80);
    assert!(std::mem::size_of::<TraceParams>() == 32);
};

fn workgroups(extent: u32) -> u32 {
    extent.div_ceil(WORKGROUP_SIZE)
}

/// `None` when the timeout reaches past what `Instant` can represent.
fn deadline_after(now: Instant, timeout: Duration) -> Option<Instant> {
    now.checked_add(timeout)
}

/// Storage bindings may not be empty, so empty lists upload one zeroed element.
fn padded<T: Pod + Zeroable>(items: &[T]) -> Vec<T> {
    if items.is_empty() {
        vec![T::zeroed()]
    } else {
        items.to_vec()
    }
}

/// The window surface a backend presents to.
pub struct SurfaceTarget {
    pub surface: wgpu::Surface<'static>,
    pub config: wgpu::SurfaceConfiguration,
}

/// Device buffers for one scene version.
struct SceneBuffers {
    _triangles: wgpu::Buffer,
    _materials: wgpu::Buffer,
    _nodes: wgpu::Buffer,
    _info: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    /// Last submission that read or wrote these buffers.
    last_use: SubmissionId,
    bytes: u64,
}

/// Accumulation target sized to the surface.
struct Target {
    width: u32,
    height: u32,
    _accumulation: wgpu::Buffer,
    params: wgpu::Buffer,
    trace_group: wgpu::BindGroup,
    blit_group: wgpu::BindGroup,
}

struct Presenter {
    surface: SurfaceTarget,
    pipeline: wgpu::RenderPipeline,
}

/// Render backend on a wgpu device.
///
/// Without a surface the backend traces offscreen and `present` is a no-op.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    fences: FenceTracker,
    lost: Arc<Mutex<Option<String>>>,
    scene_layout: wgpu::BindGroupLayout,
    trace_layout: wgpu::BindGroupLayout,
    blit_layout: wgpu::BindGroupLayout,
    trace_pipeline: wgpu::ComputePipeline,
    presenter: Option<Presenter>,
    target: Target,
    scenes: BTreeMap<u64, SceneBuffers>,
    retired: BTreeMap<u64, SceneBuffers>,
    last_trace: SubmissionId,
    samples: u32,
    max_bounces: u32,
}

impl WgpuBackend {
    /// Backend presenting to `surface`. The surface must already be configured.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, surface: SurfaceTarget) -> Self {
        let (width, height) = (surface.config.width, surface.config.height);
        let format = surface.config.format;
        let mut backend = Self::build(device, queue, width, height);
        let pipeline = backend.create_blit_pipeline(format);
        backend.presenter = Some(Presenter { surface, pipeline });
        backend
    }

    /// Backend without a surface.
    pub fn offscreen(device: wgpu::Device, queue: wgpu::Queue, width: u32, height: u32) -> Self {
        Self::build(device, queue, width, height)
    }

    pub fn with_max_bounces(mut self, bounces: u32) -> Self {
        self.max_bounces = bounces.max(1);
        self
    }

    pub fn size(&self) -> (u32, u32) {
        (self.target.width, self.target.height)
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    fn build(device: wgpu::Device, queue: wgpu::Queue, width: u32, height: u32) -> Self {
        let lost = Arc::new(Mutex::new(None));
        let lost_flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            tracing::error!(?reason, %message, "wgpu device lost");
            if let Ok(mut slot) = lost_flag.lock() {
                *slot = Some(message);
            }
        });

        let storage = |binding, read_only, visibility| wgpu::BindGroupLayoutEntry {
            binding,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let uniform = |binding, visibility| wgpu::BindGroupLayoutEntry {
            binding,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let compute = wgpu::ShaderStages::COMPUTE;
        let scene_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("scene_layout"),
            entries: &[
                storage(0, true, compute),
                storage(1, true, compute),
                storage(2, true, compute),
                uniform(3, compute),
            ],
        });
        let trace_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("trace_target_layout"),
            entries: &[storage(0, false, compute), uniform(1, compute)],
        });
        let fragment = wgpu::ShaderStages::FRAGMENT;
        let blit_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("blit_layout"),
            entries: &[storage(0, true, fragment), uniform(1, fragment)],
        });

        let trace_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("trace_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::TRACE_SHADER.into()),
        });
        let trace_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("trace_pipeline_layout"),
            bind_group_layouts: &[&scene_layout, &trace_layout],
            push_constant_ranges: &[],
        });
        let trace_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("trace_pipeline"),
            layout: Some(&trace_pipeline_layout),
            module: &trace_shader,
            entry_point: Some("trace_main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let target = create_target(&device, &trace_layout, &blit_layout, width, height);

        Self {
            device,
            queue,
            fences: FenceTracker::new(),
            lost,
            scene_layout,
            trace_layout,
            blit_layout,
            trace_pipeline,
            presenter: None,
            target,
            scenes: BTreeMap::new(),
            retired: BTreeMap::new(),
            last_trace: SubmissionId::NONE,
            samples: 0,
            max_bounces: DEFAULT_MAX_BOUNCES,
        }
    }

    fn create_blit_pipeline(&self, format: wgpu::TextureFormat) -> wgpu::RenderPipeline {
        let shader = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("blit_shader"),
                source: wgpu::ShaderSource::Wgsl(shaders::BLIT_SHADER.into()),
            });
        let layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("blit_pipeline_layout"),
                bind_group_layouts: &[&self.blit_layout],
                push_constant_ranges: &[],
            });
        self.device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("blit_pipeline"),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_blit"),
                    compilation_options: Default::default(),
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_blit"),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: Default::default(),
                multiview: None,
                cache: None,
            })
    }

    fn check_device(&self) -> Result<(), BackendError> {
        match self.lost.lock() {
            Ok(slot) => match slot.as_ref() {
                Some(message) => Err(BackendError::DeviceLost(message.clone())),
                None => Ok(()),
            },
            Err(_) => Err(BackendError::DeviceLost("device-lost flag poisoned".into())),
        }
    }

    /// Submit `commands` and return the fence id that completes with them.
    fn submit(&mut self, commands: Option<wgpu::CommandBuffer>) -> SubmissionId {
        let id = self.fences.issue();
        self.queue.submit(commands);
        self.queue.on_submitted_work_done(self.fences.signal(id));
        id
    }

    fn poll(&mut self) {
        let _ = self.device.poll(wgpu::Maintain::Poll);
        self.reclaim();
    }

    fn reclaim(&mut self) {
        let completed = self.fences.completed();
        let freed: Vec<u64> = self
            .retired
            .iter()
            .filter(|(_, scene)| scene.last_use <= completed)
            .map(|(version, _)| *version)
            .collect();
        for version in freed {
            if let Some(scene) = self.retired.remove(&version) {
                tracing::trace!(version, bytes = scene.bytes, "scene buffers freed");
            }
        }
    }

    fn write_params(&self, pass: Option<&TracePass>) {
        let params = TraceParams {
            width: self.target.width,
            height: self.target.height,
            sample_index: pass.map(|p| p.sample_index).unwrap_or(0),
            seed: pass.map(|p| p.seed).unwrap_or(0),
            reset: pass.map(|p| p.reset as u32).unwrap_or(0),
            max_bounces: self.max_bounces,
            _pad: [0; 2],
        };
        self.queue
            .write_buffer(&self.target.params, 0, bytemuck::bytes_of(&params));
    }

    fn storage_buffer(&self, label: &str, contents: &[u8]) -> wgpu::Buffer {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: contents.len() as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.queue.write_buffer(&buffer, 0, contents);
        buffer
    }
}

fn create_target(
    device: &wgpu::Device,
    trace_layout: &wgpu::BindGroupLayout,
    blit_layout: &wgpu::BindGroupLayout,
    width: u32,
    height: u32,
) -> Target {
    let (width, height) = (width.max(1), height.max(1));
    let accumulation = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("accumulation_buffer"),
        size: width as u64 * height as u64 * 16,
        usage: wgpu::BufferUsages::STORAGE,
        mapped_at_creation: false,
    });
    let params = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("trace_params"),
        size: std::mem::size_of::<TraceParams>() as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let entries = [
        wgpu::BindGroupEntry {
            binding: 0,
            resource: accumulation.as_entire_binding(),
        },
        wgpu::BindGroupEntry {
            binding: 1,
            resource: params.as_entire_binding(),
        },
    ];
    let trace_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("trace_target_bind_group"),
        layout: trace_layout,
        entries: &entries,
    });
    let blit_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("blit_bind_group"),
        layout: blit_layout,
        entries: &entries,
    });
    Target {
        width,
        height,
        _accumulation: accumulation,
        params,
        trace_group,
        blit_group,
    }
}

impl RenderBackend for WgpuBackend {
    fn name(&self) -> &str {
        "wgpu"
    }

    fn upload_scene(&mut self, scene: &SceneData) -> Result<SubmissionId, BackendError> {
        self.check_device()?;
        let triangles: Vec<GpuTriangle> = padded(&scene.triangles);
        let materials: Vec<GpuMaterial> = padded(&scene.materials);
        let nodes: Vec<BvhNode> = padded(&scene.nodes);
        let info = SceneUniform {
            camera: scene.camera,
            node_count: scene.nodes.len() as u32,
            triangle_count: scene.triangles.len() as u32,
            _pad: [0; 2],
        };

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let triangle_buffer = self.storage_buffer("scene_triangles", bytemuck::cast_slice(&triangles));
        let material_buffer = self.storage_buffer("scene_materials", bytemuck::cast_slice(&materials));
        let node_buffer = self.storage_buffer("scene_nodes", bytemuck::cast_slice(&nodes));
        let info_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("scene_info"),
            size: std::mem::size_of::<SceneUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.queue
            .write_buffer(&info_buffer, 0, bytemuck::bytes_of(&info));
        if pollster::block_on(self.device.pop_error_scope()).is_some() {
            return Err(BackendError::OutOfMemory);
        }

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("scene_bind_group"),
            layout: &self.scene_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: triangle_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: material_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: node_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: info_buffer.as_entire_binding(),
                },
            ],
        });

        // Queued writes land with the next submission, so an empty one is
        // enough to fence the upload.
        let id = self.submit(None);
        let bytes = scene.byte_size() as u64;
        if let Some(previous) = self.scenes.insert(
            scene.version,
            SceneBuffers {
                _triangles: triangle_buffer,
                _materials: material_buffer,
                _nodes: node_buffer,
                _info: info_buffer,
                bind_group,
                last_use: id,
                bytes,
            },
        ) {
            // Re-uploading a live version replaces it once readers finish.
            self.retired.insert(scene.version, previous);
        }
        tracing::debug!(version = scene.version, bytes, submission = id.0, "scene upload submitted");
        Ok(id)
    }

    fn retire_scene(&mut self, version: u64) {
        if let Some(scene) = self.scenes.remove(&version) {
            tracing::debug!(version, "scene retired");
            self.retired.insert(version, scene);
            self.reclaim();
        }
    }

    fn trace(&mut self, pass: &TracePass) -> Result<SubmissionId, BackendError> {
        self.check_device()?;
        let Some(scene) = self.scenes.get(&pass.scene_version) else {
            return Err(BackendError::UnknownScene(pass.scene_version));
        };
        if !self.fences.is_complete(self.last_trace) {
            tracing::warn!(
                previous = self.last_trace.0,
                "trace submitted while the previous one is still writing"
            );
        }
        self.write_params(Some(pass));

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("trace_encoder"),
            });
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("trace_pass"),
                timestamp_writes: None,
            });
            cpass.set_pipeline(&self.trace_pipeline);
            cpass.set_bind_group(0, &scene.bind_group, &[]);
            cpass.set_bind_group(1, &self.target.trace_group, &[]);
            cpass.dispatch_workgroups(
                workgroups(self.target.width),
                workgroups(self.target.height),
                1,
            );
        }

        let id = self.submit(Some(encoder.finish()));
        if let Some(scene) = self.scenes.get_mut(&pass.scene_version) {
            scene.last_use = id;
        }
        if pass.reset {
            self.samples = 0;
        }
        self.samples += 1;
        self.last_trace = id;
        Ok(id)
    }

    fn present(&mut self) -> Result<(), BackendError> {
        self.check_device()?;
        let Some(presenter) = &self.presenter else {
            return Ok(());
        };
        let surface = &presenter.surface;
        let frame = match surface.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                surface.surface.configure(&self.device, &surface.config);
                return Err(BackendError::SurfaceLost);
            }
            Err(wgpu::SurfaceError::Timeout) => return Err(BackendError::Timeout),
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(BackendError::OutOfMemory),
            Err(e) => return Err(BackendError::DeviceLost(e.to_string())),
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("blit_encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("blit_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                ..Default::default()
            });
            pass.set_pipeline(&presenter.pipeline);
            pass.set_bind_group(0, &self.target.blit_group, &[]);
            pass.draw(0..3, 0..1);
        }
        self.submit(Some(encoder.finish()));
        frame.present();
        self.poll();
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), BackendError> {
        self.check_device()?;
        let (width, height) = (width.max(1), height.max(1));
        if let Some(presenter) = &mut self.presenter {
            presenter.surface.config.width = width;
            presenter.surface.config.height = height;
            presenter
                .surface
                .surface
                .configure(&self.device, &presenter.surface.config);
        }
        // The old target stays alive inside wgpu until in-flight work using it completes.
        self.target = create_target(
            &self.device,
            &self.trace_layout,
            &self.blit_layout,
            width,
            height,
        );
        self.write_params(None);
        self.samples = 0;
        tracing::debug!(width, height, "accumulation target resized");
        Ok(())
    }

    fn is_complete(&mut self, id: SubmissionId) -> bool {
        if self.fences.is_complete(id) {
            return true;
        }
        self.poll();
        self.fences.is_complete(id)
    }

    fn wait(&mut self, id: SubmissionId, timeout: Duration) -> Result<bool, BackendError> {
        let deadline = deadline_after(Instant::now(), timeout);
        loop {
            self.check_device()?;
            if self.is_complete(id) {
                return Ok(true);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(false);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn wait_idle(&mut self) -> Result<(), BackendError> {
        self.check_device()?;
        let _ = self.device.poll(wgpu::Maintain::Wait);
        self.reclaim();
        if self.fences.is_complete(self.fences.last_issued()) {
            Ok(())
        } else {
            self.check_device()?;
            Err(BackendError::Timeout)
        }
    }

    fn in_flight(&self) -> usize {
        self.fences.in_flight()
    }

    fn resident_scenes(&self) -> usize {
        self.scenes.len() + self.retired.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_covers_partial_tiles() {
        assert_eq!(workgroups(1), 1);
        assert_eq!(workgroups(8), 1);
        assert_eq!(workgroups(9), 2);
        assert_eq!(workgroups(1280), 160);
    }

    #[test]
    fn oversized_timeout_has_no_deadline() {
        let now = Instant::now();
        assert_eq!(deadline_after(now, Duration::MAX), None);
        assert_eq!(
            deadline_after(now, Duration::from_millis(4)),
            Some(now + Duration::from_millis(4))
        );
    }

    #[test]
    fn empty_lists_are_padded() {
        let nodes: Vec<BvhNode> = padded(&[]);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0], BvhNode::zeroed());

        let tris = [GpuTriangle::new([0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], 2)];
        assert_eq!(padded(&tris), tris.to_vec());
    }

    #[test]
    fn uniforms_match_shader_layout() {
        // Camera is 64 bytes followed by the two counts and padding.
        let info = SceneUniform {
            camera: GpuCamera::default(),
            node_count: 7,
            triangle_count: 12,
            _pad: [0; 2],
        };
        let words: &[u32] = bytemuck::cast_slice(bytemuck::bytes_of(&info));
        assert_eq!(words[16], 7);
        assert_eq!(words[17], 12);
    }

    #[test]
    fn shaders_declare_expected_entry_points() {
        assert!(shaders::TRACE_SHADER.contains("fn trace_main"));
        assert!(shaders::TRACE_SHADER.contains("@workgroup_size(8, 8)"));
        assert!(shaders::BLIT_SHADER.contains("fn vs_blit"));
        assert!(shaders::BLIT_SHADER.contains("fn fs_blit"));
    }
}
