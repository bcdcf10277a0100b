//! wgpu backend
//!
//! Owns the presented surface, one colour + depth target per eye and the lens
//! warp pipeline that composites both eyes onto the surface.

use std::sync::Arc;

use log::{debug, info, warn};
use wgpu::{
    BindGroup, BindGroupLayout, Buffer, CommandEncoder, Device, Instance, InstanceDescriptor,
    PipelineLayout, Queue, RenderPipeline, Sampler, Surface, SurfaceConfiguration, Texture,
    TextureFormat, TextureUsages, TextureView,
};
use winit::window::Window;

use crate::backend::{Capabilities, RenderBackend, Requirement};
use crate::distortion::{self, DistortionParams, DistortionUniforms};
use crate::error::{HmdError, Result};
use crate::eye::{Eye, EyeConfig, EyeLayout, EyeViewport};

pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

/// Offscreen colour and depth for one eye, plus its warp uniforms.
pub struct EyeTarget {
    eye: Eye,
    viewport: EyeViewport,
    width: u32,
    height: u32,
    color: Texture,
    color_view: TextureView,
    depth: Texture,
    depth_view: TextureView,
    warp_buffer: Buffer,
    warp_bind_group: BindGroup,
}

impl EyeTarget {
    pub fn eye(&self) -> Eye {
        self.eye
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn color_view(&self) -> &TextureView {
        &self.color_view
    }

    pub fn depth_view(&self) -> &TextureView {
        &self.depth_view
    }
}

struct DistortionPass {
    pipeline: RenderPipeline,
    params: DistortionParams,
}

struct Frame {
    output: wgpu::SurfaceTexture,
    view: TextureView,
    encoder: CommandEncoder,
    surface_cleared: bool,
}

struct Overlay {
    paint_jobs: Vec<egui::ClippedPrimitive>,
    textures_delta: egui::TexturesDelta,
    pixels_per_point: f32,
}

pub struct WgpuBackend {
    #[allow(dead_code)]
    window: Arc<Window>,
    surface: Surface<'static>,
    device: Device,
    queue: Queue,
    config: SurfaceConfiguration,
    capabilities: Capabilities,

    sampler: Sampler,
    warp_bind_group_layout: BindGroupLayout,
    warp_pipeline_layout: PipelineLayout,
    // plain copy used when handing undistorted eyes to the compositor path
    blit_pipeline: RenderPipeline,
    distortion: Option<DistortionPass>,

    frame: Option<Frame>,
    overlay: Option<Overlay>,
    egui_renderer: egui_wgpu::Renderer,
    live_targets: usize,
}

impl WgpuBackend {
    pub async fn new(window: Arc<Window>) -> Result<Self> {
        let size = window.inner_size();

        let instance = Instance::new(InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| HmdError::SdkInit(format!("surface: {}", e)))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| HmdError::SdkInit("no GPU adapter".into()))?;
        info!("Using adapter {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default(), None)
            .await
            .map_err(|e| HmdError::SdkInit(format!("device: {}", e)))?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| HmdError::SdkInit("surface has no formats".into()))?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let depth_usages = adapter.get_texture_format_features(DEPTH_FORMAT).allowed_usages;
        let capabilities = Capabilities {
            offscreen_targets: depth_usages.contains(TextureUsages::RENDER_ATTACHMENT),
            shaders: true,
            max_texture_dimension: device.limits().max_texture_dimension_2d,
            compositor: true,
        };
        debug!("Backend capabilities: {:?}", capabilities);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Eye Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let warp_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Lens Warp Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let warp_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Lens Warp Pipeline Layout"),
            bind_group_layouts: &[&warp_bind_group_layout],
            push_constant_ranges: &[],
        });

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let blit_pipeline = create_warp_pipeline(
            &device,
            &warp_pipeline_layout,
            surface_format,
            distortion::LENS_WARP_WGSL,
            "Eye Blit Pipeline",
        );
        if let Some(err) = device.pop_error_scope().await {
            return Err(HmdError::ShaderCompile(err.to_string()));
        }

        let egui_renderer = egui_wgpu::Renderer::new(&device, surface_format, None, 1, false);

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            capabilities,
            sampler,
            warp_bind_group_layout,
            warp_pipeline_layout,
            blit_pipeline,
            distortion: None,
            frame: None,
            overlay: None,
            egui_renderer,
            live_targets: 0,
        })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn surface_format(&self) -> TextureFormat {
        self.config.format
    }

    pub fn surface_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    /// Encoder of the frame in progress, for scene renderers.
    pub fn encoder(&mut self) -> Option<&mut CommandEncoder> {
        self.frame.as_mut().map(|f| &mut f.encoder)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    /// UI drawn over the composited frame at the next `end_frame`.
    pub fn queue_overlay(&mut self, ctx: &egui::Context, output: egui::FullOutput) {
        let paint_jobs = ctx.tessellate(output.shapes, output.pixels_per_point);
        // an overlay never drawn (failed frame) still owes its texture uploads
        let textures_delta = match self.overlay.take() {
            Some(mut stale) => {
                stale.textures_delta.append(output.textures_delta);
                stale.textures_delta
            }
            None => output.textures_delta,
        };
        self.overlay = Some(Overlay {
            paint_jobs,
            textures_delta,
            pixels_per_point: output.pixels_per_point,
        });
    }

    fn frame_mut(&mut self) -> Result<&mut Frame> {
        self.frame
            .as_mut()
            .ok_or_else(|| HmdError::Frame("no frame in progress".into()))
    }

    fn draw_overlay(&mut self, frame: &mut Frame) {
        let Some(overlay) = self.overlay.take() else {
            return;
        };
        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [self.config.width, self.config.height],
            pixels_per_point: overlay.pixels_per_point,
        };

        for (id, delta) in &overlay.textures_delta.set {
            self.egui_renderer.update_texture(&self.device, &self.queue, *id, delta);
        }
        self.egui_renderer.update_buffers(
            &self.device,
            &self.queue,
            &mut frame.encoder,
            &overlay.paint_jobs,
            &screen_descriptor,
        );

        {
            let mut render_pass = frame
                .encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("UI Render Pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &frame.view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                })
                .forget_lifetime();
            self.egui_renderer
                .render(&mut render_pass, &overlay.paint_jobs, &screen_descriptor);
        }

        for id in &overlay.textures_delta.free {
            self.egui_renderer.free_texture(id);
        }
    }
}

impl RenderBackend for WgpuBackend {
    type Target = EyeTarget;

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn create_eye_target(&mut self, eye: &EyeConfig) -> Result<EyeTarget> {
        let (width, height) = (eye.target_width, eye.target_height);
        self.capabilities
            .require(&[Requirement::OffscreenTargets, Requirement::TextureSize { width, height }])?;

        let extent = wgpu::Extent3d { width, height, depth_or_array_layers: 1 };
        let color = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Eye Color Target"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.config.format,
            usage: TextureUsages::RENDER_ATTACHMENT | TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let depth = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Eye Depth Target"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());

        let warp_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Lens Warp Buffer"),
            size: std::mem::size_of::<DistortionUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let warp_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Lens Warp Bind Group"),
            layout: &self.warp_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&color_view) },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::Sampler(&self.sampler) },
                wgpu::BindGroupEntry { binding: 2, resource: warp_buffer.as_entire_binding() },
            ],
        });

        self.live_targets += 1;
        debug!("Created {:?} eye target {}x{}", eye.eye, width, height);
        Ok(EyeTarget {
            eye: eye.eye,
            viewport: eye.viewport,
            width,
            height,
            color,
            color_view,
            depth,
            depth_view,
            warp_buffer,
            warp_bind_group,
        })
    }

    fn release_eye_target(&mut self, target: EyeTarget) {
        target.color.destroy();
        target.depth.destroy();
        target.warp_buffer.destroy();
        self.live_targets = self.live_targets.saturating_sub(1);
        debug!("Released {:?} eye target", target.eye);
    }

    fn prepare_distortion(&mut self, params: &DistortionParams, chromatic: bool) -> Result<()> {
        self.capabilities.require(&[Requirement::Shaders])?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = create_warp_pipeline(
            &self.device,
            &self.warp_pipeline_layout,
            self.config.format,
            distortion::shader_source(chromatic),
            if chromatic { "Lens Warp Chroma Pipeline" } else { "Lens Warp Pipeline" },
        );
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(HmdError::ShaderCompile(err.to_string()));
        }

        self.distortion = Some(DistortionPass { pipeline, params: *params });
        Ok(())
    }

    fn release_distortion(&mut self) {
        self.distortion = None;
    }

    fn begin_frame(&mut self) -> Result<()> {
        if self.frame.is_some() {
            return Ok(());
        }
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(e) => {
                warn!("Surface texture unavailable ({}), reconfiguring", e);
                self.surface.configure(&self.device, &self.config);
                return Err(HmdError::Frame(e.to_string()));
            }
        };
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });
        self.frame = Some(Frame { output, view, encoder, surface_cleared: false });
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        let Some(mut frame) = self.frame.take() else {
            return Ok(());
        };
        if !frame.surface_cleared {
            // nothing composited, present black rather than stale contents
            let _clear = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Clear Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        self.draw_overlay(&mut frame);

        self.queue.submit(std::iter::once(frame.encoder.finish()));
        frame.output.present();
        Ok(())
    }

    fn begin_eye(&mut self, target: &EyeTarget) -> Result<()> {
        let frame = self.frame_mut()?;
        let _clear = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Eye Clear Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &target.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        Ok(())
    }

    fn end_eye(&mut self, _target: &EyeTarget) -> Result<()> {
        Ok(())
    }

    fn composite_eye(&mut self, target: &EyeTarget, eye: &EyeConfig) -> Result<()> {
        let pass = self
            .distortion
            .as_ref()
            .ok_or_else(|| HmdError::InvalidConfiguration("lens warp not prepared".into()))?;
        let uniforms = pass.params.uniforms(eye.lens_shift, eye.layout == EyeLayout::Vertical);
        self.queue.write_buffer(&target.warp_buffer, 0, bytemuck::bytes_of(&uniforms));

        let size = (self.config.width, self.config.height);
        let frame = self
            .frame
            .as_mut()
            .ok_or_else(|| HmdError::Frame("no frame in progress".into()))?;
        draw_eye_to_surface(frame, &pass.pipeline, target, size);
        Ok(())
    }

    fn submit_to_compositor(&mut self, targets: [&EyeTarget; 2], _eyes: &[EyeConfig; 2]) -> Result<()> {
        let uniforms = DistortionParams::identity().uniforms(0.0, false);
        let size = (self.config.width, self.config.height);
        let frame = self
            .frame
            .as_mut()
            .ok_or_else(|| HmdError::Frame("no frame in progress".into()))?;
        for target in targets {
            self.queue.write_buffer(&target.warp_buffer, 0, bytemuck::bytes_of(&uniforms));
            draw_eye_to_surface(frame, &self.blit_pipeline, target, size);
        }
        Ok(())
    }

    fn live_targets(&self) -> usize {
        self.live_targets
    }
}

fn draw_eye_to_surface(frame: &mut Frame, pipeline: &RenderPipeline, target: &EyeTarget, surface: (u32, u32)) {
    let load = if frame.surface_cleared {
        wgpu::LoadOp::Load
    } else {
        wgpu::LoadOp::Clear(wgpu::Color::BLACK)
    };
    frame.surface_cleared = true;

    let rect = target.viewport.to_pixels(surface.0, surface.1);
    let mut render_pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Lens Warp Pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: &frame.view,
            resolve_target: None,
            ops: wgpu::Operations { load, store: wgpu::StoreOp::Store },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });
    render_pass.set_viewport(
        rect.x as f32,
        rect.y as f32,
        rect.width as f32,
        rect.height as f32,
        0.0,
        1.0,
    );
    render_pass.set_pipeline(pipeline);
    render_pass.set_bind_group(0, &target.warp_bind_group, &[]);
    render_pass.draw(0..6, 0..1);
}

fn create_warp_pipeline(
    device: &Device,
    layout: &PipelineLayout,
    format: TextureFormat,
    source: &str,
    label: &str,
) -> RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}
