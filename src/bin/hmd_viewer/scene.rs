//! A small test room for the viewer: floor, pillars and the HUD elements.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};

use hmd_stereo::error::{HmdError, Result};
use hmd_stereo::hud::{self, CrosshairContext, CrosshairMarker, WorldTrace};
use hmd_stereo::renderer::{EyeTarget, DEPTH_FORMAT};
use hmd_stereo::{HmdSettings, RenderState, SceneRenderer, WgpuBackend};

const SCENE_WGSL: &str = include_str!("scene.wgsl");

// Must match scene.wgsl.
const FLOOR_EXTENT: f32 = 1024.0;
const RING_RADIUS: f32 = 256.0;
const PILLAR_HALF: f32 = 16.0;
const PILLAR_HEIGHT: f32 = 128.0;
const PILLAR_COUNT: u32 = 8;
/// Line half width per crosshair pixel.
const LINE_WIDTH_SCALE: f32 = 0.25;

/// Player eye height above the floor.
pub const VIEW_HEIGHT: f32 = 22.0;
pub const PLAYER_ORIGIN: Vec3 = Vec3::new(0.0, 0.0, 24.0);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct SceneUniforms {
    view_proj: [[f32; 4]; 4],
    status_bar: [[f32; 4]; 4],
    marker: [f32; 4],
    marker_color: [f32; 4],
    line_start: [f32; 4],
    line_end: [f32; 4],
}

/// Crosshair geometry for one eye, in the layout of [`SceneUniforms`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct CrosshairGeometry {
    /// Point position and half size; zero size hides it.
    point: [f32; 4],
    /// Segment start and half width; zero width hides it.
    line_start: [f32; 4],
    line_end: [f32; 4],
    color: [f32; 4],
}

impl CrosshairGeometry {
    fn from_marker(marker: Option<CrosshairMarker>) -> Self {
        match marker {
            Some(CrosshairMarker::Point { position, size, color }) => Self {
                point: position.extend(size).to_array(),
                color,
                ..Default::default()
            },
            Some(CrosshairMarker::Line { start, end, width, color }) => Self {
                line_start: start.extend(width * LINE_WIDTH_SCALE).to_array(),
                line_end: end.extend(0.0).to_array(),
                color,
                ..Default::default()
            },
            None => Self::default(),
        }
    }
}

/// Collision for the test room: the floor plane and the pillar boxes.
pub struct RoomTrace;

impl RoomTrace {
    fn pillar_bounds(index: u32) -> (Vec3, Vec3) {
        let angle = index as f32 * std::f32::consts::FRAC_PI_4;
        let centre = Vec2::new(angle.cos(), angle.sin()) * RING_RADIUS;
        (
            Vec3::new(centre.x - PILLAR_HALF, centre.y - PILLAR_HALF, 0.0),
            Vec3::new(centre.x + PILLAR_HALF, centre.y + PILLAR_HALF, PILLAR_HEIGHT),
        )
    }

    /// Fraction along `start..end` of the first hit, if any.
    fn hit_fraction(start: Vec3, end: Vec3) -> Option<f32> {
        let dir = end - start;
        let mut best: Option<f32> = None;

        if dir.z < 0.0 && start.z > 0.0 {
            let t = start.z / -dir.z;
            let p = start + dir * t;
            if t <= 1.0 && p.x.abs() <= FLOOR_EXTENT && p.y.abs() <= FLOOR_EXTENT {
                best = Some(t);
            }
        }

        for i in 0..PILLAR_COUNT {
            let (min, max) = Self::pillar_bounds(i);
            if let Some(t) = slab_test(start, dir, min, max) {
                if best.map_or(true, |b| t < b) {
                    best = Some(t);
                }
            }
        }
        best
    }
}

fn slab_test(start: Vec3, dir: Vec3, min: Vec3, max: Vec3) -> Option<f32> {
    let mut t_near = 0.0_f32;
    let mut t_far = 1.0_f32;
    for axis in 0..3 {
        let (s, d) = (start[axis], dir[axis]);
        if d.abs() < 1e-6 {
            if s < min[axis] || s > max[axis] {
                return None;
            }
            continue;
        }
        let (mut t0, mut t1) = ((min[axis] - s) / d, (max[axis] - s) / d);
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }
        t_near = t_near.max(t0);
        t_far = t_far.min(t1);
        if t_near > t_far {
            return None;
        }
    }
    Some(t_near)
}

impl WorldTrace for RoomTrace {
    fn trace_line(&self, start: Vec3, end: Vec3) -> Vec3 {
        match Self::hit_fraction(start, end) {
            Some(t) => start.lerp(end, t),
            None => end,
        }
    }

    // The room has no entities, so this stops at walls the same way.
    fn trace_to_entity(&self, start: Vec3, end: Vec3) -> Vec3 {
        self.trace_line(start, end)
    }
}

pub struct RoomScene {
    pipeline: wgpu::RenderPipeline,
    uniform_buffers: [wgpu::Buffer; 2],
    bind_groups: [wgpu::BindGroup; 2],
    settings: HmdSettings,
    window_width: u32,
}

impl RoomScene {
    pub fn new(backend: &WgpuBackend) -> Self {
        let device = backend.device();

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Room Shader"),
            source: wgpu::ShaderSource::Wgsl(SCENE_WGSL.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Room Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        // one per eye so both writes in a frame survive until submit
        let make_buffer = |label| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: std::mem::size_of::<SceneUniforms>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let uniform_buffers = [make_buffer("Room Uniforms Left"), make_buffer("Room Uniforms Right")];
        let bind_groups = [0, 1].map(|i| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Room Bind Group"),
                layout: &bind_group_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffers[i].as_entire_binding(),
                }],
            })
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Room Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Room Pipeline"),
            layout: Some(&pipeline_layout),
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
                    format: backend.surface_format(),
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            pipeline,
            uniform_buffers,
            bind_groups,
            settings: HmdSettings::default(),
            window_width: backend.surface_size().0,
        }
    }

    /// Crosshair and status bar follow these settings from the next frame.
    pub fn update_hud(&mut self, settings: &HmdSettings, window_width: u32) {
        self.settings = settings.clone();
        self.window_width = window_width;
    }

    fn crosshair(&self, state: &RenderState) -> CrosshairGeometry {
        let ctx = CrosshairContext {
            view_origin: state.view_origin,
            view_height: VIEW_HEIGHT,
            aim: state.aim_angles,
            window_width: self.window_width,
            melee: false,
        };
        CrosshairGeometry::from_marker(hud::crosshair_marker(&ctx, &self.settings, &RoomTrace))
    }
}

impl SceneRenderer<WgpuBackend> for RoomScene {
    fn render_scene_once(&mut self, backend: &mut WgpuBackend, target: &EyeTarget, state: &mut RenderState) -> Result<()> {
        let index = target.eye().index();
        let crosshair = self.crosshair(state);
        let status_bar: Mat4 = hud::status_bar_transform(state.view_origin, state.aim_angles, self.settings.aim_mode);
        let uniforms = SceneUniforms {
            view_proj: state.view_projection().to_cols_array_2d(),
            status_bar: status_bar.to_cols_array_2d(),
            marker: crosshair.point,
            marker_color: crosshair.color,
            line_start: crosshair.line_start,
            line_end: crosshair.line_end,
        };
        backend
            .queue()
            .write_buffer(&self.uniform_buffers[index], 0, bytemuck::bytes_of(&uniforms));

        let encoder = backend
            .encoder()
            .ok_or_else(|| HmdError::Frame("scene drawn outside a frame".into()))?;
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Room Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target.color_view(),
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: target.depth_view(),
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_groups[index], &[]);
        pass.draw(0..6, 0..1);
        pass.draw(0..36, 1..PILLAR_COUNT + 1);
        if crosshair.point[3] > 0.0 {
            pass.draw(0..36, 9..10);
        }
        pass.draw(0..6, 10..11);
        if crosshair.line_start[3] > 0.0 {
            pass.draw(0..36, 11..12);
        }
        Ok(())
    }
}
