//! Per-eye scene rendering.
//!
//! The engine's view globals are swapped for one eye's values by
//! [`EyeOverride`] and put back when it goes out of scope, however the scene
//! render exits.

use std::ops::{Deref, DerefMut};

use glam::{Mat4, Vec3};

use crate::angles::Angles;
use crate::backend::RenderBackend;
use crate::error::Result;
use crate::eye::{EyeConfig, PixelRect};
use crate::random::SeededRandom;

/// View globals the scene renderer reads.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderState {
    /// Size of the surface being rendered to.
    pub width: u32,
    pub height: u32,
    /// Rectangle of that surface the 3D view fills.
    pub viewport: PixelRect,
    pub fov_x: f32,
    pub fov_y: f32,
    pub projection: Mat4,
    /// World position of the player's eyes.
    pub view_origin: Vec3,
    pub view_angles: Angles,
    pub aim_angles: Angles,
    /// Tracked head position in world units, relative to `view_origin`.
    pub head_offset: Vec3,
    /// Sideways offset along the view's right vector, in world units.
    pub eye_offset: f32,
    pub rng: SeededRandom,
}

impl RenderState {
    /// Monoscopic state for a `width` x `height` surface.
    pub fn new(width: u32, height: u32) -> Self {
        let aspect = width.max(1) as f32 / height.max(1) as f32;
        let fov_x = 90.0_f32;
        let fov_y = 2.0 * ((fov_x.to_radians() / 2.0).tan() / aspect).atan();
        Self {
            width,
            height,
            viewport: PixelRect { x: 0, y: 0, width, height },
            fov_x,
            fov_y: fov_y.to_degrees(),
            projection: Mat4::perspective_rh(fov_y, aspect, 4.0, 16384.0),
            view_origin: Vec3::ZERO,
            view_angles: Angles::ZERO,
            aim_angles: Angles::ZERO,
            head_offset: Vec3::ZERO,
            eye_offset: 0.0,
            rng: SeededRandom::default(),
        }
    }

    /// Camera position for this eye.
    pub fn eye_origin(&self) -> Vec3 {
        let (_, right, _) = self.view_angles.vectors();
        self.view_origin + self.head_offset + right * self.eye_offset
    }

    /// World to view transform for this eye.
    pub fn view_matrix(&self) -> Mat4 {
        let (forward, _, up) = self.view_angles.vectors();
        Mat4::look_to_rh(self.eye_origin(), forward, up)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view_matrix()
    }
}

/// Scoped override of [`RenderState`] with one eye's values.
pub struct EyeOverride<'a> {
    state: &'a mut RenderState,
    saved: RenderState,
}

impl<'a> EyeOverride<'a> {
    pub fn apply(state: &'a mut RenderState, eye: &EyeConfig, time: f64) -> Self {
        let saved = state.clone();
        state.width = eye.target_width;
        state.height = eye.target_height;
        state.viewport = PixelRect {
            x: 0,
            y: 0,
            width: eye.target_width,
            height: eye.target_height,
        };
        state.fov_x = eye.fov_x;
        state.fov_y = eye.fov_y;
        state.projection = eye.projection;
        state.eye_offset = eye.view_offset;
        state.rng = SeededRandom::from_time(time);
        Self { state, saved }
    }
}

impl Deref for EyeOverride<'_> {
    type Target = RenderState;

    fn deref(&self) -> &RenderState {
        self.state
    }
}

impl DerefMut for EyeOverride<'_> {
    fn deref_mut(&mut self) -> &mut RenderState {
        self.state
    }
}

impl Drop for EyeOverride<'_> {
    fn drop(&mut self) {
        std::mem::swap(self.state, &mut self.saved);
    }
}

/// The engine's world renderer.
pub trait SceneRenderer<B: RenderBackend> {
    /// Draw the world once into `target` using the view in `state`.
    fn render_scene_once(&mut self, backend: &mut B, target: &B::Target, state: &mut RenderState) -> Result<()>;
}

/// Render one eye: bind its target, override the view, draw, restore.
pub fn render_eye<B, S>(
    backend: &mut B,
    scene: &mut S,
    target: &B::Target,
    eye: &EyeConfig,
    state: &mut RenderState,
    time: f64,
) -> Result<()>
where
    B: RenderBackend,
    S: SceneRenderer<B> + ?Sized,
{
    backend.begin_eye(target)?;
    let drawn = {
        let mut view = EyeOverride::apply(state, eye, time);
        scene.render_scene_once(backend, target, &mut view)
    };
    let ended = backend.end_eye(target);
    drawn.and(ended)
}
