//! Per-eye configuration: viewport, projection, view offset and target size.

use glam::{Mat4, Vec4};

use crate::device::HmdDeviceSettings;
use crate::error::{HmdError, Result};
use crate::pose::UNITS_PER_METER;
use crate::settings::HmdSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    pub const BOTH: [Eye; 2] = [Eye::Left, Eye::Right];

    pub fn index(self) -> usize {
        match self {
            Eye::Left => 0,
            Eye::Right => 1,
        }
    }

    /// -1 for the left eye, +1 for the right.
    pub fn sign(self) -> f32 {
        match self {
            Eye::Left => -1.0,
            Eye::Right => 1.0,
        }
    }
}

/// How the two eyes share the presented surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EyeLayout {
    /// Left half / right half.
    #[default]
    Horizontal,
    /// Top half / bottom half.
    Vertical,
}

/// Fraction of the presented surface covered by one eye.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeViewport {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl EyeViewport {
    pub fn for_eye(eye: Eye, layout: EyeLayout) -> Self {
        match (layout, eye) {
            (EyeLayout::Horizontal, Eye::Left) => Self { left: 0.0, top: 0.0, width: 0.5, height: 1.0 },
            (EyeLayout::Horizontal, Eye::Right) => Self { left: 0.5, top: 0.0, width: 0.5, height: 1.0 },
            (EyeLayout::Vertical, Eye::Left) => Self { left: 0.0, top: 0.0, width: 1.0, height: 0.5 },
            (EyeLayout::Vertical, Eye::Right) => Self { left: 0.0, top: 0.5, width: 1.0, height: 0.5 },
        }
    }

    /// Pixel rectangle of this viewport on a `width` x `height` surface.
    pub fn to_pixels(&self, width: u32, height: u32) -> PixelRect {
        PixelRect {
            x: (width as f32 * self.left).round() as u32,
            y: (height as f32 * self.top).round() as u32,
            width: ((width as f32 * self.width).round() as u32).max(1),
            height: ((height as f32 * self.height).round() as u32).max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Everything needed to render and composite one eye.
#[derive(Debug, Clone, PartialEq)]
pub struct EyeConfig {
    pub eye: Eye,
    pub layout: EyeLayout,
    pub viewport: EyeViewport,
    pub target_width: u32,
    pub target_height: u32,
    pub projection: Mat4,
    /// Sideways camera offset in world units, negative for the left eye.
    pub view_offset: f32,
    /// Lens centre in normalised eye coordinates, used by the warp pass.
    pub lens_shift: f32,
    pub aspect: f32,
    pub fov_x: f32,
    pub fov_y: f32,
}

/// Compute both eyes for the given window size, settings and device.
pub fn configure_eyes(
    window: (u32, u32),
    settings: &HmdSettings,
    device: &HmdDeviceSettings,
) -> Result<[EyeConfig; 2]> {
    let (width, height) = window;
    if width == 0 || height == 0 {
        return Err(HmdError::InvalidConfiguration(format!("window size {}x{}", width, height)));
    }
    let ss = settings.supersample;
    if !(HmdSettings::SUPERSAMPLE_MIN..=HmdSettings::SUPERSAMPLE_MAX).contains(&ss) {
        return Err(HmdError::InvalidConfiguration(format!("supersample factor {}", ss)));
    }
    if !(settings.near_clip > 0.0 && settings.far_clip > settings.near_clip) {
        return Err(HmdError::InvalidConfiguration(format!(
            "clip planes {} / {}",
            settings.near_clip, settings.far_clip
        )));
    }
    device.validate()?;

    let ipd = settings.ipd_mm / 1000.0;
    let half_offset = ipd * UNITS_PER_METER * 0.5;

    let lens_shift = device.lens_shift();
    let r = -1.0 - lens_shift;
    let dist_scale = device.distortion_scale(r * r);
    let fov_y = 2.0 * (device.v_screen_size * dist_scale).atan2(2.0 * device.eye_to_screen_distance);

    // projection centre offset for this user's eye separation
    let h = 4.0 * (device.h_screen_size / 4.0 - ipd / 2.0) / device.h_screen_size;

    let configure = |eye: Eye| {
        let viewport = EyeViewport::for_eye(eye, settings.layout);
        let aspect = (device.h_resolution as f32 * viewport.width)
            / (device.v_resolution as f32 * viewport.height);
        // left eye shifts the frustum right, right eye shifts it left
        let centre = -eye.sign() * h;

        EyeConfig {
            eye,
            layout: settings.layout,
            viewport,
            target_width: ((width as f32 * viewport.width * ss).round() as u32).max(1),
            target_height: ((height as f32 * viewport.height * ss).round() as u32).max(1),
            projection: off_centre_perspective(fov_y, aspect, settings.near_clip, settings.far_clip, centre),
            view_offset: eye.sign() * half_offset,
            lens_shift: -eye.sign() * lens_shift,
            aspect,
            fov_x: fov_y.to_degrees() * aspect,
            fov_y: fov_y.to_degrees(),
        }
    };

    Ok([configure(Eye::Left), configure(Eye::Right)])
}

/// Right-handed perspective with depth in [0, 1] and the frustum centre
/// shifted horizontally by `h` in clip space.
pub fn off_centre_perspective(fov_y: f32, aspect: f32, near: f32, far: f32, h: f32) -> Mat4 {
    let f = 1.0 / (fov_y / 2.0).tan();
    let z_scale = far / (near - far);
    let z_offset = near * far / (near - far);

    Mat4::from_cols(
        Vec4::new(f / aspect, 0.0, 0.0, 0.0),
        Vec4::new(0.0, f, 0.0, 0.0),
        Vec4::new(-h, 0.0, z_scale, -1.0),
        Vec4::new(0.0, 0.0, z_offset, 0.0),
    )
}
