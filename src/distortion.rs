//! Lens warp parameters for the composite pass.
//!
//! [`DistortionParams::sample`] mirrors the WGSL in `shaders/lens_warp*.wgsl`
//! so the optics can be checked without a GPU.

use bytemuck::{Pod, Zeroable};

use crate::device::HmdDeviceSettings;

/// Who corrects the lens distortion and assembles the final frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistortionMode {
    /// Our own full-screen warp shader.
    #[default]
    LensWarp,
    /// Eye targets are handed to an external compositor untouched.
    Compositor,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistortionParams {
    pub warp: [f32; 4],
    pub chrom_ab: [f32; 4],
    /// Distorted coordinates back to texture space.
    pub scale: [f32; 2],
    /// Screen coordinates into lens space (corrects for aspect).
    pub scale_in: [f32; 2],
}

/// Texture coordinates sampled for each colour channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelCoords {
    pub red: [f32; 2],
    pub green: [f32; 2],
    pub blue: [f32; 2],
}

impl DistortionParams {
    pub fn new(device: &HmdDeviceSettings, aspect: f32) -> Self {
        let r = -1.0 - device.lens_shift();
        let dist_scale = device.distortion_scale(r * r);
        Self {
            warp: device.distortion_k,
            chrom_ab: device.chrom_abr,
            scale: [1.0 / dist_scale, aspect / dist_scale],
            scale_in: [1.0, 1.0 / aspect],
        }
    }

    /// No warp, no aberration: the target is copied straight through.
    pub fn identity() -> Self {
        Self {
            warp: [1.0, 0.0, 0.0, 0.0],
            chrom_ab: [1.0, 0.0, 1.0, 0.0],
            scale: [1.0, 1.0],
            scale_in: [1.0, 1.0],
        }
    }

    fn warp_factor(&self, r_sq: f32) -> f32 {
        let k = &self.warp;
        k[0] + k[1] * r_sq + k[2] * r_sq * r_sq + k[3] * r_sq * r_sq * r_sq
    }

    /// Where the output pixel at `uv` (in [0, 1]^2) reads from the eye target.
    ///
    /// `None` means the lookup falls outside the target and the pixel is black.
    pub fn sample(&self, uv: [f32; 2], lens_center: [f32; 2], chromatic: bool) -> Option<ChannelCoords> {
        let p = [uv[0] * 2.0 - 1.0, uv[1] * 2.0 - 1.0];
        let theta = [
            (p[0] - lens_center[0]) * self.scale_in[0],
            (p[1] - lens_center[1]) * self.scale_in[1],
        ];
        let r_sq = theta[0] * theta[0] + theta[1] * theta[1];
        let factor = self.warp_factor(r_sq);
        let warped = [theta[0] * factor, theta[1] * factor];

        let to_texture = |t: [f32; 2], s: f32| {
            [
                (lens_center[0] + self.scale[0] * t[0] * s + 1.0) / 2.0,
                (lens_center[1] + self.scale[1] * t[1] * s + 1.0) / 2.0,
            ]
        };
        let inside = |tc: [f32; 2]| (0.0..=1.0).contains(&tc[0]) && (0.0..=1.0).contains(&tc[1]);

        if !chromatic {
            let tc = to_texture(warped, 1.0);
            return inside(tc).then_some(ChannelCoords { red: tc, green: tc, blue: tc });
        }

        // blue is scaled out the furthest, so it decides the black border
        let blue = to_texture(warped, self.chrom_ab[2] + self.chrom_ab[3] * r_sq);
        if !inside(blue) {
            return None;
        }
        let green = to_texture(warped, 1.0);
        let red = to_texture(warped, self.chrom_ab[0] + self.chrom_ab[1] * r_sq);
        Some(ChannelCoords { red, green, blue })
    }

    pub fn uniforms(&self, lens_shift: f32, layout_vertical: bool) -> DistortionUniforms {
        DistortionUniforms {
            warp: self.warp,
            chrom_ab: self.chrom_ab,
            scale: self.scale,
            scale_in: self.scale_in,
            lens_center: lens_center(lens_shift, layout_vertical),
            _padding: [0.0; 2],
        }
    }
}

/// Lens centre offset along the axis the eyes are split on.
pub fn lens_center(lens_shift: f32, layout_vertical: bool) -> [f32; 2] {
    if layout_vertical {
        [0.0, lens_shift]
    } else {
        [lens_shift, 0.0]
    }
}

// Matches `struct Warp` in the lens warp shaders
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct DistortionUniforms {
    pub warp: [f32; 4],
    pub chrom_ab: [f32; 4],
    pub scale: [f32; 2],
    pub scale_in: [f32; 2],
    pub lens_center: [f32; 2],
    pub _padding: [f32; 2],
}

pub const LENS_WARP_WGSL: &str = include_str!("shaders/lens_warp.wgsl");
pub const LENS_WARP_CHROMA_WGSL: &str = include_str!("shaders/lens_warp_chroma.wgsl");

pub fn shader_source(chromatic: bool) -> &'static str {
    if chromatic {
        LENS_WARP_CHROMA_WGSL
    } else {
        LENS_WARP_WGSL
    }
}
