//! GPU side of the HMD pipeline.
//!
//! Capabilities are negotiated once when a backend is created; everything the
//! stereo path needs is then checked in one place by [`Capabilities::require`].

use crate::distortion::DistortionParams;
use crate::error::{HmdError, Result};
use crate::eye::EyeConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Render-to-texture with a depth attachment.
    pub offscreen_targets: bool,
    /// Programmable fragment shading for the lens warp.
    pub shaders: bool,
    pub max_texture_dimension: u32,
    /// An external compositor accepts eye targets directly.
    pub compositor: bool,
}

/// One thing the stereo path needs from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    OffscreenTargets,
    Shaders,
    Compositor,
    TextureSize { width: u32, height: u32 },
}

impl Capabilities {
    pub fn require(&self, needs: &[Requirement]) -> Result<()> {
        for need in needs {
            let met = match *need {
                Requirement::OffscreenTargets => self.offscreen_targets,
                Requirement::Shaders => self.shaders,
                Requirement::Compositor => self.compositor,
                Requirement::TextureSize { width, height } => {
                    width <= self.max_texture_dimension && height <= self.max_texture_dimension
                }
            };
            if !met {
                return Err(HmdError::MissingCapability(match need {
                    Requirement::OffscreenTargets => "offscreen render targets",
                    Requirement::Shaders => "fragment shaders",
                    Requirement::Compositor => "external compositor",
                    Requirement::TextureSize { .. } => "eye target size",
                }));
            }
        }
        Ok(())
    }
}

/// Render target and composite operations used by the HMD system.
///
/// A frame is `begin_frame`, then for each eye `begin_eye`, scene drawing and
/// `end_eye`, then either `composite_eye` per eye or one
/// `submit_to_compositor`, then `end_frame`.
pub trait RenderBackend {
    type Target;

    fn capabilities(&self) -> Capabilities;

    fn create_eye_target(&mut self, eye: &EyeConfig) -> Result<Self::Target>;
    fn release_eye_target(&mut self, target: Self::Target);

    /// Build the lens warp pass. Replaces any previous one.
    fn prepare_distortion(&mut self, params: &DistortionParams, chromatic: bool) -> Result<()>;
    fn release_distortion(&mut self);

    fn begin_frame(&mut self) -> Result<()>;
    fn end_frame(&mut self) -> Result<()>;

    /// Bind and clear the eye target.
    fn begin_eye(&mut self, target: &Self::Target) -> Result<()>;
    fn end_eye(&mut self, target: &Self::Target) -> Result<()>;

    /// Warp one eye target onto its viewport of the presented surface.
    fn composite_eye(&mut self, target: &Self::Target, eye: &EyeConfig) -> Result<()>;
    /// Hand both undistorted eye targets to the compositor.
    fn submit_to_compositor(&mut self, targets: [&Self::Target; 2], eyes: &[EyeConfig; 2]) -> Result<()>;

    /// Eye targets created and not yet released.
    fn live_targets(&self) -> usize;
}


#[cfg(test)]
mod tests {
    use super::*;

    fn full() -> Capabilities {
        Capabilities {
            offscreen_targets: true,
            shaders: true,
            max_texture_dimension: 4096,
            compositor: false,
        }
    }

    #[test]
    fn met_requirements_pass() {
        let needs = [
            Requirement::OffscreenTargets,
            Requirement::Shaders,
            Requirement::TextureSize { width: 2560, height: 1600 },
        ];
        assert!(full().require(&needs).is_ok());
    }

    #[test]
    fn missing_capability_is_named() {
        let caps = Capabilities { shaders: false, ..full() };
        let err = caps.require(&[Requirement::OffscreenTargets, Requirement::Shaders]);
        assert!(matches!(err, Err(HmdError::MissingCapability("fragment shaders"))));

        let err = full().require(&[Requirement::Compositor]);
        assert!(matches!(err, Err(HmdError::MissingCapability("external compositor"))));
    }

    #[test]
    fn oversized_target_is_rejected() {
        let err = full().require(&[Requirement::TextureSize { width: 5000, height: 100 }]);
        assert!(matches!(err, Err(HmdError::MissingCapability("eye target size"))));
    }
}
