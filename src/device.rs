//! Physical display and lens description of an HMD.

use crate::error::{HmdError, Result};

/// Static optics/display descriptor supplied by the tracker at enable time.
///
/// Lengths are metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HmdDeviceSettings {
    pub h_resolution: u32,
    pub v_resolution: u32,
    pub h_screen_size: f32,
    pub v_screen_size: f32,
    pub interpupillary_distance: f32,
    pub lens_separation_distance: f32,
    pub eye_to_screen_distance: f32,
    /// Radial distortion polynomial `k0 + k1 r^2 + k2 r^4 + k3 r^6`.
    pub distortion_k: [f32; 4],
    /// Red scale, red r^2 scale, blue scale, blue r^2 scale.
    pub chrom_abr: [f32; 4],
}

impl HmdDeviceSettings {
    /// First Oculus Rift development kit.
    pub fn rift_dk1() -> Self {
        Self {
            h_resolution: 1280,
            v_resolution: 800,
            h_screen_size: 0.14976,
            v_screen_size: 0.0936,
            interpupillary_distance: 0.064,
            lens_separation_distance: 0.064,
            eye_to_screen_distance: 0.041,
            distortion_k: [1.0, 0.22, 0.24, 0.0],
            chrom_abr: [0.996, -0.004, 1.014, 0.0],
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.h_resolution == 0 || self.v_resolution == 0 {
            return Err(HmdError::DeviceDescriptor(format!(
                "display resolution {}x{}",
                self.h_resolution, self.v_resolution
            )));
        }
        let lengths = [
            ("h_screen_size", self.h_screen_size),
            ("v_screen_size", self.v_screen_size),
            ("eye_to_screen_distance", self.eye_to_screen_distance),
        ];
        for (name, value) in lengths {
            if !(value.is_finite() && value > 0.0) {
                return Err(HmdError::DeviceDescriptor(format!("{} = {}", name, value)));
            }
        }
        if self.distortion_k.iter().chain(&self.chrom_abr).any(|k| !k.is_finite()) {
            return Err(HmdError::DeviceDescriptor("non-finite lens coefficients".into()));
        }
        Ok(())
    }

    /// Evaluate the radial distortion polynomial at squared radius `r_sq`.
    pub fn distortion_scale(&self, r_sq: f32) -> f32 {
        let k = &self.distortion_k;
        k[0] + k[1] * r_sq + k[2] * r_sq * r_sq + k[3] * r_sq * r_sq * r_sq
    }

    /// Horizontal lens centre offset from the centre of each half-screen, in
    /// normalised device units.
    pub fn lens_shift(&self) -> f32 {
        4.0 * (self.h_screen_size / 4.0 - self.lens_separation_distance / 2.0) / self.h_screen_size
    }
}

impl Default for HmdDeviceSettings {
    fn default() -> Self {
        Self::rift_dk1()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dk1_is_valid() {
        assert!(HmdDeviceSettings::rift_dk1().validate().is_ok());
    }

    #[test]
    fn rejects_zero_resolution() {
        let mut device = HmdDeviceSettings::rift_dk1();
        device.v_resolution = 0;
        assert!(matches!(device.validate(), Err(HmdError::DeviceDescriptor(_))));
    }

    #[test]
    fn rejects_bad_screen_size() {
        let mut device = HmdDeviceSettings::rift_dk1();
        device.eye_to_screen_distance = f32::NAN;
        assert!(device.validate().is_err());
    }

    #[test]
    fn distortion_polynomial() {
        let device = HmdDeviceSettings::rift_dk1();
        assert_eq!(device.distortion_scale(0.0), 1.0);
        let expected = 1.0 + 0.22 * 4.0 + 0.24 * 16.0;
        assert!((device.distortion_scale(4.0) - expected).abs() < 1e-5);
    }
}
