//! User-tunable HMD settings with console-variable style access.

use log::{debug, warn};

use crate::distortion::DistortionMode;
use crate::error::{HmdError, Result};
use crate::eye::EyeLayout;
use crate::hud::CrosshairStyle;
use crate::pose::{AimMode, DeadzoneAngle};

/// Names accepted by [`HmdSettings::set_cvar`], in archive order.
pub const CVAR_NAMES: [&str; 14] = [
    "vr_enabled",
    "vr_aimmode",
    "vr_deadzone",
    "vr_ipd",
    "vr_supersample",
    "vr_layout",
    "vr_nearclip",
    "gl_farclip",
    "vr_crosshair",
    "vr_crosshair_depth",
    "vr_crosshair_size",
    "vr_crosshair_alpha",
    "vr_chromabr",
    "vr_distortion",
];

#[derive(Debug, Clone, PartialEq)]
pub struct HmdSettings {
    pub enabled: bool,
    pub aim_mode: AimMode,
    pub deadzone: DeadzoneAngle,
    /// Interpupillary distance in millimetres.
    pub ipd_mm: f32,
    /// Eye target scale relative to the window, 1.0 to 2.0.
    pub supersample: f32,
    pub layout: EyeLayout,
    pub near_clip: f32,
    pub far_clip: f32,
    pub crosshair: CrosshairStyle,
    /// Metres; 0 traces to the first wall.
    pub crosshair_depth: f32,
    pub crosshair_size: f32,
    pub crosshair_alpha: f32,
    pub chromatic_aberration: bool,
    pub distortion: DistortionMode,
}

impl Default for HmdSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            aim_mode: AimMode::Blended,
            deadzone: DeadzoneAngle::default(),
            ipd_mm: 64.0,
            supersample: 1.0,
            layout: EyeLayout::Horizontal,
            near_clip: 4.0,
            far_clip: 16384.0,
            crosshair: CrosshairStyle::Point,
            crosshair_depth: 0.0,
            crosshair_size: 3.0,
            crosshair_alpha: 0.25,
            chromatic_aberration: true,
            distortion: DistortionMode::LensWarp,
        }
    }
}

impl HmdSettings {
    pub const SUPERSAMPLE_MIN: f32 = 1.0;
    pub const SUPERSAMPLE_MAX: f32 = 2.0;

    /// Set a value from its console name and string form.
    pub fn set_cvar(&mut self, name: &str, value: &str) -> Result<()> {
        let number = || {
            value
                .trim()
                .trim_matches('"')
                .parse::<f32>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| HmdError::InvalidValue {
                    name: name.to_string(),
                    value: value.to_string(),
                })
        };

        match name {
            "vr_enabled" => self.enabled = number()? != 0.0,
            "vr_aimmode" => self.aim_mode = AimMode::from_index(number()? as i32),
            "vr_deadzone" => self.deadzone = DeadzoneAngle::new(number()?),
            "vr_ipd" => self.ipd_mm = number()?.clamp(40.0, 90.0),
            "vr_supersample" => {
                self.supersample = number()?.clamp(Self::SUPERSAMPLE_MIN, Self::SUPERSAMPLE_MAX)
            }
            "vr_layout" => {
                self.layout = if number()? != 0.0 { EyeLayout::Vertical } else { EyeLayout::Horizontal }
            }
            "vr_nearclip" => {
                let near = number()?.max(0.01);
                if near >= self.far_clip {
                    return Err(HmdError::InvalidConfiguration(format!(
                        "near clip {} must be below far clip {}",
                        near, self.far_clip
                    )));
                }
                self.near_clip = near;
            }
            "gl_farclip" => self.far_clip = number()?.max(self.near_clip + 1.0),
            "vr_crosshair" => self.crosshair = CrosshairStyle::from_index(number()? as i32),
            "vr_crosshair_depth" => self.crosshair_depth = number()?.clamp(0.0, 4096.0),
            "vr_crosshair_size" => self.crosshair_size = number()?.clamp(0.0, 32.0),
            "vr_crosshair_alpha" => self.crosshair_alpha = number()?.clamp(0.0, 1.0),
            "vr_chromabr" => self.chromatic_aberration = number()? != 0.0,
            "vr_distortion" => {
                self.distortion = if number()? != 0.0 {
                    DistortionMode::Compositor
                } else {
                    DistortionMode::LensWarp
                }
            }
            _ => return Err(HmdError::UnknownSetting(name.to_string())),
        }

        debug!("{} set to {}", name, value);
        Ok(())
    }

    pub fn cvar(&self, name: &str) -> Option<String> {
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        let value = match name {
            "vr_enabled" => flag(self.enabled),
            "vr_aimmode" => self.aim_mode.index() as f32,
            "vr_deadzone" => self.deadzone.degrees(),
            "vr_ipd" => self.ipd_mm,
            "vr_supersample" => self.supersample,
            "vr_layout" => flag(self.layout == EyeLayout::Vertical),
            "vr_nearclip" => self.near_clip,
            "gl_farclip" => self.far_clip,
            "vr_crosshair" => self.crosshair.index() as f32,
            "vr_crosshair_depth" => self.crosshair_depth,
            "vr_crosshair_size" => self.crosshair_size,
            "vr_crosshair_alpha" => self.crosshair_alpha,
            "vr_chromabr" => flag(self.chromatic_aberration),
            "vr_distortion" => flag(self.distortion == DistortionMode::Compositor),
            _ => return None,
        };
        Some(format_value(value))
    }

    /// `name "value"` lines suitable for a config file.
    pub fn archive_lines(&self) -> Vec<String> {
        CVAR_NAMES
            .iter()
            .filter_map(|name| self.cvar(name).map(|v| format!("{} \"{}\"", name, v)))
            .collect()
    }

    /// Apply lines produced by [`archive_lines`](Self::archive_lines), skipping
    /// blanks and `//` comments. Lines that do not parse are logged and
    /// skipped; returns how many were skipped.
    pub fn load_archive(&mut self, text: &str) -> usize {
        let mut lines: Vec<(&str, &str)> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with("//"))
            .map(|line| {
                let (name, value) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
                (name, value.trim())
            })
            .collect();
        // near clip is checked against far clip, so it goes last
        lines.sort_by_key(|(name, _)| *name == "vr_nearclip");

        let mut skipped = 0;
        for (name, value) in lines {
            if let Err(e) = self.set_cvar(name, value) {
                warn!("Skipping saved setting: {}", e);
                skipped += 1;
            }
        }
        skipped
    }

    /// True when switching from `self` to `other` invalidates the eye setup.
    pub fn requires_reconfigure(&self, other: &HmdSettings) -> bool {
        self.enabled != other.enabled
            || self.ipd_mm != other.ipd_mm
            || self.supersample != other.supersample
            || self.layout != other.layout
            || self.near_clip != other.near_clip
            || self.far_clip != other.far_clip
            || self.chromatic_aberration != other.chromatic_aberration
            || self.distortion != other.distortion
    }
}

fn format_value(value: f32) -> String {
    if value.fract() == 0.0 && value.abs() < 1e9 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
