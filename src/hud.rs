//! Crosshair and status bar placement in world space.
//!
//! Flat 2D overlays do not line up across two off-centre projections, so the
//! crosshair is placed where the aim ray lands and the status bar is drawn as
//! a quad floating in front of the player.

use glam::{Mat4, Vec3};

use crate::angles::Angles;
use crate::pose::{AimMode, UNITS_PER_METER};
use crate::settings::HmdSettings;

/// Aim ray length when tracing for the crosshair.
pub const TRACE_DISTANCE: f32 = 4096.0;

/// Scale of the status bar quad (one bar pixel in world units).
pub const STATUS_BAR_SCALE: f32 = 0.03;

const STATUS_BAR_WIDTH: f32 = 320.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrosshairStyle {
    None,
    /// Point where the aim ray hits the world, or at a fixed depth.
    #[default]
    Point,
    /// Laser line from the weapon to the first entity or wall.
    Line,
    /// Point at the far end of the aim ray, no trace.
    PointInfinity,
}

impl CrosshairStyle {
    /// Console value; unknown values draw the default point.
    pub fn from_index(value: i32) -> Self {
        match value {
            0 => CrosshairStyle::None,
            2 => CrosshairStyle::Line,
            3 => CrosshairStyle::PointInfinity,
            _ => CrosshairStyle::Point,
        }
    }

    pub fn index(self) -> i32 {
        match self {
            CrosshairStyle::None => 0,
            CrosshairStyle::Point => 1,
            CrosshairStyle::Line => 2,
            CrosshairStyle::PointInfinity => 3,
        }
    }
}

/// Ray queries against the world, supplied by the engine.
pub trait WorldTrace {
    /// First world surface hit between `start` and `end`, or `end`.
    fn trace_line(&self, start: Vec3, end: Vec3) -> Vec3;
    /// Like [`trace_line`](Self::trace_line) but also stops at entities
    /// other than the player.
    fn trace_to_entity(&self, start: Vec3, end: Vec3) -> Vec3;
}

/// Per-frame player state the crosshair needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrosshairContext {
    /// Origin of the view entity (the weapon model).
    pub view_origin: Vec3,
    pub view_height: f32,
    pub aim: Angles,
    /// Presented surface width in pixels.
    pub window_width: u32,
    /// A melee weapon is held; no crosshair is drawn.
    pub melee: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CrosshairMarker {
    Point { position: Vec3, size: f32, color: [f32; 4] },
    Line { start: Vec3, end: Vec3, width: f32, color: [f32; 4] },
}

/// Where and how to draw the crosshair this frame.
pub fn crosshair_marker(
    ctx: &CrosshairContext,
    settings: &HmdSettings,
    trace: &dyn WorldTrace,
) -> Option<CrosshairMarker> {
    if ctx.melee || settings.crosshair == CrosshairStyle::None {
        return None;
    }

    let mut start = ctx.view_origin;
    start.z -= ctx.view_height - 10.0;
    let forward = ctx.aim.forward();
    let end = start + forward * TRACE_DISTANCE;

    let size = settings.crosshair_size.clamp(1.0, 5.0) * ctx.window_width as f32 / 1280.0;
    let color = [1.0, 0.0, 0.0, settings.crosshair_alpha];

    let marker = match settings.crosshair {
        CrosshairStyle::Point => {
            let position = if settings.crosshair_depth <= 0.0 {
                trace.trace_line(start, end)
            } else {
                start + forward * settings.crosshair_depth * UNITS_PER_METER
            };
            CrosshairMarker::Point { position, size, color }
        }
        CrosshairStyle::PointInfinity => CrosshairMarker::Point { position: end, size, color },
        CrosshairStyle::Line => CrosshairMarker::Line {
            start,
            end: trace.trace_to_entity(start, end),
            width: size,
            color,
        },
        CrosshairStyle::None => return None,
    };
    Some(marker)
}

/// Model matrix for the status bar quad, in bar pixels (320 wide).
///
/// The bar hangs just below the weapon, yawed to face the player and tilted
/// back towards them. When the head drives aim, bar pitch is ignored so the
/// bar does not swing with every nod.
pub fn status_bar_transform(view_origin: Vec3, aim: Angles, mode: AimMode) -> Mat4 {
    let mut angles = aim;
    if mode.is_head_aim() {
        angles.pitch = 0.0;
    }
    let target = view_origin - angles.forward() * 0.7;

    Mat4::from_translation(target)
        * Mat4::from_rotation_z((angles.yaw - 90.0).to_radians())
        * Mat4::from_rotation_x(-(135.0 + angles.pitch).to_radians())
        * Mat4::from_translation(Vec3::new(-(STATUS_BAR_WIDTH * STATUS_BAR_SCALE / 2.0), 0.0, 0.0))
        * Mat4::from_translation(Vec3::new(0.0, 0.0, 10.0))
        * Mat4::from_scale(Vec3::splat(STATUS_BAR_SCALE))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    /// Wall at x = 100, no entities closer than the wall.
    struct Wall;

    impl WorldTrace for Wall {
        fn trace_line(&self, start: Vec3, end: Vec3) -> Vec3 {
            if end.x <= 100.0 {
                return end;
            }
            let t = (100.0 - start.x) / (end.x - start.x);
            start + (end - start) * t
        }

        fn trace_to_entity(&self, start: Vec3, end: Vec3) -> Vec3 {
            self.trace_line(start, end)
        }
    }

    fn context() -> CrosshairContext {
        CrosshairContext {
            view_origin: Vec3::new(0.0, 0.0, 22.0),
            view_height: 22.0,
            aim: Angles::ZERO,
            window_width: 1280,
            melee: false,
        }
    }

    #[test]
    fn point_traces_to_wall() {
        let settings = HmdSettings::default();
        let marker = crosshair_marker(&context(), &settings, &Wall).unwrap();
        match marker {
            CrosshairMarker::Point { position, size, color } => {
                assert!(approx_eq(position.x, 100.0));
                // lowered by view_height - 10
                assert!(approx_eq(position.z, 10.0));
                assert_eq!(size, 3.0);
                assert_eq!(color[3], settings.crosshair_alpha);
            }
            other => panic!("unexpected marker {:?}", other),
        }
    }

    #[test]
    fn fixed_depth_ignores_world() {
        let mut settings = HmdSettings::default();
        settings.crosshair_depth = 2.0;
        let marker = crosshair_marker(&context(), &settings, &Wall).unwrap();
        let CrosshairMarker::Point { position, .. } = marker else {
            panic!("expected point");
        };
        assert!(approx_eq(position.x, 64.0));
    }

    #[test]
    fn infinity_point_skips_trace() {
        let mut settings = HmdSettings::default();
        settings.crosshair = CrosshairStyle::PointInfinity;
        let marker = crosshair_marker(&context(), &settings, &Wall).unwrap();
        let CrosshairMarker::Point { position, .. } = marker else {
            panic!("expected point");
        };
        assert!(approx_eq(position.x, TRACE_DISTANCE));
    }

    #[test]
    fn line_runs_from_weapon_to_hit() {
        let mut settings = HmdSettings::default();
        settings.crosshair = CrosshairStyle::Line;
        settings.crosshair_size = 20.0;
        let mut ctx = context();
        ctx.window_width = 2560;
        let marker = crosshair_marker(&ctx, &settings, &Wall).unwrap();
        let CrosshairMarker::Line { start, end, width, .. } = marker else {
            panic!("expected line");
        };
        assert!(approx_eq(start.z, 10.0));
        assert!(approx_eq(end.x, 100.0));
        // size clamps to 5, then scales with the window
        assert_eq!(width, 10.0);
    }

    #[test]
    fn hidden_for_melee_and_none() {
        let settings = HmdSettings::default();
        let mut ctx = context();
        ctx.melee = true;
        assert!(crosshair_marker(&ctx, &settings, &Wall).is_none());

        let mut settings = HmdSettings::default();
        settings.crosshair = CrosshairStyle::None;
        assert!(crosshair_marker(&context(), &settings, &Wall).is_none());
    }

    #[test]
    fn style_console_values() {
        for style in [
            CrosshairStyle::None,
            CrosshairStyle::Point,
            CrosshairStyle::Line,
            CrosshairStyle::PointInfinity,
        ] {
            assert_eq!(CrosshairStyle::from_index(style.index()), style);
        }
        assert_eq!(CrosshairStyle::from_index(9), CrosshairStyle::Point);
    }

    #[test]
    fn status_bar_is_centred_on_aim() {
        let origin = Vec3::new(10.0, 20.0, 30.0);
        let m = status_bar_transform(origin, Angles::new(0.0, 90.0, 0.0), AimMode::Blended);
        // middle of the bar lands on the aim line, behind the weapon origin
        let middle = m.transform_point3(Vec3::new(STATUS_BAR_WIDTH / 2.0, 0.0, 0.0));
        assert!(approx_eq(middle.x, origin.x));
    }

    #[test]
    fn head_aim_ignores_pitch() {
        let origin = Vec3::ZERO;
        let level = status_bar_transform(origin, Angles::new(0.0, 45.0, 0.0), AimMode::HeadYaw);
        let nod = status_bar_transform(origin, Angles::new(30.0, 45.0, 0.0), AimMode::HeadYaw);
        assert!(level.abs_diff_eq(nod, 1e-5));

        let mouse = status_bar_transform(origin, Angles::new(30.0, 45.0, 0.0), AimMode::MouseYaw);
        assert!(!level.abs_diff_eq(mouse, 1e-5));
    }
}
