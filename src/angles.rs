//! Euler angle helpers in the engine's convention.
//!
//! Angles are degrees. Pitch is positive looking down, yaw turns
//! counter-clockwise around the world Z axis, roll tilts around the view
//! direction.

use glam::{Quat, Vec3};

pub const PITCH: usize = 0;
pub const YAW: usize = 1;
pub const ROLL: usize = 2;

/// Pitch/yaw/roll triple in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Angles {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

impl Angles {
    pub const ZERO: Self = Self { pitch: 0.0, yaw: 0.0, roll: 0.0 };

    pub const fn new(pitch: f32, yaw: f32, roll: f32) -> Self {
        Self { pitch, yaw, roll }
    }

    pub fn from_array(a: [f32; 3]) -> Self {
        Self::new(a[PITCH], a[YAW], a[ROLL])
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.pitch, self.yaw, self.roll]
    }

    /// Forward, right and up vectors for these angles (Z-up world).
    pub fn vectors(&self) -> (Vec3, Vec3, Vec3) {
        let (sy, cy) = self.yaw.to_radians().sin_cos();
        let (sp, cp) = self.pitch.to_radians().sin_cos();
        let (sr, cr) = self.roll.to_radians().sin_cos();

        let forward = Vec3::new(cp * cy, cp * sy, -sp);
        let right = Vec3::new(
            -sr * sp * cy + cr * sy,
            -sr * sp * sy - cr * cy,
            -sr * cp,
        );
        let up = Vec3::new(
            cr * sp * cy + sr * sy,
            cr * sp * sy - sr * cy,
            cr * cp,
        );
        (forward, right, up)
    }

    pub fn forward(&self) -> Vec3 {
        self.vectors().0
    }
}

impl std::ops::Add for Angles {
    type Output = Angles;

    fn add(self, rhs: Angles) -> Angles {
        Angles::new(self.pitch + rhs.pitch, self.yaw + rhs.yaw, self.roll + rhs.roll)
    }
}

/// Signed shortest-path difference `to - from`, in (-180, 180].
pub fn angle_delta(to: f32, from: f32) -> f32 {
    let d = (to - from) % 360.0;
    if d > 180.0 {
        d - 360.0
    } else if d <= -180.0 {
        d + 360.0
    } else {
        d
    }
}

/// Decompose a tracker orientation (Y up, -Z forward) into engine angles.
///
/// Close to straight up or down the yaw/roll split is undefined; those cases
/// collapse pitch to zero and put the whole rotation into yaw.
pub fn quat_to_yaw_pitch_roll(q: Quat) -> Angles {
    let sqw = q.w * q.w;
    let sqx = q.x * q.x;
    let sqy = q.y * q.y;
    let sqz = q.z * q.z;
    // 1.0 when normalised, otherwise the correction factor
    let unit = sqx + sqy + sqz + sqw;
    let test = q.x * q.y + q.z * q.w;

    if test > 0.499 * unit {
        Angles::new(
            0.0,
            (2.0 * q.x.atan2(q.w)).to_degrees(),
            -90.0,
        )
    } else if test < -0.499 * unit {
        Angles::new(
            0.0,
            (-2.0 * q.x.atan2(q.w)).to_degrees(),
            90.0,
        )
    } else {
        let yaw = (2.0 * q.y * q.w - 2.0 * q.x * q.z).atan2(sqx - sqy - sqz + sqw);
        let roll = -(2.0 * test / unit).asin();
        let pitch = -(2.0 * q.x * q.w - 2.0 * q.y * q.z).atan2(-sqx + sqy - sqz + sqw);
        Angles::new(pitch.to_degrees(), yaw.to_degrees(), roll.to_degrees())
    }
}
