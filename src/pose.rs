//! Pose fusion: blends head tracker orientation with mouse/keyboard aim into
//! the view and aim angles used for one frame.

use glam::{Mat3, Vec3};

use crate::angles::{angle_delta, Angles};

/// World units per metre (a 56 unit tall player is 1.75m).
pub const UNITS_PER_METER: f32 = 32.0;

/// Head pose for one frame, as reported by the tracker.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HeadPose {
    pub orientation: Angles,
    /// Metres in tracker space (Y up, -Z forward), when positional tracking is available.
    pub position: Option<Vec3>,
}

impl HeadPose {
    pub fn from_angles(pitch: f32, yaw: f32, roll: f32) -> Self {
        Self {
            orientation: Angles::new(pitch, yaw, roll),
            position: None,
        }
    }
}

/// How head orientation is merged into aim and view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AimMode {
    /// Head aiming; yaw is mouse + integrated head yaw, pitch is head pitch.
    HeadYaw,
    /// Head aiming; yaw and pitch both integrate head deltas.
    HeadYawPitch,
    /// Mouse aiming; the camera looks around the aim by the raw head yaw.
    MouseYaw,
    /// Mouse aiming; camera yaw and pitch are aim + raw head angles.
    MouseYawPitch,
    /// Mouse aims, head yaw is decoupled inside the deadzone.
    #[default]
    Blended,
    /// As `Blended` but head pitch never reaches the aim.
    BlendedNoPitch,
}

impl AimMode {
    pub const ALL: [AimMode; 6] = [
        AimMode::HeadYaw,
        AimMode::HeadYawPitch,
        AimMode::MouseYaw,
        AimMode::MouseYawPitch,
        AimMode::Blended,
        AimMode::BlendedNoPitch,
    ];

    /// Numeric value used by the `vr_aimmode` setting. Unknown values select `Blended`.
    pub fn from_index(value: i32) -> Self {
        match value {
            1 => AimMode::HeadYaw,
            2 => AimMode::HeadYawPitch,
            3 => AimMode::MouseYaw,
            4 => AimMode::MouseYawPitch,
            6 => AimMode::BlendedNoPitch,
            _ => AimMode::Blended,
        }
    }

    pub fn index(self) -> i32 {
        match self {
            AimMode::HeadYaw => 1,
            AimMode::HeadYawPitch => 2,
            AimMode::MouseYaw => 3,
            AimMode::MouseYawPitch => 4,
            AimMode::Blended => 5,
            AimMode::BlendedNoPitch => 6,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AimMode::HeadYaw => "HEAD_MYAW",
            AimMode::HeadYawPitch => "HEAD_MYAW_MPITCH",
            AimMode::MouseYaw => "MOUSE_MYAW",
            AimMode::MouseYawPitch => "MOUSE_MYAW_MPITCH",
            AimMode::Blended => "BLENDED",
            AimMode::BlendedNoPitch => "BLENDED_NOPITCH",
        }
    }

    /// Modes where the head drives the aim directly.
    pub fn is_head_aim(self) -> bool {
        matches!(self, AimMode::HeadYaw | AimMode::HeadYawPitch)
    }
}

/// Yaw deadzone for the blended aim modes, always within [0, 180] degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeadzoneAngle(f32);

impl DeadzoneAngle {
    pub const MAX: f32 = 180.0;

    pub fn new(degrees: f32) -> Self {
        if degrees.is_nan() {
            return Self(0.0);
        }
        Self(degrees.clamp(0.0, Self::MAX))
    }

    pub fn degrees(self) -> f32 {
        self.0
    }

    /// At 180 degrees aim and view yaw never re-couple.
    pub fn is_fully_decoupled(self) -> bool {
        self.0 >= Self::MAX
    }
}

impl Default for DeadzoneAngle {
    fn default() -> Self {
        Self(30.0)
    }
}

/// Gameplay aim and rendered view for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AimState {
    pub aim: Angles,
    pub view: Angles,
}

/// Everything pose fusion carries from one frame to the next.
#[derive(Debug, Clone, Default)]
pub struct PoseFusionState {
    angles: AimState,
    last_orientation: Angles,
    last_aim: Angles,
    baselined: bool,
}

impl PoseFusionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn angles(&self) -> AimState {
        self.angles
    }

    /// Orientation seen by the last update.
    pub fn last_orientation(&self) -> Angles {
        self.last_orientation
    }

    /// Fuse this frame's head pose with the aim input and return the new angles.
    ///
    /// `input_delta` is the mouse/keyboard aim change since the previous frame.
    pub fn update(
        &mut self,
        head: &HeadPose,
        input_delta: Angles,
        mode: AimMode,
        deadzone: DeadzoneAngle,
    ) -> AimState {
        let orientation = head.orientation;
        let mut aim = self.angles.aim + input_delta;
        let mut view = self.angles.view;

        if !self.baselined {
            self.last_orientation = orientation;
            self.last_aim = aim;
            view = aim;
            self.baselined = true;
        }

        let head_yaw_delta = angle_delta(orientation.yaw, self.last_orientation.yaw);
        let head_pitch_delta = angle_delta(orientation.pitch, self.last_orientation.pitch);

        match mode {
            AimMode::HeadYaw => {
                aim.pitch = orientation.pitch;
                aim.yaw += head_yaw_delta;
                view.pitch = aim.pitch;
                view.yaw = aim.yaw;
            }
            AimMode::HeadYawPitch => {
                aim.pitch += head_pitch_delta;
                aim.yaw += head_yaw_delta;
                view.pitch = aim.pitch;
                view.yaw = aim.yaw;
            }
            AimMode::MouseYaw => {
                view.pitch = orientation.pitch;
                view.yaw = aim.yaw + orientation.yaw;
            }
            AimMode::MouseYawPitch => {
                view.pitch = aim.pitch + orientation.pitch;
                view.yaw = aim.yaw + orientation.yaw;
            }
            AimMode::Blended | AimMode::BlendedNoPitch => {
                let aim_yaw_delta = angle_delta(aim.yaw, self.last_aim.yaw);

                view.yaw += head_yaw_delta;

                let divergence = angle_delta(view.yaw, aim.yaw);
                if !deadzone.is_fully_decoupled() && divergence.abs() > deadzone.degrees() / 2.0 {
                    aim.yaw += head_yaw_delta;
                    view.yaw += aim_yaw_delta;
                }

                if mode == AimMode::Blended {
                    aim.pitch += head_pitch_delta;
                }
                view.pitch = orientation.pitch;
            }
        }

        view.roll = orientation.roll;

        self.last_orientation = orientation;
        self.last_aim = aim;
        self.angles = AimState { aim, view };
        self.angles
    }

    /// Snap aim and view to `angles` (level load, teleport).
    pub fn set_angles(&mut self, angles: Angles) {
        self.angles = AimState { aim: angles, view: angles };
        self.last_aim = angles;
        self.baselined = false;
    }

    /// Monitor-mode update with no head: aim takes the input and the view
    /// follows it. The next head update re-baselines.
    pub fn apply_input(&mut self, input_delta: Angles) -> AimState {
        let aim = self.angles.aim + input_delta;
        self.set_angles(aim);
        self.angles
    }

    /// Point the aim where the player is currently looking.
    pub fn recenter(&mut self) {
        self.angles.aim.yaw = self.angles.view.yaw;
        self.angles.aim.pitch = self.angles.view.pitch;
        self.last_aim = self.angles.aim;
        self.baselined = false;
    }

    /// Forget all history; the next update re-baselines.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Add the latest head orientation to angles that want head-relative
    /// treatment without full stereo (e.g. the view model).
    pub fn add_head_orientation(&self, angles: Angles) -> Angles {
        Angles::new(
            angles.pitch + self.last_orientation.pitch,
            angles.yaw + self.last_orientation.yaw,
            self.last_orientation.roll,
        )
    }
}

/// Head position in world units, rotated from tracker space into the
/// engine's current view yaw.
pub fn head_position_offset(head: &HeadPose, view_yaw: f32) -> Vec3 {
    let Some(position) = head.position else {
        return Vec3::ZERO;
    };

    let engine_space = Vec3::new(
        -position.z * UNITS_PER_METER,
        -position.x * UNITS_PER_METER,
        position.y * UNITS_PER_METER,
    );
    let rotation = Mat3::from_rotation_z((view_yaw - head.orientation.yaw).to_radians());
    rotation * engine_space
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    fn state_at(aim: Angles) -> PoseFusionState {
        let mut state = PoseFusionState::new();
        state.set_angles(aim);
        state
    }

    #[test]
    fn roll_always_comes_from_head() {
        for mode in AimMode::ALL {
            let mut state = state_at(Angles::new(0.0, 45.0, 0.0));
            for roll in [0.0, 12.5, -30.0] {
                let head = HeadPose::from_angles(3.0, 7.0, roll);
                let out = state.update(&head, Angles::new(1.0, 2.0, 0.0), mode, DeadzoneAngle::default());
                assert_eq!(out.view.roll, roll, "mode {:?}", mode);
            }
        }
    }

    #[test]
    fn head_yaw_mode_integrates_deltas() {
        let start = 30.0;
        let splits: [&[f32]; 3] = [&[40.0], &[10.0, 10.0, 20.0], &[25.0, -5.0, 20.0]];
        for steps in splits {
            let mut state = state_at(Angles::new(0.0, start, 0.0));
            let mut head_yaw = 0.0;
            state.update(&HeadPose::from_angles(0.0, head_yaw, 0.0), Angles::ZERO, AimMode::HeadYaw, DeadzoneAngle::default());
            for step in steps {
                head_yaw += step;
                state.update(&HeadPose::from_angles(0.0, head_yaw, 0.0), Angles::ZERO, AimMode::HeadYaw, DeadzoneAngle::default());
            }
            assert!(approx_eq(state.angles().aim.yaw, start + 40.0));
        }
    }

    #[test]
    fn head_yaw_scenario() {
        let mut state = state_at(Angles::new(0.0, 90.0, 0.0));
        state.update(&HeadPose::from_angles(0.0, 0.0, 0.0), Angles::ZERO, AimMode::HeadYaw, DeadzoneAngle::default());
        let out = state.update(&HeadPose::from_angles(0.0, 10.0, 0.0), Angles::ZERO, AimMode::HeadYaw, DeadzoneAngle::default());
        assert!(approx_eq(out.aim.yaw, 100.0));
        assert!(approx_eq(out.view.yaw, 100.0));
    }

    #[test]
    fn head_yaw_pitch_mode_integrates_pitch() {
        let mut state = state_at(Angles::new(5.0, 0.0, 0.0));
        state.update(&HeadPose::from_angles(10.0, 0.0, 0.0), Angles::ZERO, AimMode::HeadYawPitch, DeadzoneAngle::default());
        let out = state.update(&HeadPose::from_angles(15.0, 0.0, 0.0), Angles::ZERO, AimMode::HeadYawPitch, DeadzoneAngle::default());
        assert!(approx_eq(out.aim.pitch, 10.0));
        assert!(approx_eq(out.view.pitch, 10.0));
    }

    #[test]
    fn mouse_yaw_keeps_head_pitch_out_of_aim() {
        let mut state = state_at(Angles::new(-4.0, 0.0, 0.0));
        for i in 0..20 {
            let head = HeadPose::from_angles(i as f32 * 3.0 - 30.0, i as f32, 0.0);
            let out = state.update(&head, Angles::ZERO, AimMode::MouseYaw, DeadzoneAngle::default());
            assert_eq!(out.aim.pitch, -4.0);
            assert_eq!(out.view.pitch, head.orientation.pitch);
        }
    }

    #[test]
    fn mouse_yaw_scenario_does_not_accumulate() {
        let mut state = state_at(Angles::new(0.0, 90.0, 0.0));
        for _ in 0..2 {
            let out = state.update(&HeadPose::from_angles(10.0, 5.0, 0.0), Angles::ZERO, AimMode::MouseYaw, DeadzoneAngle::default());
            assert!(approx_eq(out.view.yaw, 95.0));
            assert!(approx_eq(out.view.pitch, 10.0));
            assert!(approx_eq(out.aim.yaw, 90.0));
        }
    }

    #[test]
    fn mouse_yaw_pitch_offsets_both_axes() {
        let mut state = state_at(Angles::new(5.0, 90.0, 0.0));
        let out = state.update(&HeadPose::from_angles(10.0, -20.0, 0.0), Angles::new(1.0, 0.0, 0.0), AimMode::MouseYawPitch, DeadzoneAngle::default());
        assert!(approx_eq(out.aim.pitch, 6.0));
        assert!(approx_eq(out.view.pitch, 16.0));
        assert!(approx_eq(out.view.yaw, 70.0));
        assert!(approx_eq(out.aim.yaw, 90.0));
    }

    #[test]
    fn blended_recouples_only_outside_deadzone() {
        let deadzone = DeadzoneAngle::new(30.0);
        let mut state = state_at(Angles::ZERO);
        state.update(&HeadPose::default(), Angles::ZERO, AimMode::Blended, deadzone);

        // 10 degrees of divergence stays inside the 15 degree half-width
        let out = state.update(&HeadPose::from_angles(0.0, 10.0, 0.0), Angles::ZERO, AimMode::Blended, deadzone);
        assert!(approx_eq(out.view.yaw, 10.0));
        assert!(approx_eq(out.aim.yaw, 0.0));

        // another 10 puts the view 20 degrees out, so the aim follows the head delta
        let out = state.update(&HeadPose::from_angles(0.0, 20.0, 0.0), Angles::ZERO, AimMode::Blended, deadzone);
        assert!(approx_eq(out.view.yaw, 20.0));
        assert!(approx_eq(out.aim.yaw, 10.0));
    }

    #[test]
    fn blended_outside_deadzone_carries_mouse_into_view() {
        let deadzone = DeadzoneAngle::new(10.0);
        let mut state = state_at(Angles::ZERO);
        state.update(&HeadPose::default(), Angles::ZERO, AimMode::Blended, deadzone);
        state.update(&HeadPose::from_angles(0.0, 20.0, 0.0), Angles::ZERO, AimMode::Blended, deadzone);

        // small mouse turn stays inside the deadzone: only the aim moves
        let out = state.update(&HeadPose::from_angles(0.0, 20.0, 0.0), Angles::new(0.0, 3.0, 0.0), AimMode::Blended, deadzone);
        assert!(approx_eq(out.aim.yaw, 23.0));
        assert!(approx_eq(out.view.yaw, 20.0));

        // a larger one drags the view along
        let out = state.update(&HeadPose::from_angles(0.0, 20.0, 0.0), Angles::new(0.0, 8.0, 0.0), AimMode::Blended, deadzone);
        assert!(approx_eq(out.aim.yaw, 31.0));
        assert!(approx_eq(out.view.yaw, 28.0));
    }

    #[test]
    fn zero_deadzone_recouples_every_frame() {
        let deadzone = DeadzoneAngle::new(0.0);
        let mut state = state_at(Angles::new(0.0, 45.0, 0.0));
        state.update(&HeadPose::default(), Angles::ZERO, AimMode::Blended, deadzone);
        let mut head_yaw = 0.0;
        for step in [5.0, -2.0, 7.5, 1.0] {
            head_yaw += step;
            let out = state.update(&HeadPose::from_angles(0.0, head_yaw, 0.0), Angles::ZERO, AimMode::Blended, deadzone);
            assert!(approx_eq(out.aim.yaw, out.view.yaw));
            assert!(approx_eq(out.aim.yaw, 45.0 + head_yaw));
        }
    }

    #[test]
    fn full_deadzone_never_recouples() {
        let deadzone = DeadzoneAngle::new(500.0);
        assert_eq!(deadzone.degrees(), 180.0);

        let mut state = state_at(Angles::ZERO);
        state.update(&HeadPose::default(), Angles::ZERO, AimMode::Blended, deadzone);
        let mut head_yaw = 0.0;
        for _ in 0..10 {
            head_yaw += 30.0;
            let out = state.update(&HeadPose::from_angles(0.0, head_yaw, 0.0), Angles::ZERO, AimMode::Blended, deadzone);
            assert_eq!(out.aim.yaw, 0.0);
        }
    }

    #[test]
    fn blended_divergence_wraps_at_half_turn() {
        let deadzone = DeadzoneAngle::new(30.0);
        let mut state = state_at(Angles::new(0.0, 175.0, 0.0));
        state.update(&HeadPose::from_angles(0.0, 175.0, 0.0), Angles::ZERO, AimMode::Blended, deadzone);

        // head crosses the +-180 seam by 10 degrees
        let out = state.update(&HeadPose::from_angles(0.0, -175.0, 0.0), Angles::ZERO, AimMode::Blended, deadzone);
        assert!(approx_eq(out.view.yaw, 185.0));
        assert!(approx_eq(out.aim.yaw, 175.0));
    }

    #[test]
    fn blended_pitch_variants() {
        let deadzone = DeadzoneAngle::default();
        let mut with_pitch = state_at(Angles::ZERO);
        let mut no_pitch = state_at(Angles::ZERO);
        for s in [&mut with_pitch, &mut no_pitch] {
            s.update(&HeadPose::default(), Angles::ZERO, AimMode::Blended, deadzone);
        }

        let head = HeadPose::from_angles(12.0, 0.0, 0.0);
        let a = with_pitch.update(&head, Angles::ZERO, AimMode::Blended, deadzone);
        let b = no_pitch.update(&head, Angles::ZERO, AimMode::BlendedNoPitch, deadzone);
        assert!(approx_eq(a.aim.pitch, 12.0));
        assert!(approx_eq(b.aim.pitch, 0.0));
        assert!(approx_eq(a.view.pitch, 12.0));
        assert!(approx_eq(b.view.pitch, 12.0));
    }

    #[test]
    fn recenter_rebaselines_without_jump() {
        let mut state = state_at(Angles::ZERO);
        state.update(&HeadPose::from_angles(0.0, 0.0, 0.0), Angles::ZERO, AimMode::MouseYaw, DeadzoneAngle::default());
        state.update(&HeadPose::from_angles(0.0, 40.0, 0.0), Angles::ZERO, AimMode::MouseYaw, DeadzoneAngle::default());
        state.recenter();
        assert!(approx_eq(state.angles().aim.yaw, 40.0));

        // tracker was recentred too, so head yaw reads zero again
        let out = state.update(&HeadPose::from_angles(0.0, 0.0, 0.0), Angles::ZERO, AimMode::HeadYaw, DeadzoneAngle::default());
        assert!(approx_eq(out.aim.yaw, 40.0));
    }

    #[test]
    fn add_head_orientation_replaces_roll() {
        let mut state = PoseFusionState::new();
        state.update(&HeadPose::from_angles(5.0, 10.0, 3.0), Angles::ZERO, AimMode::Blended, DeadzoneAngle::default());
        let out = state.add_head_orientation(Angles::new(1.0, 100.0, 50.0));
        assert_eq!(out, Angles::new(6.0, 110.0, 3.0));
    }

    #[test]
    fn deadzone_is_clamped() {
        assert_eq!(DeadzoneAngle::new(-5.0).degrees(), 0.0);
        assert_eq!(DeadzoneAngle::new(f32::NAN).degrees(), 0.0);
        assert_eq!(DeadzoneAngle::new(90.0).degrees(), 90.0);
    }

    #[test]
    fn aim_mode_index_round_trip_and_fallback() {
        for mode in AimMode::ALL {
            assert_eq!(AimMode::from_index(mode.index()), mode);
        }
        assert_eq!(AimMode::from_index(0), AimMode::Blended);
        assert_eq!(AimMode::from_index(42), AimMode::Blended);
    }

    #[test]
    fn head_position_is_scaled_and_rotated() {
        let head = HeadPose {
            orientation: Angles::ZERO,
            position: Some(Vec3::new(0.0, 0.0, -1.0)),
        };
        // one metre forward in tracker space
        let offset = head_position_offset(&head, 0.0);
        assert!(approx_eq(offset.x, UNITS_PER_METER));
        assert!(approx_eq(offset.y, 0.0));

        let turned = head_position_offset(&head, 90.0);
        assert!(approx_eq(turned.x, 0.0));
        assert!(approx_eq(turned.y, UNITS_PER_METER));

        assert_eq!(head_position_offset(&HeadPose::default(), 0.0), Vec3::ZERO);
    }

    #[test]
    fn input_without_head_moves_aim_and_view_together() {
        let mut state = state_at(Angles::new(0.0, 30.0, 0.0));
        state.apply_input(Angles::new(2.0, 15.0, 0.0));
        let out = state.apply_input(Angles::new(0.0, -5.0, 0.0));
        assert!(approx_eq(out.aim.yaw, 40.0));
        assert!(approx_eq(out.aim.pitch, 2.0));
        assert_eq!(out.view, out.aim);

        // head tracking resumes from the new aim without a jump
        let out = state.update(&HeadPose::from_angles(0.0, 60.0, 0.0), Angles::ZERO, AimMode::HeadYaw, DeadzoneAngle::default());
        assert!(approx_eq(out.aim.yaw, 40.0));
    }
}
