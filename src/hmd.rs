//! The engine-facing HMD system.
//!
//! Owns the backend, the tracker, the eye setup and the pose fusion state.
//! Setting changes that invalidate the eye setup are only acted on at the
//! start of the next `update_screen_content`, so nothing is torn down while
//! a frame is being drawn.

use glam::{Mat4, Vec3};
use log::{debug, error, info};

use crate::angles::Angles;
use crate::backend::{RenderBackend, Requirement};
use crate::device::HmdDeviceSettings;
use crate::distortion::{DistortionMode, DistortionParams};
use crate::error::Result;
use crate::eye::{configure_eyes, EyeConfig};
use crate::frame::{render_eye, RenderState, SceneRenderer};
use crate::hud::{self, CrosshairContext, CrosshairMarker, WorldTrace};
use crate::pose::{head_position_offset, AimState, HeadPose, PoseFusionState};
use crate::settings::HmdSettings;
use crate::tracker::Tracker;

pub struct HmdSystem<B: RenderBackend, T: Tracker> {
    backend: B,
    tracker: T,
    settings: HmdSettings,
    window: (u32, u32),

    enabled: bool,
    reconfigure_pending: bool,
    tracker_running: bool,
    distortion_ready: bool,
    device: Option<HmdDeviceSettings>,
    eyes: Option<[EyeConfig; 2]>,
    targets: Option<[B::Target; 2]>,

    pose: PoseFusionState,
    last_head: HeadPose,
    last_error: Option<String>,
}

impl<B: RenderBackend, T: Tracker> HmdSystem<B, T> {
    /// Create the system. If `settings.enabled` is set the HMD is enabled on
    /// the first frame.
    pub fn new(backend: B, tracker: T, settings: HmdSettings, window: (u32, u32)) -> Self {
        let reconfigure_pending = settings.enabled;
        Self {
            backend,
            tracker,
            settings,
            window,
            enabled: false,
            reconfigure_pending,
            tracker_running: false,
            distortion_ready: false,
            device: None,
            eyes: None,
            targets: None,
            pose: PoseFusionState::new(),
            last_head: HeadPose::default(),
            last_error: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn settings(&self) -> &HmdSettings {
        &self.settings
    }

    pub fn eyes(&self) -> Option<&[EyeConfig; 2]> {
        self.eyes.as_ref()
    }

    pub fn device(&self) -> Option<&HmdDeviceSettings> {
        self.device.as_ref()
    }

    pub fn angles(&self) -> AimState {
        self.pose.angles()
    }

    pub fn last_head_pose(&self) -> HeadPose {
        self.last_head
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut T {
        &mut self.tracker
    }

    pub fn live_targets(&self) -> usize {
        self.backend.live_targets()
    }

    /// Why the most recent attempt to bring up the stereo path failed.
    /// Cleared by the next successful one.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Bring up the stereo path. Calling it while enabled starts over.
    ///
    /// On failure everything already allocated is released, the system
    /// stays disabled and the `enabled` setting is switched back off.
    pub fn enable(&mut self) -> Result<()> {
        self.settings.enabled = true;
        let result = self.bring_up();
        if result.is_err() {
            self.settings.enabled = false;
        }
        result
    }

    fn bring_up(&mut self) -> Result<()> {
        self.reconfigure_pending = false;
        self.release_all();

        match self.try_enable() {
            Ok(()) => {
                self.enabled = true;
                self.last_error = None;
                // keep the current aim, start head deltas from this frame
                self.pose.set_angles(self.pose.angles().aim);
                info!(
                    "HMD enabled: {}x{} per eye, {:?}",
                    self.eyes.as_ref().map_or(0, |e| e[0].target_width),
                    self.eyes.as_ref().map_or(0, |e| e[0].target_height),
                    self.settings.distortion
                );
                Ok(())
            }
            Err(e) => {
                error!("Failed to enable HMD: {}", e);
                self.release_all();
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn try_enable(&mut self) -> Result<()> {
        let mut needs = vec![Requirement::OffscreenTargets];
        needs.push(match self.settings.distortion {
            DistortionMode::LensWarp => Requirement::Shaders,
            DistortionMode::Compositor => Requirement::Compositor,
        });
        self.backend.capabilities().require(&needs)?;

        self.tracker.start()?;
        self.tracker_running = true;

        let device = self.tracker.device_descriptor()?;
        device.validate()?;
        self.device = Some(device);

        let eyes = configure_eyes(self.window, &self.settings, &device)?;
        self.backend.capabilities().require(&[Requirement::TextureSize {
            width: eyes[0].target_width,
            height: eyes[0].target_height,
        }])?;

        let left = self.backend.create_eye_target(&eyes[0])?;
        let right = match self.backend.create_eye_target(&eyes[1]) {
            Ok(target) => target,
            Err(e) => {
                self.backend.release_eye_target(left);
                return Err(e);
            }
        };
        self.targets = Some([left, right]);

        if self.settings.distortion == DistortionMode::LensWarp {
            let params = DistortionParams::new(&device, eyes[0].aspect);
            self.backend
                .prepare_distortion(&params, self.settings.chromatic_aberration)?;
            self.distortion_ready = true;
        }

        self.eyes = Some(eyes);
        Ok(())
    }

    /// Release both eye targets and the warp pass and stop tracking.
    /// Does nothing when already disabled.
    pub fn disable(&mut self) {
        self.reconfigure_pending = false;
        if self.enabled {
            info!("HMD disabled");
        }
        self.release_all();
        self.settings.enabled = false;
    }

    fn release_all(&mut self) {
        if let Some(targets) = self.targets.take() {
            for target in targets {
                self.backend.release_eye_target(target);
            }
        }
        if self.distortion_ready {
            self.backend.release_distortion();
            self.distortion_ready = false;
        }
        if self.tracker_running {
            self.tracker.stop();
            self.tracker_running = false;
        }
        self.eyes = None;
        self.enabled = false;
    }

    /// Replace the settings. Changes that affect the eye setup take effect at
    /// the next frame; aim, deadzone and crosshair changes apply immediately.
    pub fn apply_settings(&mut self, settings: HmdSettings) {
        if self.settings.requires_reconfigure(&settings) {
            debug!("HMD reconfiguration requested");
            self.reconfigure_pending = true;
        }
        self.settings = settings;
    }

    /// Console-style single setting change.
    pub fn set_cvar(&mut self, name: &str, value: &str) -> Result<()> {
        let mut settings = self.settings.clone();
        settings.set_cvar(name, value)?;
        self.apply_settings(settings);
        Ok(())
    }

    pub fn reconfigure_pending(&self) -> bool {
        self.reconfigure_pending
    }

    /// The presented surface changed size. A zero size (minimized window)
    /// keeps the current setup until a real size arrives.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 || (width, height) == self.window {
            return;
        }
        self.window = (width, height);
        // also retries a setup that failed for the old size
        if self.settings.enabled {
            self.reconfigure_pending = true;
        }
    }

    fn apply_pending(&mut self) {
        if !self.reconfigure_pending {
            return;
        }
        self.reconfigure_pending = false;
        if self.settings.enabled {
            // failure is logged and kept in last_error; the engine stays in
            // monitor mode until the next settings change or resize retries
            let _ = self.bring_up();
        } else {
            self.disable();
        }
    }

    /// Draw one frame: fuse the head pose, render both eyes and composite.
    ///
    /// `input_delta` is this frame's mouse/keyboard aim change and `time` the
    /// engine clock in seconds. `state` holds the view the engine set up for
    /// this frame; its eye-specific fields are restored before returning.
    pub fn update_screen_content<S>(
        &mut self,
        input_delta: Angles,
        time: f64,
        state: &mut RenderState,
        scene: &mut S,
    ) -> Result<()>
    where
        S: SceneRenderer<B> + ?Sized,
    {
        self.apply_pending();

        self.backend.begin_frame()?;
        let drawn = self.draw_stereo(input_delta, time, state, scene);
        let ended = self.backend.end_frame();
        drawn.and(ended)
    }

    fn draw_stereo<S>(&mut self, input_delta: Angles, time: f64, state: &mut RenderState, scene: &mut S) -> Result<()>
    where
        S: SceneRenderer<B> + ?Sized,
    {
        let (true, Some(eyes), Some(targets)) = (self.enabled, self.eyes.as_ref(), self.targets.as_ref()) else {
            // monitor mode: no head, the view follows the aim
            let fused = self.pose.apply_input(input_delta);
            state.view_angles = fused.view;
            state.aim_angles = fused.aim;
            return Ok(());
        };

        let head = self.tracker.head_pose(time);
        let fused = self
            .pose
            .update(&head, input_delta, self.settings.aim_mode, self.settings.deadzone);
        self.last_head = head;

        state.view_angles = fused.view;
        state.aim_angles = fused.aim;
        state.head_offset = head_position_offset(&head, fused.view.yaw);

        for (eye, target) in eyes.iter().zip(targets.iter()) {
            render_eye(&mut self.backend, scene, target, eye, state, time)?;
        }

        match self.settings.distortion {
            DistortionMode::LensWarp => {
                for (eye, target) in eyes.iter().zip(targets.iter()) {
                    self.backend.composite_eye(target, eye)?;
                }
            }
            DistortionMode::Compositor => {
                self.backend.submit_to_compositor([&targets[0], &targets[1]], eyes)?;
            }
        }
        Ok(())
    }

    /// Add the latest head orientation to `angles` (pitch and yaw added, roll
    /// replaced). Unchanged when the HMD is off.
    pub fn add_head_orientation_to_angles(&self, angles: Angles) -> Angles {
        if !self.enabled {
            return angles;
        }
        self.pose.add_head_orientation(angles)
    }

    /// Point the aim where the player looks and zero the tracker heading.
    pub fn recenter(&mut self) {
        self.pose.recenter();
        if self.enabled {
            self.tracker.reset_tracking();
        }
    }

    /// Snap aim and view, e.g. on level load or teleport.
    pub fn set_angles(&mut self, angles: Angles) {
        self.pose.set_angles(angles);
    }

    pub fn crosshair(
        &self,
        view_origin: Vec3,
        view_height: f32,
        melee: bool,
        trace: &dyn WorldTrace,
    ) -> Option<CrosshairMarker> {
        if !self.enabled {
            return None;
        }
        let ctx = CrosshairContext {
            view_origin,
            view_height,
            aim: self.pose.angles().aim,
            window_width: self.window.0,
            melee,
        };
        hud::crosshair_marker(&ctx, &self.settings, trace)
    }

    pub fn status_bar_transform(&self, view_origin: Vec3) -> Mat4 {
        hud::status_bar_transform(view_origin, self.pose.angles().aim, self.settings.aim_mode)
    }
}

impl<B: RenderBackend, T: Tracker> Drop for HmdSystem<B, T> {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockBackend, MockTarget};
    use crate::error::HmdError;
    use crate::eye::Eye;
    use crate::pose::AimMode;
    use crate::tracker::ScriptedTracker;

    type System = HmdSystem<MockBackend, ScriptedTracker>;

    #[derive(Default)]
    struct CountingScene {
        eyes: Vec<(Eye, f32)>,
    }

    impl SceneRenderer<MockBackend> for CountingScene {
        fn render_scene_once(&mut self, _backend: &mut MockBackend, target: &MockTarget, state: &mut RenderState) -> Result<()> {
            self.eyes.push((target.eye, state.eye_offset));
            Ok(())
        }
    }

    fn system_with(poses: Vec<HeadPose>) -> System {
        HmdSystem::new(
            MockBackend::new(),
            ScriptedTracker::new(poses),
            HmdSettings::default(),
            (1280, 800),
        )
    }

    fn frame(system: &mut System, delta: Angles, time: f64) -> RenderState {
        let mut state = RenderState::new(1280, 800);
        let mut scene = CountingScene::default();
        system.update_screen_content(delta, time, &mut state, &mut scene).unwrap();
        state
    }

    #[test]
    fn enable_then_disable_leaves_no_targets() {
        let mut system = system_with(Vec::new());
        system.enable().unwrap();
        assert!(system.is_enabled());
        assert_eq!(system.live_targets(), 2);
        assert!(system.tracker().is_running());

        system.disable();
        assert_eq!(system.live_targets(), 0);
        assert!(!system.is_enabled());
        assert!(!system.tracker().is_running());
        assert!(system.backend().distortion.is_none());

        // second disable is a no-op
        system.disable();
        assert_eq!(system.backend().count("release"), 3);
    }

    #[test]
    fn enable_twice_keeps_two_targets() {
        let mut system = system_with(Vec::new());
        system.enable().unwrap();
        system.enable().unwrap();
        assert_eq!(system.live_targets(), 2);
        assert_eq!(system.backend().count("create"), 4);
    }

    #[test]
    fn tracker_failure_leaves_nothing_allocated() {
        let mut system = system_with(Vec::new());
        system.tracker_mut().fail_start = true;
        assert!(matches!(system.enable(), Err(HmdError::Tracking(_))));
        assert!(!system.is_enabled());
        assert!(!system.settings().enabled);
        assert_eq!(system.live_targets(), 0);
    }

    #[test]
    fn bad_descriptor_stops_tracker() {
        let mut system = system_with(Vec::new());
        system.tracker_mut().descriptor = Some(HmdDeviceSettings {
            v_resolution: 0,
            ..HmdDeviceSettings::rift_dk1()
        });
        assert!(matches!(system.enable(), Err(HmdError::DeviceDescriptor(_))));
        assert!(!system.tracker().is_running());
        assert_eq!(system.live_targets(), 0);
    }

    #[test]
    fn second_target_failure_releases_first() {
        let mut system = system_with(Vec::new());
        system.backend_mut().fail_target_for = Some(Eye::Right);
        assert!(system.enable().is_err());
        assert_eq!(system.live_targets(), 0);
        assert_eq!(system.backend().count("release Left"), 1);
    }

    #[test]
    fn shader_failure_releases_targets() {
        let mut system = system_with(Vec::new());
        system.backend_mut().fail_distortion = true;
        assert!(matches!(system.enable(), Err(HmdError::ShaderCompile(_))));
        assert_eq!(system.live_targets(), 0);
        assert!(!system.tracker().is_running());
    }

    #[test]
    fn missing_capability_fails_before_tracking() {
        let mut system = system_with(Vec::new());
        system.backend_mut().caps.shaders = false;
        assert!(matches!(system.enable(), Err(HmdError::MissingCapability(_))));
        assert!(!system.tracker().is_running());
        assert!(system.backend().calls.is_empty());
    }

    #[test]
    fn frame_renders_both_eyes_then_composites() {
        let mut system = system_with(vec![HeadPose::default()]);
        system.enable().unwrap();
        system.backend_mut().calls.clear();

        let mut state = RenderState::new(1280, 800);
        let before = state.clone();
        let mut scene = CountingScene::default();
        system
            .update_screen_content(Angles::ZERO, 1.0, &mut state, &mut scene)
            .unwrap();

        assert_eq!(
            system.backend().calls,
            vec![
                "begin_frame",
                "begin_eye Left",
                "end_eye Left",
                "begin_eye Right",
                "end_eye Right",
                "composite Left",
                "composite Right",
                "end_frame",
            ]
        );
        assert_eq!(scene.eyes.len(), 2);
        assert_eq!(scene.eyes[0].1, -scene.eyes[1].1);
        // eye-specific values are restored
        assert_eq!(state.width, before.width);
        assert_eq!(state.projection, before.projection);
        assert_eq!(state.eye_offset, 0.0);
    }

    #[test]
    fn compositor_mode_skips_warp() {
        let mut system = system_with(Vec::new());
        system.set_cvar("vr_distortion", "1").unwrap();
        system.enable().unwrap();
        assert!(system.backend().distortion.is_none());

        system.backend_mut().calls.clear();
        frame(&mut system, Angles::ZERO, 0.5);
        assert_eq!(system.backend().count("submit"), 1);
        assert_eq!(system.backend().count("composite"), 0);

        system.disable();
        assert_eq!(system.backend().count("release_distortion"), 0);
    }

    #[test]
    fn disabled_system_presents_empty_frame() {
        let mut system = system_with(Vec::new());
        frame(&mut system, Angles::ZERO, 0.0);
        assert_eq!(system.backend().calls, vec!["begin_frame", "end_frame"]);
    }

    #[test]
    fn enabled_setting_takes_effect_next_frame() {
        let mut system = system_with(Vec::new());
        system.set_cvar("vr_enabled", "1").unwrap();
        assert!(!system.is_enabled());
        assert!(system.reconfigure_pending());

        frame(&mut system, Angles::ZERO, 0.0);
        assert!(system.is_enabled());
        assert_eq!(system.live_targets(), 2);

        system.set_cvar("vr_enabled", "0").unwrap();
        frame(&mut system, Angles::ZERO, 0.1);
        assert!(!system.is_enabled());
        assert_eq!(system.live_targets(), 0);
    }

    #[test]
    fn ipd_change_is_deferred_to_frame_boundary() {
        let mut system = system_with(Vec::new());
        system.enable().unwrap();
        let old = system.eyes().unwrap()[1].view_offset;

        system.set_cvar("vr_ipd", "70").unwrap();
        // nothing torn down yet
        assert_eq!(system.eyes().unwrap()[1].view_offset, old);
        assert_eq!(system.backend().count("create"), 2);

        frame(&mut system, Angles::ZERO, 0.0);
        let new = system.eyes().unwrap()[1].view_offset;
        assert!(new > old);
        assert_eq!(system.live_targets(), 2);
        assert!(!system.reconfigure_pending());
    }

    #[test]
    fn aim_mode_change_needs_no_reconfigure() {
        let mut system = system_with(Vec::new());
        system.enable().unwrap();
        system.set_cvar("vr_aimmode", "1").unwrap();
        assert!(!system.reconfigure_pending());
        assert_eq!(system.settings().aim_mode, AimMode::HeadYaw);
    }

    #[test]
    fn resize_reconfigures_targets() {
        let mut system = system_with(Vec::new());
        system.enable().unwrap();
        system.resize(1920, 1080);
        frame(&mut system, Angles::ZERO, 0.0);
        assert_eq!(system.eyes().unwrap()[0].target_width, 960);
        assert_eq!(system.live_targets(), 2);
    }

    #[test]
    fn mouse_yaw_through_the_whole_frame() {
        let head = HeadPose::from_angles(10.0, 5.0, 0.0);
        let mut system = system_with(vec![head, head]);
        system.set_cvar("vr_aimmode", "3").unwrap();
        system.enable().unwrap();
        system.set_angles(Angles::new(0.0, 90.0, 0.0));

        for t in [0.0, 0.016] {
            let state = frame(&mut system, Angles::ZERO, t);
            assert!((state.view_angles.pitch - 10.0).abs() < 1e-4);
            assert!((state.view_angles.yaw - 95.0).abs() < 1e-4);
            assert!((state.aim_angles.yaw - 90.0).abs() < 1e-4);
        }
    }

    #[test]
    fn recenter_resets_tracker_only_when_enabled() {
        let mut system = system_with(Vec::new());
        system.recenter();
        assert_eq!(system.tracker().resets, 0);
        system.enable().unwrap();
        system.recenter();
        assert_eq!(system.tracker().resets, 1);
    }

    #[test]
    fn head_orientation_only_added_when_enabled() {
        let mut system = system_with(vec![HeadPose::from_angles(5.0, 20.0, 3.0)]);
        let angles = Angles::new(1.0, 2.0, 9.0);
        assert_eq!(system.add_head_orientation_to_angles(angles), angles);

        system.enable().unwrap();
        frame(&mut system, Angles::ZERO, 0.0);
        let out = system.add_head_orientation_to_angles(angles);
        assert_eq!(out, Angles::new(6.0, 22.0, 3.0));
    }

    #[test]
    fn crosshair_hidden_while_disabled() {
        struct Open;
        impl WorldTrace for Open {
            fn trace_line(&self, _start: Vec3, end: Vec3) -> Vec3 {
                end
            }
            fn trace_to_entity(&self, _start: Vec3, end: Vec3) -> Vec3 {
                end
            }
        }

        let mut system = system_with(Vec::new());
        assert!(system.crosshair(Vec3::ZERO, 22.0, false, &Open).is_none());
        system.enable().unwrap();
        assert!(system.crosshair(Vec3::ZERO, 22.0, false, &Open).is_some());
        assert!(system.crosshair(Vec3::ZERO, 22.0, true, &Open).is_none());
    }

    #[test]
    fn minimize_and_restore_keeps_hmd_on() {
        let mut system = system_with(Vec::new());
        system.enable().unwrap();

        system.resize(0, 0);
        assert!(!system.reconfigure_pending());
        frame(&mut system, Angles::ZERO, 0.0);
        assert!(system.is_enabled());
        assert_eq!(system.live_targets(), 2);

        system.resize(1280, 800);
        frame(&mut system, Angles::ZERO, 0.1);
        assert!(system.is_enabled());
        assert!(system.settings().enabled);
        assert_eq!(system.live_targets(), 2);
    }

    #[test]
    fn rejected_near_clip_leaves_hmd_running() {
        let mut system = system_with(Vec::new());
        system.enable().unwrap();
        assert!(system.set_cvar("vr_nearclip", "20000").is_err());
        assert!(!system.reconfigure_pending());

        frame(&mut system, Angles::ZERO, 0.0);
        assert!(system.is_enabled());
        assert_eq!(system.live_targets(), 2);
    }

    #[test]
    fn failed_reconfigure_releases_and_reports() {
        let mut system = system_with(Vec::new());
        system.enable().unwrap();
        system.tracker_mut().fail_start = true;
        system.set_cvar("vr_ipd", "70").unwrap();

        frame(&mut system, Angles::ZERO, 0.0);
        assert!(!system.is_enabled());
        assert_eq!(system.live_targets(), 0);
        assert!(!system.tracker().is_running());
        assert!(system.last_error().is_some_and(|e| e.contains("tracking")));
        // the user asked for the HMD; only the attempt failed
        assert!(system.settings().enabled);

        system.tracker_mut().fail_start = false;
        system.set_cvar("vr_ipd", "66").unwrap();
        frame(&mut system, Angles::ZERO, 0.1);
        assert!(system.is_enabled());
        assert_eq!(system.live_targets(), 2);
        assert!(system.last_error().is_none());
    }

    #[test]
    fn oversized_resize_fails_then_recovers() {
        let mut system = system_with(Vec::new());
        system.enable().unwrap();
        system.backend_mut().caps.max_texture_dimension = 1000;

        system.resize(2560, 1600);
        frame(&mut system, Angles::ZERO, 0.0);
        assert!(!system.is_enabled());
        assert_eq!(system.live_targets(), 0);
        assert!(system.last_error().is_some_and(|e| e.contains("eye target size")));
        assert!(system.settings().enabled);

        system.resize(1280, 800);
        frame(&mut system, Angles::ZERO, 0.1);
        assert!(system.is_enabled());
        assert_eq!(system.live_targets(), 2);
    }

    #[test]
    fn explicit_enable_failure_switches_setting_off() {
        let mut system = system_with(Vec::new());
        system.tracker_mut().fail_start = true;
        assert!(system.enable().is_err());
        assert!(!system.settings().enabled);
        assert!(system.last_error().is_some());
    }

    #[test]
    fn disabled_frame_still_applies_aim_input() {
        let mut system = system_with(Vec::new());
        frame(&mut system, Angles::new(0.0, 10.0, 0.0), 0.0);
        let state = frame(&mut system, Angles::new(-3.0, 5.0, 0.0), 0.1);
        assert!((system.angles().aim.yaw - 15.0).abs() < 1e-4);
        assert!((state.aim_angles.pitch + 3.0).abs() < 1e-4);
        assert_eq!(state.view_angles, state.aim_angles);
    }
}
