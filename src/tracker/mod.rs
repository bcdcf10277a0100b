//! Head tracker collaborators.
//!
//! A tracker owns the vendor session: it is started when the HMD is enabled,
//! polled once per frame and stopped on disable.

use crate::device::HmdDeviceSettings;
use crate::error::{HmdError, Result};
use crate::pose::HeadPose;

mod simulated;

#[cfg(target_os = "android")]
mod android;

pub use simulated::SimulatedTracker;

#[cfg(target_os = "android")]
pub use android::AndroidSensorTracker;

pub trait Tracker {
    /// Open the tracking session.
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self);

    /// Latest head pose. `time` is the engine clock in seconds.
    fn head_pose(&mut self, time: f64) -> HeadPose;

    /// Make the current physical orientation the tracker's zero.
    fn reset_tracking(&mut self);

    /// Display and lens description of the connected headset.
    fn device_descriptor(&self) -> Result<HmdDeviceSettings>;
}

/// Replays a fixed list of poses, holding the last one.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTracker {
    poses: Vec<HeadPose>,
    next: usize,
    running: bool,
    pub descriptor: Option<HmdDeviceSettings>,
    pub fail_start: bool,
    pub resets: usize,
}

impl ScriptedTracker {
    pub fn new(poses: Vec<HeadPose>) -> Self {
        Self {
            poses,
            descriptor: Some(HmdDeviceSettings::rift_dk1()),
            ..Default::default()
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn push(&mut self, pose: HeadPose) {
        self.poses.push(pose);
    }
}

impl Tracker for ScriptedTracker {
    fn start(&mut self) -> Result<()> {
        if self.fail_start {
            return Err(HmdError::Tracking("scripted tracker refused to start".into()));
        }
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn head_pose(&mut self, _time: f64) -> HeadPose {
        let pose = self
            .poses
            .get(self.next)
            .or_else(|| self.poses.last())
            .copied()
            .unwrap_or_default();
        self.next = (self.next + 1).min(self.poses.len());
        pose
    }

    fn reset_tracking(&mut self) {
        self.resets += 1;
    }

    fn device_descriptor(&self) -> Result<HmdDeviceSettings> {
        self.descriptor
            .ok_or_else(|| HmdError::DeviceDescriptor("no headset attached".into()))
    }
}
