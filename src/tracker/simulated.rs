//! Tracker stand-in for desktops and tests.

use glam::Vec3;
use log::info;

use crate::angles::{angle_delta, Angles};
use crate::device::HmdDeviceSettings;
use crate::error::Result;
use crate::pose::HeadPose;

use super::Tracker;

/// Gentle breathing and sway, plus yaw the host can drive (e.g. from keys).
#[derive(Debug, Clone)]
pub struct SimulatedTracker {
    device: HmdDeviceSettings,
    /// Degrees per second of automatic turning.
    pub yaw_rate: f32,
    /// Extra head yaw/pitch applied on top of the motion, in degrees.
    pub manual: Angles,
    pub positional: bool,
    zero_yaw: f32,
    last_yaw: f32,
    running: bool,
}

impl SimulatedTracker {
    pub fn new(device: HmdDeviceSettings) -> Self {
        Self {
            device,
            yaw_rate: 0.0,
            manual: Angles::ZERO,
            positional: false,
            zero_yaw: 0.0,
            last_yaw: 0.0,
            running: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    fn raw_orientation(&self, time: f64) -> Angles {
        let t = time as f32;
        let breathing = ((t * 0.5).sin() * 0.01).to_degrees();
        let sway = ((t * 0.3).sin() * 0.005).to_degrees();
        Angles::new(
            breathing + self.manual.pitch,
            self.yaw_rate * t + self.manual.yaw,
            sway + self.manual.roll,
        )
    }
}

impl Default for SimulatedTracker {
    fn default() -> Self {
        Self::new(HmdDeviceSettings::rift_dk1())
    }
}

impl Tracker for SimulatedTracker {
    fn start(&mut self) -> Result<()> {
        info!("Simulated head tracking started");
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn head_pose(&mut self, time: f64) -> HeadPose {
        if !self.running {
            return HeadPose::default();
        }
        let mut orientation = self.raw_orientation(time);
        self.last_yaw = orientation.yaw;
        orientation.yaw = angle_delta(orientation.yaw, self.zero_yaw);

        let position = self.positional.then(|| {
            let t = time as f32;
            // metres, tracker space
            Vec3::new((t * 0.3).sin() * 0.01, (t * 0.5).sin() * 0.005, 0.0)
        });
        HeadPose { orientation, position }
    }

    fn reset_tracking(&mut self) {
        self.zero_yaw = self.last_yaw;
        info!("Simulated tracker recentred at yaw {:.1}", self.zero_yaw);
    }

    fn device_descriptor(&self) -> Result<HmdDeviceSettings> {
        Ok(self.device)
    }
}
