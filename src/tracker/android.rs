//! Head tracking from the phone's game rotation vector sensor via the NDK.
//!
//! The phone sits landscape in a headset shell with the screen facing the user.

use std::ptr;

use glam::Quat;
use log::{info, warn};

use crate::angles::quat_to_yaw_pitch_roll;
use crate::device::HmdDeviceSettings;
use crate::error::{HmdError, Result};
use crate::pose::HeadPose;

use super::Tracker;

const ASENSOR_TYPE_GAME_ROTATION_VECTOR: i32 = 15;
/// Microseconds between sensor events (~60Hz).
const EVENT_RATE_US: i32 = 16_000;

pub struct AndroidSensorTracker {
    sensor_manager: *mut ndk_sys::ASensorManager,
    sensor: *const ndk_sys::ASensor,
    event_queue: *mut ndk_sys::ASensorEventQueue,
    device: HmdDeviceSettings,
    orientation: Quat,
    zero: Quat,
}

// Sensor pointers are only touched from the render thread that owns the tracker
unsafe impl Send for AndroidSensorTracker {}

impl AndroidSensorTracker {
    /// `device` describes the phone screen and headset lenses.
    pub fn new(device: HmdDeviceSettings) -> Self {
        Self {
            sensor_manager: ptr::null_mut(),
            sensor: ptr::null(),
            event_queue: ptr::null_mut(),
            device,
            orientation: Quat::IDENTITY,
            zero: Quat::IDENTITY,
        }
    }

    fn poll(&mut self) {
        if self.event_queue.is_null() {
            return;
        }
        unsafe {
            let mut event: ndk_sys::ASensorEvent = std::mem::zeroed();
            while ndk_sys::ASensorEventQueue_getEvents(self.event_queue, &mut event, 1) > 0 {
                if event.type_ != ASENSOR_TYPE_GAME_ROTATION_VECTOR {
                    continue;
                }
                let data = event.__bindgen_anon_1.__bindgen_anon_1.data;
                let (x, y, z) = (data[0], data[1], data[2]);
                // w from the unit quaternion constraint
                let w = (1.0 - x * x - y * y - z * z).max(0.0).sqrt();
                self.orientation = Quat::from_xyzw(x, y, z, w).normalize();
            }
        }
    }

    /// Sensor world (Z up) and landscape device axes into tracker space (Y up).
    fn to_tracker_space(sensor: Quat) -> Quat {
        let world = Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2);
        let landscape = Quat::from_rotation_z(-std::f32::consts::FRAC_PI_2);
        world * sensor * landscape
    }
}

impl Tracker for AndroidSensorTracker {
    fn start(&mut self) -> Result<()> {
        info!("Initializing rotation vector sensor...");
        unsafe {
            self.sensor_manager = ndk_sys::ASensorManager_getInstanceForPackage(ptr::null());
            if self.sensor_manager.is_null() {
                warn!("ASensorManager_getInstanceForPackage failed, trying fallback");
                self.sensor_manager = ndk_sys::ASensorManager_getInstance();
            }
            if self.sensor_manager.is_null() {
                return Err(HmdError::Tracking("ASensorManager not available".into()));
            }

            self.sensor = ndk_sys::ASensorManager_getDefaultSensor(
                self.sensor_manager,
                ASENSOR_TYPE_GAME_ROTATION_VECTOR,
            );
            if self.sensor.is_null() {
                return Err(HmdError::Tracking("no game rotation vector sensor".into()));
            }

            let mut looper = ndk_sys::ALooper_forThread();
            if looper.is_null() {
                looper = ndk_sys::ALooper_prepare(0);
            }
            if looper.is_null() {
                return Err(HmdError::Tracking("no ALooper for render thread".into()));
            }

            self.event_queue = ndk_sys::ASensorManager_createEventQueue(
                self.sensor_manager,
                looper,
                0,
                None,
                ptr::null_mut(),
            );
            if self.event_queue.is_null() {
                return Err(HmdError::Tracking("failed to create sensor event queue".into()));
            }

            let result = ndk_sys::ASensorEventQueue_enableSensor(self.event_queue, self.sensor);
            if result < 0 {
                self.stop();
                return Err(HmdError::Tracking(format!("failed to enable sensor: {}", result)));
            }
            ndk_sys::ASensorEventQueue_setEventRate(self.event_queue, self.sensor, EVENT_RATE_US);
        }
        info!("Rotation vector sensor running");
        Ok(())
    }

    fn stop(&mut self) {
        unsafe {
            if !self.event_queue.is_null() && !self.sensor_manager.is_null() {
                if !self.sensor.is_null() {
                    ndk_sys::ASensorEventQueue_disableSensor(self.event_queue, self.sensor);
                }
                ndk_sys::ASensorManager_destroyEventQueue(self.sensor_manager, self.event_queue);
            }
        }
        self.event_queue = ptr::null_mut();
        self.sensor = ptr::null();
    }

    fn head_pose(&mut self, _time: f64) -> HeadPose {
        self.poll();
        let tracked = self.zero.inverse() * Self::to_tracker_space(self.orientation);
        HeadPose {
            orientation: quat_to_yaw_pitch_roll(tracked),
            position: None,
        }
    }

    fn reset_tracking(&mut self) {
        // keep only the heading so recentring never tilts the horizon
        let current = Self::to_tracker_space(self.orientation);
        let (yaw, _, _) = current.to_euler(glam::EulerRot::YXZ);
        self.zero = Quat::from_rotation_y(yaw);
        info!("Sensor orientation recentred");
    }

    fn device_descriptor(&self) -> Result<HmdDeviceSettings> {
        Ok(self.device)
    }
}

impl Drop for AndroidSensorTracker {
    fn drop(&mut self) {
        self.stop();
    }
}
