//! Stereo head-mounted display pipeline for a first-person engine.
//!
//! Fuses head tracking with mouse aim, configures both eyes from the headset's
//! optics, renders the scene once per eye into offscreen targets and warps the
//! result for the lenses. The engine supplies the scene renderer, world
//! traces and the tracker; [`HmdSystem`] drives them each frame.

pub mod angles;
pub mod backend;
pub mod device;
pub mod distortion;
pub mod error;
pub mod eye;
pub mod frame;
pub mod hmd;
pub mod hud;
pub mod pose;
pub mod random;
pub mod renderer;
pub mod settings;
pub mod tracker;

pub use angles::Angles;
pub use backend::{Capabilities, RenderBackend};
pub use device::HmdDeviceSettings;
pub use error::{HmdError, Result};
pub use eye::{Eye, EyeConfig, EyeLayout};
pub use frame::{RenderState, SceneRenderer};
pub use hmd::HmdSystem;
pub use pose::{AimMode, DeadzoneAngle, HeadPose};
pub use renderer::WgpuBackend;
pub use settings::HmdSettings;
pub use tracker::Tracker;

/// Install the platform logger: logcat on Android, `RUST_LOG`-filtered stderr
/// elsewhere. Safe to call more than once.
#[cfg(target_os = "android")]
pub fn init_logging() {
    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(log::LevelFilter::Info)
            .with_tag("HmdStereo"),
    );
}

/// Install the platform logger: logcat on Android, `RUST_LOG`-filtered stderr
/// elsewhere. Safe to call more than once.
#[cfg(not(target_os = "android"))]
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
}
