//! Error type for the HMD pipeline.
//!
//! Every variant aborts only the current HMD enable attempt; the engine keeps
//! running in single-eye monitor mode.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HmdError {
    #[error("failed to initialize HMD session: {0}")]
    SdkInit(String),

    #[error("failed to start head tracking: {0}")]
    Tracking(String),

    #[error("HMD device descriptor unavailable: {0}")]
    DeviceDescriptor(String),

    #[error("GPU is missing required capability: {0}")]
    MissingCapability(&'static str),

    #[error("failed to compile distortion shader: {0}")]
    ShaderCompile(String),

    #[error("invalid eye configuration: {0}")]
    InvalidConfiguration(String),

    #[error("failed to render frame: {0}")]
    Frame(String),

    #[error("unknown setting '{0}'")]
    UnknownSetting(String),

    #[error("invalid value '{value}' for {name}")]
    InvalidValue { name: String, value: String },
}

pub type Result<T> = std::result::Result<T, HmdError>;
