use thiserror::Error;

/// 注册中心交互错误
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Registry returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode registry response: {0}")]
    Decode(String),

    #[error("Invalid registry address: {0}")]
    InvalidAddress(String),

    #[error("Registry unavailable: {0}")]
    Unavailable(String),
}
