use thiserror::Error;

/// Connection-level failure: DNS, refused, timeout, or an unreadable body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("failed to connect to {url}: {message}")]
    Connect { url: String, message: String },
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("failed to read response from {url}: {message}")]
    Body { url: String, message: String },
}

/// The server answered, but not with what we asked for.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("response body is not valid JSON: {0}")]
    MalformedJson(String),
    #[error("response is missing required field `{0}`")]
    MissingField(&'static str),
}

/// Why a single credential attempt did not produce credentials.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("server returned HTTP {0}")]
    Status(u16),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BootstrapError {
    #[error("no credentials after {attempts} attempts; last error: {last}")]
    Exhausted { attempts: u32, last: AttemptError },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfirmError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("confirmation of `{command}` rejected with HTTP {status}")]
    Status { command: String, status: u16 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{device} failed: {message}")]
pub struct DeviceError {
    pub device: &'static str,
    pub message: String,
}

impl DeviceError {
    pub fn new(device: &'static str, message: impl Into<String>) -> Self {
        Self {
            device,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartupError {
    #[error("network association failed: {0}")]
    Network(DeviceError),
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
}
