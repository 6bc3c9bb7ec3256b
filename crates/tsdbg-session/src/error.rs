use thiserror::Error;

/// Connection-level failure reported by a remote VM client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    #[error("Connection closed")]
    Disconnected,
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Missing launch arguments")]
    MissingLaunchArguments,
    #[error("Failed to deserialize launch arguments: {0}")]
    LaunchArgumentsError(serde_json::Error),
    #[error("Invalid debug endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("Failed to connect to remote VM: {0}")]
    Connect(VmError),
    #[error("Failed to attach to remote VM: {0}")]
    Attach(VmError),
    #[error("Remote VM command failed: {0}")]
    Vm(VmError),
}
