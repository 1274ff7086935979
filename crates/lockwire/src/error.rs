use liblockwire_core::CoreError;
use liblockwire_ipc::{IpcError, ReleaseOutcome};
use thiserror::Error;

/// Errors reported by the lockwire command line
#[derive(Debug, Error)]
pub enum CliError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("lock was not released: {0}")]
    NotReleased(ReleaseOutcome),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Ipc(#[from] IpcError),
}

impl CliError {
    /// Get the error code for JSON output
    pub fn error_code(&self) -> &'static str {
        match self {
            CliError::InvalidArgs(_) => "invalid_args",
            CliError::NotFound(_) => "not_found",
            CliError::NotReleased(_) => "not_released",
            CliError::Core(e) => e.error_code(),
            CliError::Ipc(e) => e.error_code(),
        }
    }

    /// Get the process exit code
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::InvalidArgs(_) => 2,
            CliError::NotFound(_) => 3,
            CliError::NotReleased(_) => 4,
            CliError::Core(CoreError::InvalidConfig(_)) => 2,
            CliError::Core(CoreError::TomlParse(_)) => 2,
            CliError::Core(CoreError::NotFound(_)) => 3,
            CliError::Core(CoreError::Io(_)) => 5,
            CliError::Ipc(IpcError::Io(_)) => 5,
            CliError::Ipc(_) => 6,
        }
    }

    /// Get actionable suggestions for fixing the error
    pub fn suggestions(&self) -> Vec<&'static str> {
        match self {
            CliError::NotFound(_) => {
                vec!["Check that the owner is running 'lockwire hold' with the same --record path"]
            }
            CliError::NotReleased(ReleaseOutcome::Unreachable) => vec![
                "Sending to local addresses is not permitted for this process",
                "Fall back to polling the lock file",
            ],
            CliError::NotReleased(ReleaseOutcome::Acknowledged) => vec![
                "The owner heard the request but is still using the lock",
                "Retry with a larger --timeout-ms",
            ],
            CliError::NotReleased(ReleaseOutcome::NoResponse) => vec![
                "The owner record may be stale",
                "Run 'lockwire addresses' on both sides to compare resolved addresses",
            ],
            CliError::Ipc(IpcError::ListenerFailed) => {
                vec!["Run with --log-level debug to see the receive errors"]
            }
            CliError::Ipc(IpcError::Bind { .. }) => vec![
                "Check that a loopback interface is configured",
                "Or set LOCKWIRE_BIND_ALL_INTERFACES=1",
            ],
            _ => vec![],
        }
    }
}
