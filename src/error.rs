//! Error handling for the installation engine
//!
//! Library code returns [`InstallerError`]; the binary and the configuration
//! loader wrap it with `anyhow` context at the edges.

use thiserror::Error;

/// Main error type for the installer
#[derive(Error, Debug)]
pub enum InstallerError {
    /// IO errors (file writes under the target, directory creation, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors (loading, parsing)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors on the Setup snapshot
    #[error("Validation error: {0}")]
    Validation(String),

    /// An external command could not be spawned or waited on
    #[error("Command execution failed: {0}")]
    Command(String),

    /// State errors (lost resume signal, finishing a run that never started)
    #[error("State error: {0}")]
    State(String),

    /// Install state machine transition errors
    #[error("Install transition error: {0}")]
    InstallTransition(String),

    /// The live image backing device does not exist
    #[error("Source media {0} is not available")]
    MissingMedia(String),

    /// Custom setup requested but nothing is mounted at the target
    #[error("Target {0} does not exist, you must mount the target manually")]
    TargetNotMounted(String),

    /// No partition provides the root mount point
    #[error("No partition is assigned to / or /@")]
    NoRootPartition,

    /// `@` subvolumes requested on something other than btrfs
    #[error("The use of @subvolumes is limited to btrfs (partition {0})")]
    SubvolumeNotBtrfs(String),

    /// The filesystem copy ended with a failing rsync exit code
    #[error("Copying the live filesystem failed (rsync exit code {0})")]
    CopyFailed(i32),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for installer operations
pub type Result<T> = std::result::Result<T, InstallerError>;

impl InstallerError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a command execution error
    pub fn command(msg: impl Into<String>) -> Self {
        Self::Command(msg.into())
    }

    /// Create a state error
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = InstallerError::validation("passwords do not match");
        assert_eq!(err.to_string(), "Validation error: passwords do not match");

        let err = InstallerError::MissingMedia("/dev/loop0".to_string());
        assert_eq!(err.to_string(), "Source media /dev/loop0 is not available");

        let err = InstallerError::SubvolumeNotBtrfs("/dev/sda2".to_string());
        assert!(err.to_string().contains("limited to btrfs"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: InstallerError = io_err.into();
        assert!(matches!(err, InstallerError::Io(_)));
    }

    #[test]
    fn test_error_constructors() {
        assert!(matches!(InstallerError::config("x"), InstallerError::Config(_)));
        assert!(matches!(InstallerError::command("x"), InstallerError::Command(_)));
        assert!(matches!(InstallerError::state("x"), InstallerError::State(_)));
    }
}
