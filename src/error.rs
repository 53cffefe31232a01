//! Error types for hwcheck

use std::io;
use thiserror::Error;

/// Result type alias for hwcheck operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type shared by every probe and backend
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// NVML error (vendor utility layer)
    #[cfg(feature = "nvidia")]
    #[error("NVML error: {0}")]
    Nvml(#[from] nvml_wrapper::error::NvmlError),

    /// Nix error (Unix)
    #[cfg(unix)]
    #[error("Nix error: {0}")]
    Nix(#[from] nix::Error),

    /// A shared library or one of its symbols could not be loaded
    #[error("Library error: {0}")]
    Library(String),

    /// A CUDA runtime or driver call returned a non-success status
    #[error("CUDA call {call} failed with status {code}")]
    Cuda { call: &'static str, code: i32 },

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Device not found
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Feature not supported on this platform or build
    #[error("Not supported: {0}")]
    NotSupported(String),
}

impl Error {
    /// Whether this error is an access denial that a probe may report inline
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Error::PermissionDenied(_) => true,
            Error::Io(e) => e.kind() == io::ErrorKind::PermissionDenied,
            #[cfg(unix)]
            Error::Nix(errno) => matches!(errno, nix::Error::EACCES | nix::Error::EPERM),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_detection() {
        assert!(Error::PermissionDenied("/root".to_string()).is_permission_denied());
        assert!(Error::Io(io::Error::from(io::ErrorKind::PermissionDenied)).is_permission_denied());
        assert!(!Error::Io(io::Error::from(io::ErrorKind::NotFound)).is_permission_denied());
        assert!(!Error::Parse("bad".to_string()).is_permission_denied());
    }

    #[test]
    #[cfg(unix)]
    fn test_errno_permission_denied() {
        assert!(Error::Nix(nix::Error::EACCES).is_permission_denied());
        assert!(Error::Nix(nix::Error::EPERM).is_permission_denied());
        assert!(!Error::Nix(nix::Error::ENOENT).is_permission_denied());
    }

    #[test]
    fn test_cuda_error_display() {
        let err = Error::Cuda {
            call: "cuCtxCreate_v2",
            code: 2,
        };
        assert_eq!(err.to_string(), "CUDA call cuCtxCreate_v2 failed with status 2");
    }
}
