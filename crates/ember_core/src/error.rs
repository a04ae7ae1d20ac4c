//! # Error Types
//!
//! Everything that can go wrong between startup and shutdown.
//!
//! Device failures are classified by [`DeviceErrorKind`], a closed set of
//! kinds backed by a single lookup table (code, symbolic name, description).
//! A [`DeviceError`] carries the kind together with the failing operation
//! and the source location of the call that observed it.

use std::fmt;
use std::panic::Location;
use std::path::PathBuf;

use thiserror::Error;

use crate::protocol::ProtocolViolation;

/// Closed set of device error kinds.
///
/// Codes are stable and negative so they read like driver status codes in
/// logs; `0` is reserved for success and never appears here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum DeviceErrorKind {
    /// No adapter matched the request.
    DeviceNotFound = -1,
    /// An adapter exists but a device could not be opened on it.
    DeviceNotAvailable = -2,
    /// The adapter lacks a capability the shared buffer needs.
    SharingUnsupported = -3,
    /// Device or host memory exhausted.
    OutOfMemory = -4,
    /// The device was lost.
    DeviceLost = -5,
    /// A program failed to compile or validate.
    ProgramBuildFailure = -11,
    /// A kernel entry point does not exist in the program.
    InvalidKernelName = -46,
    /// Kernel arguments were rejected.
    InvalidKernelArgs = -52,
    /// The work-group size is not supported.
    InvalidWorkGroupSize = -54,
    /// The global work size exceeds dispatch limits.
    InvalidGlobalWorkSize = -63,
    /// A buffer size is zero or exceeds binding limits.
    InvalidBufferSize = -61,
    /// The operation is illegal in the current buffer ownership state.
    InvalidOperation = -59,
    /// The device rejected a command during validation.
    Validation = -30,
    /// The presentation surface was lost.
    SurfaceLost = -1000,
    /// The presentation surface no longer matches the window.
    SurfaceOutdated = -1001,
    /// Acquiring the next surface image timed out.
    SurfaceTimeout = -1002,
    /// Anything the table does not classify.
    Unknown = -9999,
}

/// `(kind, name, description)` for every kind, in declaration order.
const KIND_TABLE: [(DeviceErrorKind, &str, &str); 17] = [
    (DeviceErrorKind::DeviceNotFound, "DEVICE_NOT_FOUND", "no adapter matched the request"),
    (DeviceErrorKind::DeviceNotAvailable, "DEVICE_NOT_AVAILABLE", "the adapter refused to open a device"),
    (DeviceErrorKind::SharingUnsupported, "SHARING_UNSUPPORTED", "compute/graphics buffer sharing is not supported"),
    (DeviceErrorKind::OutOfMemory, "OUT_OF_MEMORY", "device or host memory exhausted"),
    (DeviceErrorKind::DeviceLost, "DEVICE_LOST", "the device was lost"),
    (DeviceErrorKind::ProgramBuildFailure, "PROGRAM_BUILD_FAILURE", "program compilation or validation failed"),
    (DeviceErrorKind::InvalidKernelName, "INVALID_KERNEL_NAME", "kernel entry point not found in program"),
    (DeviceErrorKind::InvalidKernelArgs, "INVALID_KERNEL_ARGS", "kernel arguments were rejected"),
    (DeviceErrorKind::InvalidWorkGroupSize, "INVALID_WORK_GROUP_SIZE", "work-group size not supported by the device"),
    (DeviceErrorKind::InvalidGlobalWorkSize, "INVALID_GLOBAL_WORK_SIZE", "dispatch exceeds the work-group count limit"),
    (DeviceErrorKind::InvalidBufferSize, "INVALID_BUFFER_SIZE", "buffer size is zero or exceeds binding limits"),
    (DeviceErrorKind::InvalidOperation, "INVALID_OPERATION", "operation illegal in the current ownership state"),
    (DeviceErrorKind::Validation, "VALIDATION", "the device rejected a command"),
    (DeviceErrorKind::SurfaceLost, "SURFACE_LOST", "the presentation surface was lost"),
    (DeviceErrorKind::SurfaceOutdated, "SURFACE_OUTDATED", "the presentation surface is outdated"),
    (DeviceErrorKind::SurfaceTimeout, "SURFACE_TIMEOUT", "timed out acquiring a surface image"),
    (DeviceErrorKind::Unknown, "UNKNOWN", "unclassified device error"),
];

impl DeviceErrorKind {
    /// Every kind, in table order.
    pub const ALL: [DeviceErrorKind; 17] = [
        Self::DeviceNotFound,
        Self::DeviceNotAvailable,
        Self::SharingUnsupported,
        Self::OutOfMemory,
        Self::DeviceLost,
        Self::ProgramBuildFailure,
        Self::InvalidKernelName,
        Self::InvalidKernelArgs,
        Self::InvalidWorkGroupSize,
        Self::InvalidGlobalWorkSize,
        Self::InvalidBufferSize,
        Self::InvalidOperation,
        Self::Validation,
        Self::SurfaceLost,
        Self::SurfaceOutdated,
        Self::SurfaceTimeout,
        Self::Unknown,
    ];

    /// Stable numeric code.
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Symbolic name, e.g. `OUT_OF_MEMORY`.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.entry().1
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(self) -> &'static str {
        self.entry().2
    }

    /// Looks a kind up by its numeric code.
    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        KIND_TABLE
            .iter()
            .find(|(kind, _, _)| kind.code() == code)
            .map(|(kind, _, _)| *kind)
    }

    fn entry(self) -> &'static (DeviceErrorKind, &'static str, &'static str) {
        KIND_TABLE
            .iter()
            .find(|(kind, _, _)| *kind == self)
            .unwrap_or(&KIND_TABLE[KIND_TABLE.len() - 1])
    }
}

impl fmt::Display for DeviceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A failed device operation.
#[derive(Debug, Clone)]
pub struct DeviceError {
    operation: String,
    kind: DeviceErrorKind,
    detail: String,
    location: &'static Location<'static>,
}

impl DeviceError {
    /// Creates an error attributed to the caller's source location.
    #[track_caller]
    #[must_use]
    pub fn new(operation: impl Into<String>, kind: DeviceErrorKind, detail: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            kind,
            detail: detail.into(),
            location: Location::caller(),
        }
    }

    /// The operation that failed, e.g. `dispatch(spawnParticle)`.
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Classified kind.
    #[must_use]
    pub fn kind(&self) -> DeviceErrorKind {
        self.kind
    }

    /// Driver or validation message, possibly empty.
    #[must_use]
    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// Source location of the call that observed the failure.
    #[must_use]
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} returned {}: {} ({}:{})",
            self.operation,
            self.kind.code(),
            self.kind.name(),
            self.location.file(),
            self.location.line(),
        )?;
        if !self.detail.is_empty() {
            write!(f, ": {}", self.detail)?;
        }
        Ok(())
    }
}

impl std::error::Error for DeviceError {}

/// Configuration file errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid TOML for the configuration schema.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Fatal errors raised before the frame loop starts.
#[derive(Error, Debug)]
pub enum SetupError {
    /// No adapter could drive the presentation surface.
    #[error("no suitable graphics adapter found")]
    NoAdapter,

    /// The adapter cannot share one buffer between compute and graphics.
    #[error("compute/graphics buffer sharing unsupported: {reason}")]
    InteropUnsupported {
        /// Which capability is missing.
        reason: String,
    },

    /// A device call failed during setup.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// A kernel or shading program failed to build.
    #[error("failed to build {program}:\n{log}")]
    ProgramBuild {
        /// Which program.
        program: String,
        /// Full compiler/validator log.
        log: String,
    },

    /// A configured program source file could not be read.
    #[error("failed to read program source {path}: {source}")]
    SourceRead {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Window or surface creation failed.
    #[error("window setup failed: {0}")]
    Window(String),
}

/// Fatal errors raised inside the frame loop.
#[derive(Error, Debug)]
pub enum FrameError {
    /// A device call failed.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// The buffer ownership protocol was violated.
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),
}

/// Top-level error of the application.
#[derive(Error, Debug)]
pub enum EmberError {
    /// Configuration failure.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Setup failure.
    #[error(transparent)]
    Setup(#[from] SetupError),

    /// Frame loop failure.
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Result of a device call.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Result of a frame-loop operation.
pub type FrameResult<T> = Result<T, FrameError>;

/// Result of a setup operation.
pub type SetupResult<T> = Result<T, SetupError>;

/// Result at application level.
pub type EmberResult<T> = Result<T, EmberError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_kind_table_covers_every_kind() {
        assert_eq!(KIND_TABLE.len(), DeviceErrorKind::ALL.len());
        for (entry, kind) in KIND_TABLE.iter().zip(DeviceErrorKind::ALL) {
            assert_eq!(entry.0, kind);
        }
    }

    #[test]
    fn test_codes_and_names_are_unique() {
        let codes: HashSet<i32> = DeviceErrorKind::ALL.iter().map(|k| k.code()).collect();
        let names: HashSet<&str> = DeviceErrorKind::ALL.iter().map(|k| k.name()).collect();
        assert_eq!(codes.len(), DeviceErrorKind::ALL.len());
        assert_eq!(names.len(), DeviceErrorKind::ALL.len());
        assert!(!codes.contains(&0));
    }

    #[test]
    fn test_from_code_round_trips() {
        for kind in DeviceErrorKind::ALL {
            assert_eq!(DeviceErrorKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(DeviceErrorKind::from_code(0), None);
        assert_eq!(DeviceErrorKind::from_code(12345), None);
    }

    #[test]
    fn test_device_error_display() {
        let err = DeviceError::new("dispatch(updateParticleState)", DeviceErrorKind::OutOfMemory, "");
        let text = err.to_string();
        assert!(text.starts_with("dispatch(updateParticleState) returned -4: OUT_OF_MEMORY ("));
        assert!(text.contains("error.rs:"));
        assert_eq!(err.location().file(), file!());

        let with_detail = DeviceError::new("submit", DeviceErrorKind::Validation, "bad binding");
        assert!(with_detail.to_string().ends_with(": bad binding"));
    }

    #[test]
    fn test_errors_convert_upwards() {
        let device = DeviceError::new("poll", DeviceErrorKind::DeviceLost, "gone");
        let frame: FrameError = device.into();
        let top: EmberError = frame.into();
        assert!(top.to_string().contains("DEVICE_LOST"));
    }
}
