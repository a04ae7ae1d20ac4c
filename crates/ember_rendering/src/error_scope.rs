//! Synchronous capture of `wgpu` errors.
//!
//! `wgpu` reports validation and allocation failures asynchronously. Every
//! call that can fail is wrapped in a pair of error scopes and the scopes
//! are popped immediately, so the failure is attributed to the call that
//! caused it instead of surfacing later in the uncaptured-error handler.

use ember_core::error::{DeviceError, DeviceErrorKind, DeviceResult};

/// Kind of a captured `wgpu` error.
#[must_use]
pub fn classify(error: &wgpu::Error) -> DeviceErrorKind {
    if matches!(error, wgpu::Error::OutOfMemory { .. }) {
        DeviceErrorKind::OutOfMemory
    } else {
        DeviceErrorKind::Validation
    }
}

/// Opens validation and out-of-memory scopes on `device`.
pub fn push(device: &wgpu::Device) {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
}

/// Closes the scopes opened by [`push`] and returns the first error caught.
#[must_use]
pub fn pop(device: &wgpu::Device) -> Option<wgpu::Error> {
    let validation = pollster::block_on(device.pop_error_scope());
    let out_of_memory = pollster::block_on(device.pop_error_scope());
    validation.or(out_of_memory)
}

/// Closes the scopes opened by [`push`] and turns a caught error into a
/// [`DeviceError`] for `operation`.
///
/// # Errors
///
/// Returns the captured error, if any.
#[track_caller]
pub fn check(device: &wgpu::Device, operation: &str) -> DeviceResult<()> {
    match pop(device) {
        None => Ok(()),
        Some(error) => Err(DeviceError::new(operation, classify(&error), error.to_string())),
    }
}

/// Logs errors no scope caught.
pub fn install_uncaptured_handler(device: &wgpu::Device) {
    device.on_uncaptured_error(Box::new(|error| {
        tracing::error!(kind = %classify(&error), %error, "uncaptured device error");
    }));
}
