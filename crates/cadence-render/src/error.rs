// SPDX-License-Identifier: CEPL-1.0
use std::time::Duration;

use thiserror::Error;

/// Failures surfaced by the frame core.
///
/// Out-of-date and suboptimal surfaces are not errors: they are absorbed by
/// [`crate::FrameScheduler`] and reported as a rebuild flag.
#[derive(Error, Debug)]
pub enum RenderError {
    /// A bounded wait expired; the GPU is assumed hung.
    #[error("`{operation}` did not complete within {timeout:?}; device hung")]
    DeviceHung {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("GPU device lost")]
    DeviceLost,

    /// More live materials than a descriptor batch was configured to address.
    #[error("descriptor batch needs {required} slots but the ceiling is {ceiling}")]
    CapacityExceeded { required: u32, ceiling: u32 },

    #[error("presentation surface unavailable: {0}")]
    SurfaceUnavailable(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{call} failed: {message}")]
    Backend { call: &'static str, message: String },
}

impl RenderError {
    pub fn backend(call: &'static str, message: impl std::fmt::Display) -> Self {
        RenderError::Backend {
            call,
            message: message.to_string(),
        }
    }

    /// Capacity errors leave the subsystem usable; everything else should stop the loop.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, RenderError::CapacityExceeded { .. })
    }
}

pub type RenderResult<T> = std::result::Result<T, RenderError>;
