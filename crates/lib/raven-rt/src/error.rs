use thiserror::Error;

pub type RtResult<T> = anyhow::Result<T, RtError>;

/// Every failure the ray tracing core reports. Cloneable so a failed handle can keep
/// handing out the very same error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RtError {
    #[error("Structural validation failed: {reason}")]
    StructuralValidation {
        reason: String,
    },

    #[error("Reference is no longer valid: {reason}")]
    ReferenceValidity {
        reason: String,
    },

    #[error("Device resources exhausted: {reason}")]
    DeviceResourceExhaustion {
        reason: String,
    },

    #[error("Use after destroy: {reason}")]
    UseAfterDestroy {
        reason: String,
    },

    #[error("Unsupported: {reason}")]
    Unsupported {
        reason: String,
    },
}

impl RtError {
    pub fn structural(reason: impl Into<String>) -> Self {
        Self::StructuralValidation { reason: reason.into() }
    }

    pub fn reference(reason: impl Into<String>) -> Self {
        Self::ReferenceValidity { reason: reason.into() }
    }

    pub fn exhausted(reason: impl Into<String>) -> Self {
        Self::DeviceResourceExhaustion { reason: reason.into() }
    }

    pub fn destroyed(reason: impl Into<String>) -> Self {
        Self::UseAfterDestroy { reason: reason.into() }
    }

    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::Unsupported { reason: reason.into() }
    }

    /// The human-readable reason, without the kind prefix.
    pub fn reason(&self) -> &str {
        match self {
            Self::StructuralValidation { reason }
            | Self::ReferenceValidity { reason }
            | Self::DeviceResourceExhaustion { reason }
            | Self::UseAfterDestroy { reason }
            | Self::Unsupported { reason } => reason,
        }
    }
}

/// Bail out of the current function with a structural validation error when `cond` is false.
macro_rules! ensure_structure {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::RtError::structural(format!($($arg)+)));
        }
    };
}

pub(crate) use ensure_structure;
