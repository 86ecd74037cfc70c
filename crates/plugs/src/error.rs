use thiserror::Error;

/// Failures surfaced by the plug lifecycle and dispatch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// The named plug is not currently active.
    #[error("plug '{name}' is not loaded")]
    NotFound { name: String },

    /// A plug with this name is already active.
    #[error("plug '{name}' is already loaded")]
    AlreadyLoaded { name: String },

    /// The implementation could not be resolved or instantiated.
    #[error("failed to import plug '{name}': {reason}")]
    ImportFailure { name: String, reason: String },

    /// A handler returned an error or panicked during dispatch.
    #[error("plug '{plug}' failed while handling {event}: {reason}")]
    HandlerFault {
        plug: String,
        event: String,
        reason: String,
    },
}

impl KernelError {
    pub(crate) fn not_found(name: &str) -> Self {
        Self::NotFound {
            name: name.to_string(),
        }
    }

    pub(crate) fn import(name: &str, reason: impl Into<String>) -> Self {
        Self::ImportFailure {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_plug() {
        let err = KernelError::import("Ghost", "no implementation registered");
        assert_eq!(
            err.to_string(),
            "failed to import plug 'Ghost': no implementation registered"
        );
        assert!(KernelError::not_found("Core").to_string().contains("'Core'"));
    }
}
