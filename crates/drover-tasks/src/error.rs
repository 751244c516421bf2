use thiserror::Error;

use crate::backend::BackendError;

/// Failure raised by the queue, store and codec plumbing.
///
/// Backend I/O failures keep their source error boxed so callers can
/// still inspect the underlying driver error if they need to.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("could not write message to the queue")]
    QueueWrite(#[source] BackendError),

    #[error("could not read message from the queue")]
    QueueRead(#[source] BackendError),

    #[error("could not remove message from the queue")]
    QueueRemove(#[source] BackendError),

    #[error("could not flush backend")]
    Flush(#[source] BackendError),

    #[error("could not write data to the store")]
    StorePut(#[source] BackendError),

    #[error("could not read data from the store")]
    StoreGet(#[source] BackendError),

    #[error("unknown task type {kind:?}")]
    UnknownTaskType { kind: String },

    #[error("could not encode task message")]
    Encode(#[source] serde_json::Error),

    #[error("could not decode task message")]
    Decode(#[source] serde_json::Error),

    #[error("unsupported message version {version}")]
    UnsupportedVersion { version: u8 },

    #[error("eagerly executed task failed")]
    Eager(#[source] TaskError),

    #[error("{0}")]
    Config(&'static str),
}

impl BrokerError {
    /// Decode-class failures mean the message itself is unusable and
    /// must be discarded instead of retried.
    #[must_use]
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownTaskType { .. } | Self::Decode(..) | Self::UnsupportedVersion { .. }
        )
    }
}

/// Failure raised while waiting on an [`AsyncResult`](crate::AsyncResult).
#[derive(Debug, Error)]
pub enum WaitError {
    #[error("timed out waiting for task result")]
    Timeout,

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// An opaque error produced by user task code.
///
/// Task implementations can wrap any error type (or a plain message)
/// with [`TaskError::new`]; the worker only logs it and applies the
/// retry policy, it never inspects the payload.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct TaskError(Box<dyn std::error::Error + Send + Sync + 'static>);

impl TaskError {
    pub fn new<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        Self(error.into())
    }

    pub(crate) fn panicked(cause: Box<dyn std::any::Any + Send>) -> Self {
        let cause = cause
            .downcast_ref::<&'static str>()
            .map(std::string::ToString::to_string)
            .or_else(|| cause.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown".into());

        Self::new(format!("task panicked: {cause}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_error_from_message() {
        let error = TaskError::new("blowed up");
        assert_eq!(error.to_string(), "blowed up");
    }

    #[test]
    fn decode_errors_are_classified() {
        let error = BrokerError::UnknownTaskType {
            kind: "nope".into(),
        };
        assert!(error.is_decode_error());
        assert!(!BrokerError::Config("misconfigured").is_decode_error());
    }
}
