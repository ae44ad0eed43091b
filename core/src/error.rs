// coopflow/src/error.rs

use anyhow::Error as AnyhowError;
use thiserror::Error;
use uuid::Uuid;

/// Error taxonomy for every engine operation.
///
/// All operations return `CoopflowResult` rather than panicking across the
/// engine boundary; the order desk forwards the kind unchanged to callers.
#[derive(Debug, Error)]
pub enum CoopflowError {
  /// Malformed input: non-positive quantity, short dispute description,
  /// delivery-code mismatch, and similar. Surfaced to the caller; no retry.
  #[error("Validation failed: {message}")]
  Validation { message: String },

  /// Operation attempted from a state (or by an actor) where it is not
  /// legal. Surfaced as a user-facing message; not retried automatically.
  #[error("Operation '{operation}' is not permitted: {detail}")]
  IllegalState { operation: String, detail: String },

  /// Optimistic-lock failure: the order changed between the caller's read
  /// and its commit. Re-read state and re-issue the operation.
  #[error("Concurrent modification of order {order_id}: expected revision {expected}, found {actual}")]
  ConcurrencyConflict {
    order_id: Uuid,
    expected: u64,
    actual: u64,
  },

  #[error("{entity} not found: {id}")]
  NotFound { entity: &'static str, id: Uuid },

  /// A collaborator (media storage, geolocation, hashing backend) failed.
  /// Fatal to the specific sub-step only; order state is left untouched,
  /// so the operation is safely retriable.
  #[error("Upstream collaborator failed during '{operation}'. Source: {source}")]
  Upstream {
    operation: String,
    #[source]
    source: AnyhowError,
  },
}

impl CoopflowError {
  pub fn validation(message: impl Into<String>) -> Self {
    CoopflowError::Validation { message: message.into() }
  }

  pub fn illegal_state(operation: impl Into<String>, detail: impl Into<String>) -> Self {
    CoopflowError::IllegalState {
      operation: operation.into(),
      detail: detail.into(),
    }
  }

  pub fn upstream(operation: impl Into<String>, source: AnyhowError) -> Self {
    CoopflowError::Upstream {
      operation: operation.into(),
      source,
    }
  }
}

// Collaborator failures reported as bare anyhow errors become Upstream with
// an unspecified operation label. Engines that know the sub-step should use
// `CoopflowError::upstream` instead.
impl From<AnyhowError> for CoopflowError {
  fn from(err: AnyhowError) -> Self {
    CoopflowError::Upstream {
      operation: "collaborator".to_string(),
      source: err,
    }
  }
}

pub type CoopflowResult<T, E = CoopflowError> = std::result::Result<T, E>;
