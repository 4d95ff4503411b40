use thiserror::Error;

use crate::types::Target;

/// Outcomes the host callback surface can fail with.
///
/// These surface to the immediate caller as result outcomes, never as a
/// process-level abort; callers are expected to fall back to a harmless
/// default value when a nested call fails.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
    /// The name or identifier resolves to no live registration.
    #[error("no registered function for {0}")]
    NotFound(Target),

    /// A registration collided with an existing name.
    #[error("function name '{0}' is already registered")]
    DuplicateName(String),

    /// The host allocator refused the request.
    #[error("allocation failed: {0}")]
    AllocationFailed(String),

    /// The callee faulted or returned a malformed result.
    #[error("call to '{function}' failed: {reason}")]
    CallFailed { function: String, reason: String },
}

/// Result type alias for host callback operations.
pub type HostResult<T> = Result<T, HostError>;
