//! Error types for completion events
//!
//! Two propagation paths exist. Synchronous misuse of an event, like asking
//! for its future twice in one cycle, is reported immediately at the call
//! site. Failures of the remote operation itself are only reported through
//! the future that the caller chose to await. Internal consistency
//! violations, such as settling a cycle twice, are programming errors and
//! trigger an assertion rather than a recoverable error.

use thiserror::Error;


/// Errors reported synchronously by a completion event
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompletionError {
    /// A future handle was already retrieved during this arming cycle
    #[error("a future has already been retrieved for this completion cycle")]
    AlreadyRetrieved,

    /// The remote operation behind the event failed
    #[error(transparent)]
    Remote(#[from] RemoteError),
}


/// Failure of a remote device operation, surfaced through the future
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The device processed the request and reported a failure
    #[error("device reported failure: {0}")]
    Device(String),

    /// The producer went away before settling the cycle
    #[error("device disconnected before the operation completed")]
    Disconnected,
}
