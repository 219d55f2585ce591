//! Interface boundary towards the device side
//!
//! This crate only implements the client side of the completion story. The
//! device/transport substrate that actually moves a request to a remote
//! device and runs a handler there is an external collaborator, specified
//! here at its interface boundary: a registry that completion events notify
//! on teardown, and a link that the remote operation facade submits requests
//! through. The `loopback` module provides an in-process implementation of
//! both, suitable for tests and as a reference for real transports.

use crate::event::CompletionWriter;
use crate::identity::{CompletionId, DeviceId};
use std::fmt;
use std::sync::Arc;


/// Device-side bookkeeping interface for the teardown protocol
///
/// When the last owner of a completion event drops it, the event issues a
/// single `unregister_completion` notification carrying its own identity, so
/// that the device can drop the event from its active-completions table.
/// The notification is fire-and-forget: implementations must not block the
/// destroying thread, and whatever goes wrong on the device side is not
/// surfaced to it.
pub trait CompletionRegistry: Send + Sync {
    /// Remove a completion object from the device's active-completions table
    fn unregister_completion(&self, device: DeviceId, completion: CompletionId);
}


/// Reference to the device that will produce a completion's value
///
/// Held by every completion event for its whole lifetime and read-only after
/// construction; only used at teardown time.
#[derive(Clone)]
pub struct DeviceRef {
    /// Identity of the device
    id: DeviceId,

    /// Registry the teardown notification goes to
    registry: Arc<dyn CompletionRegistry>,
}
//
impl DeviceRef {
    /// Create a device reference from an identity and a registry handle
    pub fn new(id: DeviceId, registry: Arc<dyn CompletionRegistry>) -> Self {
        DeviceRef { id, registry }
    }

    /// Identity of the referenced device
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Issue the fire-and-forget teardown notification for one completion
    pub(crate) fn unregister(&self, completion: CompletionId) {
        self.registry.unregister_completion(self.id, completion);
    }
}
//
impl fmt::Debug for DeviceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRef").field("id", &self.id).finish()
    }
}


/// Remote operations that the program facade can issue
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceRequest {
    /// Compile the previously uploaded source into a module
    Build {
        /// Compiler flags, passed through verbatim
        flags: Vec<String>,

        /// Device-specific debug level, 0 meaning none
        debug_level: u32,
    },

    /// Instantiate a kernel from a built module
    CreateKernel {
        /// Name of the module holding the kernel
        module: String,

        /// Name of the kernel entry point
        kernel: String,
    },

    /// Upload program source to the device
    SetSource {
        /// The program source text
        source: String,
    },
}


/// Transport boundary that moves requests to a device
///
/// One invocation of `enqueue` corresponds to one asynchronous remote
/// invocation. The producer handle travels with the request; whoever handles
/// the request on the device side settles the completion through it. This
/// crate performs no retries: if the transport loses the request, dropping
/// the writer fails the completion and the caller sees the failure through
/// the future it awaited.
pub trait DeviceLink: Send + Sync {
    /// The device reference that completions created through this link carry
    fn device_ref(&self) -> DeviceRef;

    /// Hand one request and the producer handle for its completion over to
    /// the transport
    fn enqueue(&self, request: DeviceRequest, done: CompletionWriter<()>);
}
