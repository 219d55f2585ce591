//! Remote operation facade for device programs
//!
//! A program is a client-side handle through which source upload, build and
//! kernel creation are requested from a device. Each operation issues exactly
//! one asynchronous remote invocation and hands back the future of a void
//! completion immediately; the synchronous variants simply block on that
//! future. The facade performs no retries and does not translate failures:
//! whatever the device reports comes back through the awaited future.
//!
//! Build and compile semantics (flag meanings, debug levels, compiler
//! behaviour) belong to the device side and are out of scope here.

use crate::arming::ArmingPolicy;
use crate::device::{DeviceLink, DeviceRequest};
use crate::error::RemoteError;
use crate::event::{CompletionEvent, CompletionFuture};
use std::sync::Arc;
use tracing::debug;


/// Client-side handle to a program on a remote device
pub struct Program {
    /// Transport the program's requests go through
    link: Arc<dyn DeviceLink>,
}
//
impl Program {
    /// Create a program handle on the given device link
    pub fn new(link: Arc<dyn DeviceLink>) -> Self {
        Program { link }
    }

    /// Upload program source to the device
    pub fn set_source(&self, source: &str) -> CompletionFuture<()> {
        debug!(bytes = source.len(), "issuing source upload");
        self.issue(DeviceRequest::SetSource {
            source: source.to_owned(),
        })
    }

    /// Upload program source and wait for the device to acknowledge it
    pub fn set_source_sync(&self, source: &str) -> Result<(), RemoteError> {
        self.set_source(source).wait()
    }

    /// Ask the device to compile the uploaded source
    pub fn build(&self, flags: Vec<String>, debug_level: u32) -> CompletionFuture<()> {
        debug!(?flags, debug_level, "issuing program build");
        self.issue(DeviceRequest::Build { flags, debug_level })
    }

    /// Ask the device to compile the uploaded source and wait for the result
    pub fn build_sync(&self, flags: Vec<String>, debug_level: u32) -> Result<(), RemoteError> {
        self.build(flags, debug_level).wait()
    }

    /// Ask the device to instantiate a kernel from a built module
    pub fn create_kernel(&self, module: &str, kernel: &str) -> CompletionFuture<()> {
        debug!(module, kernel, "issuing kernel creation");
        self.issue(DeviceRequest::CreateKernel {
            module: module.to_owned(),
            kernel: kernel.to_owned(),
        })
    }

    /// Ask the device to instantiate a kernel and wait for the result
    pub fn create_kernel_sync(&self, module: &str, kernel: &str) -> Result<(), RemoteError> {
        self.create_kernel(module, kernel).wait()
    }

    /// Issue one remote invocation through an eager void completion
    fn issue(&self, request: DeviceRequest) -> CompletionFuture<()> {
        let link = Arc::clone(&self.link);
        let event = CompletionEvent::new(self.link.device_ref(), ArmingPolicy::Eager, move |done| {
            link.enqueue(request.clone(), done)
        });
        // The event is dropped right after this; the future keeps the cycle
        // and the teardown hook alive until the caller is done with it
        event
            .get_future()
            .expect("a fresh completion event has no retrieved future")
    }
}
