//! In-process device backend
//!
//! This module provides a device implementation that lives in the same OS
//! process as its clients, with a worker thread standing in for the remote
//! side of the transport. It keeps the same bookkeeping a real device would:
//! an active-completions table keyed by completion identity, fed by the
//! teardown notifications that events issue when their last owner drops.
//!
//! The request handler is programmable, so tests can make any request
//! succeed or fail at will. The default handler acknowledges everything.
//!
//! Note that this backend should not be mistaken for a real transport: it
//! exists so that the completion machinery can be exercised end to end
//! without device hardware, and as a reference for what a transport has to
//! do with the writer handles it is given.

use crate::device::{CompletionRegistry, DeviceLink, DeviceRef, DeviceRequest};
use crate::error::RemoteError;
use crate::event::CompletionWriter;
use crate::identity::{CompletionId, DeviceId};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use tracing::{debug, trace};


/// Decides the outcome of each request handled by the loopback worker
pub type RequestHandler = Box<dyn FnMut(&DeviceRequest) -> Result<(), RemoteError> + Send>;


/// In-process device, backed by a worker thread
pub struct LoopbackDevice {
    /// State shared with the worker and with completion events
    shared: Arc<LoopbackShared>,

    /// Requests travel to the worker through this channel; closing it (by
    /// dropping the device) shuts the worker down
    sender: mpsc::Sender<(DeviceRequest, CompletionWriter<()>)>,
}
//
struct LoopbackShared {
    /// Identity of this device
    id: DeviceId,

    /// Completions this device is currently tracking
    active: Mutex<HashSet<CompletionId>>,

    /// How many requests were submitted to this device
    submissions: AtomicUsize,

    /// How many teardown notifications this device has received
    unregistrations: AtomicUsize,
}
//
impl LoopbackDevice {
    /// Create a loopback device that acknowledges every request
    pub fn new(id: DeviceId) -> Arc<Self> {
        Self::with_handler(id, Box::new(|_| Ok(())))
    }

    /// Create a loopback device with a programmable request handler
    pub fn with_handler(id: DeviceId, mut handler: RequestHandler) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel::<(DeviceRequest, CompletionWriter<()>)>();
        let shared = Arc::new(LoopbackShared {
            id,
            active: Mutex::new(HashSet::new()),
            submissions: AtomicUsize::new(0),
            unregistrations: AtomicUsize::new(0),
        });

        // The worker plays the role of the remote device: it settles each
        // completion through the writer that travelled with the request
        thread::spawn(move || {
            for (request, done) in receiver {
                trace!(?request, "loopback device handling request");
                match handler(&request) {
                    Ok(()) => done.complete(),
                    Err(error) => done.fail(error),
                }
            }
        });

        Arc::new(LoopbackDevice { shared, sender })
    }

    /// How many requests were submitted to this device so far
    pub fn submissions(&self) -> usize {
        self.shared.submissions.load(Ordering::SeqCst)
    }

    /// How many teardown notifications this device has received so far
    pub fn unregistrations(&self) -> usize {
        self.shared.unregistrations.load(Ordering::SeqCst)
    }

    /// How many completions this device is currently tracking
    pub fn active_completions(&self) -> usize {
        self.shared.active.lock().unwrap().len()
    }
}
//
impl DeviceLink for LoopbackDevice {
    fn device_ref(&self) -> DeviceRef {
        DeviceRef::new(
            self.shared.id,
            Arc::clone(&self.shared) as Arc<dyn CompletionRegistry>,
        )
    }

    fn enqueue(&self, request: DeviceRequest, done: CompletionWriter<()>) {
        self.shared.submissions.fetch_add(1, Ordering::SeqCst);
        self.shared
            .active
            .lock()
            .unwrap()
            .insert(done.completion_id());
        // If the worker is gone, the writer comes back inside the send error
        // and its drop fails the completion, which is all a lost request
        // should amount to
        let _ = self.sender.send((request, done));
    }
}
//
impl CompletionRegistry for LoopbackShared {
    /// Fire-and-forget teardown notification: drop the completion from the
    /// active table. An identity this device never tracked is not an error;
    /// the event may have been destroyed before its first submission.
    fn unregister_completion(&self, device: DeviceId, completion: CompletionId) {
        debug_assert_eq!(device, self.id);
        let was_tracked = self.active.lock().unwrap().remove(&completion);
        self.unregistrations.fetch_add(1, Ordering::SeqCst);
        debug!(%completion, was_tracked, "loopback device unregistered completion");
    }
}


/// Unit tests
#[cfg(test)]
mod tests {
    use super::*;
    use crate::arming::ArmingPolicy;
    use crate::event::CompletionEvent;
    use std::sync::Arc;

    fn submit_through(link: &Arc<LoopbackDevice>, request: DeviceRequest) -> CompletionEvent<()> {
        let link_for_submit = Arc::clone(link);
        CompletionEvent::new(link.device_ref(), ArmingPolicy::Eager, move |done| {
            link_for_submit.enqueue(request.clone(), done)
        })
    }

    /// Check the tracking table across a completion's whole lifetime
    #[test]
    fn tracking_table_lifecycle() {
        let device = LoopbackDevice::new(DeviceId::new(1));
        let event = submit_through(
            &device,
            DeviceRequest::SetSource {
                source: "__kernel void noop() {}".to_owned(),
            },
        );

        event.wait();
        assert_eq!(device.submissions(), 1);
        assert_eq!(device.active_completions(), 1);

        drop(event);
        assert_eq!(device.unregistrations(), 1);
        assert_eq!(device.active_completions(), 0);
    }

    /// Check that handler failures travel back through the completion
    #[test]
    fn handler_failure_fails_completion() {
        let device = LoopbackDevice::with_handler(
            DeviceId::new(2),
            Box::new(|request| match request {
                DeviceRequest::Build { .. } => {
                    Err(RemoteError::Device("compilation failed".to_owned()))
                }
                _ => Ok(()),
            }),
        );

        let event = submit_through(
            &device,
            DeviceRequest::Build {
                flags: vec![],
                debug_level: 0,
            },
        );
        let future = event.get_future().unwrap();
        assert_eq!(
            future.wait(),
            Err(RemoteError::Device("compilation failed".to_owned()))
        );
    }

    /// Check that requests enqueued after the worker is gone fail cleanly
    /// instead of hanging their waiters
    #[test]
    fn lost_request_fails_completion() {
        let device = LoopbackDevice::new(DeviceId::new(3));

        // A dead channel stands in for a worker that went away
        let (sender, receiver) = mpsc::channel::<(DeviceRequest, CompletionWriter<()>)>();
        drop(receiver);

        let event = CompletionEvent::new(device.device_ref(), ArmingPolicy::Eager, move |done| {
            let _ = sender.send((
                DeviceRequest::SetSource {
                    source: String::new(),
                },
                done,
            ));
        });
        let future = event.get_future().unwrap();
        assert_eq!(future.wait(), Err(RemoteError::Disconnected));
    }
}
