//! The completion event: a promise/future pair with remote identity
//!
//! A completion event is the client-side bookkeeping for one asynchronous
//! device operation. It is split three ways:
//!
//! - The event itself owns the arming policy and the current cycle, and is
//!   what callers construct, reset, wait on and destroy.
//! - The future handle is the read side of one cycle. At most one future may
//!   be retrieved per cycle; it stays bound to its cycle even if the event is
//!   reset afterwards.
//! - The writer is the producer side of one cycle. It is created when the
//!   cycle is armed, travels to wherever the device operation runs, and
//!   settles the cycle exactly once with a value or an error.
//!
//! All three share the event core, which carries the event's identity and
//! its device reference. When the last of them goes away, the core issues a
//! single teardown notification telling the device to forget the event, no
//! matter which owner was dropped last and no matter whether the event was
//! ever armed or consumed.

use crate::arming::ArmingPolicy;
use crate::device::DeviceRef;
use crate::error::{CompletionError, RemoteError};
use crate::identity::{kind_id, CompletionId, DeviceId};
use crate::slot::ResultSlot;
use crate::state::{AtomicCycleState, CycleState, WaitOutcome};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;
use tracing::{debug, trace};


/// Action that submits the underlying device operation for one cycle
///
/// Invoked at most once per cycle, with the producer handle that the
/// submission's eventual outcome must be reported through.
pub type SubmitAction<T> = Arc<dyn Fn(CompletionWriter<T>) + Send + Sync>;


/// Identity and teardown hook shared by every owner of a completion event
///
/// The event, its future handles and its writers all hold a reference to the
/// core, so the teardown notification fires when the last of them is
/// released, whichever one that happens to be.
struct EventCore {
    /// Process-local identity, assigned once at construction
    id: CompletionId,

    /// The device that produces (or has produced) the value; read-only after
    /// construction, used only at teardown
    device: DeviceRef,
}
//
impl Drop for EventCore {
    /// Tell the device to drop this event from its active-completions table.
    /// Fire-and-forget: failures stay on the device side.
    fn drop(&mut self) {
        trace!(id = %self.id, device = %self.device.id(), "unregistering completion event");
        self.device.unregister(self.id);
    }
}


/// Shared state of one arming cycle
///
/// The atomic cycle state is authoritative. Stores that blocked waiters care
/// about (Ready, Errored) happen while the result lock is held, so that a
/// waiter checking the state under that lock cannot miss the wakeup that
/// follows.
struct CycleShared<T: Send + 'static> {
    /// The owning event's identity and teardown hook
    core: Arc<EventCore>,

    /// Where this cycle stands in the state machine
    state: AtomicCycleState,

    /// Submission logic, run by whoever wins the arming race
    submit: SubmitAction<T>,

    /// Caller-owned result storage and the producer's error report
    result: Mutex<CycleResult<T>>,

    /// Condition variable used to wake waiters when the cycle settles
    settled_cv: Condvar,
}
//
struct CycleResult<T> {
    /// The value is written directly into this slot, without any extra copy
    slot: ResultSlot<T>,

    /// Set instead of the slot when the producer reports a failure
    error: Option<RemoteError>,
}
//
impl<T: Send + 'static> CycleShared<T> {
    /// Create a fresh, unarmed cycle around caller-supplied storage
    fn new(core: Arc<EventCore>, submit: SubmitAction<T>, storage: T) -> Arc<Self> {
        Arc::new(CycleShared {
            core,
            state: AtomicCycleState::new(CycleState::Unarmed),
            submit,
            result: Mutex::new(CycleResult {
                slot: ResultSlot::new(storage),
                error: None,
            }),
            settled_cv: Condvar::new(),
        })
    }

    /// Run the submission logic if nobody has armed this cycle yet
    ///
    /// Idempotent: the compare-and-set on the cycle state designates a single
    /// winner among concurrent callers, and only the winner submits.
    fn execute_deferred(self: &Arc<Self>) {
        if self.state.try_arm() {
            trace!(id = %self.core.id, "arming completion event");
            let writer = CompletionWriter {
                cycle: Arc::clone(self),
                done: false,
            };
            (self.submit)(writer);
        }
    }

    /// Block the calling thread until the producer settles this cycle
    fn block_until_settled(&self) {
        let mut result = self.result.lock().unwrap();
        while !self.state.load(Ordering::Acquire).is_settled() {
            result = self.settled_cv.wait(result).unwrap();
        }
        drop(result);
    }

    /// Block until the cycle settles or the deadline passes, whichever comes
    /// first. The caller has already checked that the cycle is armed.
    fn wait_deadline(&self, deadline: Instant) -> WaitOutcome {
        let mut result = self.result.lock().unwrap();
        loop {
            if self.state.load(Ordering::Acquire).is_settled() {
                return WaitOutcome::Ready;
            }
            let now = Instant::now();
            if now >= deadline {
                return WaitOutcome::TimedOut;
            }
            let (guard, _timeout) = self
                .settled_cv
                .wait_timeout(result, deadline - now)
                .unwrap();
            result = guard;
        }
    }
}


/// Producer handle: the write side of one completion cycle
///
/// Exactly one writer exists per armed cycle. It settles the cycle at most
/// once; if it is dropped without doing so, the cycle fails with
/// [`RemoteError::Disconnected`] so that waiters never hang on a producer
/// that went away.
pub struct CompletionWriter<T: Send + 'static> {
    /// The cycle this writer feeds
    cycle: Arc<CycleShared<T>>,

    /// Whether the cycle was already settled through this writer
    done: bool,
}
//
impl<T: Send + 'static> CompletionWriter<T> {
    /// Identity of the completion event this writer feeds
    pub fn completion_id(&self) -> CompletionId {
        self.cycle.core.id
    }

    /// Write the value directly into the caller-owned slot and publish it
    ///
    /// The closure receives the storage that was supplied when the event (or
    /// cycle) was created, and writes the result in place. Publication uses
    /// release ordering under the result lock: a reader that observes the
    /// Ready state observes the fully written slot.
    pub fn fill(mut self, fill: impl FnOnce(&mut T)) {
        trace!(id = %self.completion_id(), "publishing completion value");
        self.settle(|result| result.slot.write_in_place(fill), CycleState::Ready);
    }

    /// Report that the remote operation failed
    pub fn fail(mut self, error: RemoteError) {
        debug!(id = %self.completion_id(), %error, "completion event failed");
        self.settle(|result| result.error = Some(error), CycleState::Errored);
    }

    fn settle(&mut self, apply: impl FnOnce(&mut CycleResult<T>), settled: CycleState) {
        let mut result = self.cycle.result.lock().unwrap();
        assert_eq!(
            self.cycle.state.load(Ordering::Acquire),
            CycleState::Armed,
            "completion cycle settled twice"
        );
        apply(&mut result);
        // The store happens under the result lock so blocked waiters cannot
        // miss the notification that follows
        self.cycle.state.store(settled, Ordering::Release);
        self.done = true;
        drop(result);
        self.cycle.settled_cv.notify_all();
    }
}
//
impl CompletionWriter<()> {
    /// Mark a void completion as done
    pub fn complete(self) {
        self.fill(|_| ());
    }
}
//
impl<T: Send + 'static> Drop for CompletionWriter<T> {
    /// If the producer goes away before settling the cycle, fail it so that
    /// waiters are unblocked instead of hanging forever
    fn drop(&mut self) {
        if !self.done {
            self.settle(
                |result| result.error = Some(RemoteError::Disconnected),
                CycleState::Errored,
            );
        }
    }
}


/// Future handle: the read side of one completion cycle
///
/// Obtained through [`CompletionEvent::get_future`], at most once per cycle.
/// The handle stays bound to the cycle it was retrieved from: resetting the
/// event afterwards does not redirect it to the new cycle's result.
pub struct CompletionFuture<T: Send + 'static> {
    cycle: Arc<CycleShared<T>>,
}
//
impl<T: Send + 'static> CompletionFuture<T> {
    /// Non-blocking check whether the cycle has settled. Never arms.
    pub fn is_ready(&self) -> bool {
        self.cycle.state.load(Ordering::Acquire).is_settled()
    }

    /// Block until the cycle settles or the deadline passes
    ///
    /// Returns [`WaitOutcome::Deferred`] immediately, without blocking or
    /// arming, if the cycle has never been armed.
    pub fn wait_until(&self, deadline: Instant) -> WaitOutcome {
        if self.cycle.state.load(Ordering::Acquire) == CycleState::Unarmed {
            return WaitOutcome::Deferred;
        }
        self.cycle.wait_deadline(deadline)
    }

    /// Block until the producer settles the cycle, then take its outcome
    ///
    /// Arms the cycle first if nobody else has, so that awaiting a deferred
    /// completion is enough to make it happen.
    pub fn wait(self) -> Result<T, RemoteError> {
        self.cycle.execute_deferred();
        self.cycle.block_until_settled();
        self.consume()
    }

    /// Take the outcome of a settled cycle
    fn consume(self) -> Result<T, RemoteError> {
        let mut result = self.cycle.result.lock().unwrap();
        let settled = self.cycle.state.load(Ordering::Acquire);
        match settled {
            CycleState::Ready => {
                let value = result
                    .slot
                    .take()
                    .expect("ready completion cycle with an empty result slot");
                // Ready -> Consumed; Errored stays terminal for its cycle
                self.cycle.state.store(CycleState::Consumed, Ordering::Release);
                Ok(value)
            }
            CycleState::Errored => Err(result
                .error
                .clone()
                .expect("errored completion cycle without an error report")),
            other => unreachable!("consuming an unsettled completion cycle ({other:?})"),
        }
    }
}
//
impl<T: Send + 'static> fmt::Debug for CompletionFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionFuture")
            .field("id", &self.cycle.core.id)
            .field("state", &self.cycle.state.load(Ordering::Acquire))
            .finish()
    }
}


/// The completion event itself
///
/// Constructed with a device reference, an arming policy, caller-supplied
/// result storage and a submission action. Construction allocates the event's
/// identity and, under the eager policy, immediately arms the first cycle;
/// under the deferred policy no device-side work happens until the result is
/// first observed.
///
/// Void completions are expressed as `CompletionEvent<()>`: the unit type
/// takes the place of the value, and the whole state machine is shared with
/// typed completions.
pub struct CompletionEvent<T: Send + 'static = ()> {
    /// Identity and teardown hook, shared with futures and writers
    core: Arc<EventCore>,

    /// When cycles of this event get armed
    policy: ArmingPolicy,

    /// Submission logic, shared by all cycles of this event
    submit: SubmitAction<T>,

    /// The current arming cycle; replaced wholesale on reset
    cycle: Mutex<Arc<CycleShared<T>>>,

    /// Whether a future handle was handed out for the current cycle
    future_obtained: AtomicBool,
}
//
impl<T: Send + Default + 'static> CompletionEvent<T> {
    /// Construct a completion event with default storage for the first cycle
    pub fn new(
        device: DeviceRef,
        policy: ArmingPolicy,
        submit: impl Fn(CompletionWriter<T>) + Send + Sync + 'static,
    ) -> Self {
        Self::with_slot(device, policy, T::default(), submit)
    }

    /// Return the event to the unarmed state for a new arming cycle
    ///
    /// Clears the consumption flag, so a future handle can be retrieved
    /// again. A handle obtained before the reset remains bound to the prior
    /// cycle's result. Eager events arm the new cycle before returning.
    pub fn reset(&self) {
        self.reset_with(T::default());
    }
}
//
impl<T: Send + 'static> CompletionEvent<T> {
    /// Construct a completion event around caller-supplied result storage
    ///
    /// The eventual value is written directly into `storage`; no intermediate
    /// value is allocated and copied in.
    pub fn with_slot(
        device: DeviceRef,
        policy: ArmingPolicy,
        storage: T,
        submit: impl Fn(CompletionWriter<T>) + Send + Sync + 'static,
    ) -> Self {
        let id = CompletionId::allocate();
        debug!(
            %id,
            device = %device.id(),
            kind = kind_id::<T>().as_u32(),
            ?policy,
            "created completion event"
        );
        let core = Arc::new(EventCore { id, device });
        let submit: SubmitAction<T> = Arc::new(submit);
        let event = CompletionEvent {
            cycle: Mutex::new(CycleShared::new(
                Arc::clone(&core),
                Arc::clone(&submit),
                storage,
            )),
            core,
            policy,
            submit,
            future_obtained: AtomicBool::new(false),
        };
        if event.policy.arms_at_creation() {
            event.execute_deferred();
        }
        event
    }

    /// Identity of this event
    pub fn id(&self) -> CompletionId {
        self.core.id
    }

    /// Identity of the device that produces this event's value
    pub fn device(&self) -> DeviceId {
        self.core.device.id()
    }

    /// The arming policy this event was constructed with
    pub fn policy(&self) -> ArmingPolicy {
        self.policy
    }

    /// Non-blocking check whether the current cycle has settled. Never arms.
    pub fn is_ready(&self) -> bool {
        self.current_cycle()
            .state
            .load(Ordering::Acquire)
            .is_settled()
    }

    /// Submit the underlying device operation if that has not happened yet
    ///
    /// Idempotent: no matter how many times or from how many threads this is
    /// invoked, the submission logic runs at most once per cycle.
    pub fn execute_deferred(&self) {
        self.current_cycle().execute_deferred();
    }

    /// Block the calling thread until the current cycle settles
    ///
    /// Arms the cycle first if nobody else has.
    pub fn wait(&self) {
        let cycle = self.current_cycle();
        cycle.execute_deferred();
        cycle.block_until_settled();
    }

    /// Block until the current cycle settles or the deadline passes
    ///
    /// If the cycle has never been armed, returns [`WaitOutcome::Deferred`]
    /// immediately, without blocking or arming: "nobody asked for this yet"
    /// is distinguished from "asked and still pending".
    pub fn wait_until(&self, deadline: Instant) -> WaitOutcome {
        let cycle = self.current_cycle();
        if cycle.state.load(Ordering::Acquire) == CycleState::Unarmed {
            return WaitOutcome::Deferred;
        }
        cycle.wait_deadline(deadline)
    }

    /// Retrieve the future handle bound to the current cycle's outcome
    ///
    /// At most one handle is handed out per cycle; a second call without an
    /// intervening reset fails with [`CompletionError::AlreadyRetrieved`] and
    /// changes nothing.
    pub fn get_future(&self) -> Result<CompletionFuture<T>, CompletionError> {
        if self.future_obtained.swap(true, Ordering::AcqRel) {
            return Err(CompletionError::AlreadyRetrieved);
        }
        Ok(CompletionFuture {
            cycle: self.current_cycle(),
        })
    }

    /// Start a new arming cycle around fresh caller-supplied storage
    pub fn reset_with(&self, storage: T) {
        trace!(id = %self.core.id, "resetting completion event");
        let fresh = CycleShared::new(
            Arc::clone(&self.core),
            Arc::clone(&self.submit),
            storage,
        );
        *self.cycle.lock().unwrap() = Arc::clone(&fresh);
        self.future_obtained.store(false, Ordering::Release);
        if self.policy.arms_at_creation() {
            fresh.execute_deferred();
        }
    }

    fn current_cycle(&self) -> Arc<CycleShared<T>> {
        Arc::clone(&self.cycle.lock().unwrap())
    }
}
