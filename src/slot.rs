//! Caller-owned result storage
//!
//! A result slot is the storage that the eventual value of a completion event
//! is delivered into. The caller supplies the storage when the event is
//! constructed, the producer writes into it in place, and the consumer moves
//! the value out through the future handle. There is no intermediate
//! allocation or copy on that path. The slot itself is a pure data holder; it
//! is the cycle state machine that decides who may touch it when.

/// Caller-owned storage that eventually holds a delivered value
///
/// For void completions, the unit type is substituted for `T`, so that the
/// arming, consumption and teardown logic is shared with typed completions
/// rather than being maintained twice.
#[derive(Debug)]
pub struct ResultSlot<T> {
    value: Option<T>,
}
//
impl<T> ResultSlot<T> {
    /// Wrap caller-supplied storage
    pub fn new(storage: T) -> Self {
        ResultSlot {
            value: Some(storage),
        }
    }

    /// Write into the storage in place
    ///
    /// Panics if the value was already moved out, which the cycle state
    /// machine is supposed to make impossible.
    pub(crate) fn write_in_place(&mut self, fill: impl FnOnce(&mut T)) {
        let value = self
            .value
            .as_mut()
            .expect("result slot written after its value was taken");
        fill(value);
    }

    /// Move the delivered value out of the slot, at most once per cycle
    pub(crate) fn take(&mut self) -> Option<T> {
        self.value.take()
    }
}
