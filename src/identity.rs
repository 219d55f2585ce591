//! Process-local identity allocation for distributed completion objects
//!
//! Completion events are never created remotely, so their identities do not
//! have to be registered with any global lookup service. Instead, every
//! identity in this module is handed out from a process-local monotonically
//! increasing counter, which makes allocation cheap and contention-free. The
//! flip side is that none of these identities are stable across process
//! restarts; they are only meaningful for the lifetime of the process that
//! allocated them.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};


/// Process-local, globally-addressable handle of a completion object
///
/// Assigned exactly once, at construction of the completion object, and
/// immutable afterwards. The device uses it as the key of its
/// active-completions table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CompletionId(u64);
//
impl CompletionId {
    /// Allocate a fresh completion identity
    pub(crate) fn allocate() -> Self {
        static NEXT_COMPLETION: AtomicU64 = AtomicU64::new(1);
        CompletionId(NEXT_COMPLETION.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw representation, for wire formats and logs
    pub fn as_u64(self) -> u64 {
        self.0
    }
}
//
impl fmt::Display for CompletionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "completion-{}", self.0)
    }
}


/// Identity of a device that produces completion values
///
/// Assigned by whoever creates the device handle; read-only afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeviceId(u64);
//
impl DeviceId {
    /// Wrap a raw device identity
    pub fn new(raw: u64) -> Self {
        DeviceId(raw)
    }

    /// Raw representation, for wire formats and logs
    pub fn as_u64(self) -> u64 {
        self.0
    }
}
//
impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device-{}", self.0)
    }
}


/// Process-local identity of a completion kind (i.e. of a result type)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KindId(u32);
//
impl KindId {
    /// Raw representation, for logs
    pub fn as_u32(self) -> u32 {
        self.0
    }
}


/// Obtain the type identity of completion kind `T`
///
/// The identity is assigned lazily, on first use, from a monotonically
/// increasing counter. Repeated calls for the same `T` return the same
/// identity within one process.
pub fn kind_id<T: 'static>() -> KindId {
    static KINDS: OnceLock<Mutex<HashMap<TypeId, u32>>> = OnceLock::new();
    static NEXT_KIND: AtomicU32 = AtomicU32::new(1);

    let kinds = KINDS.get_or_init(Default::default);
    let mut kinds = kinds.lock().unwrap();
    let raw = *kinds
        .entry(TypeId::of::<T>())
        .or_insert_with(|| NEXT_KIND.fetch_add(1, Ordering::Relaxed));
    KindId(raw)
}


/// Unit tests
#[cfg(test)]
mod tests {
    use super::*;

    /// Check that completion identities are never handed out twice
    #[test]
    fn completion_ids_are_unique() {
        let first = CompletionId::allocate();
        let second = CompletionId::allocate();
        let third = CompletionId::allocate();
        assert_ne!(first, second);
        assert_ne!(second, third);
        assert!(first.as_u64() < second.as_u64());
        assert!(second.as_u64() < third.as_u64());
    }

    /// Check that a completion kind keeps its identity within a process
    #[test]
    fn kind_ids_are_stable_per_type() {
        assert_eq!(kind_id::<u32>(), kind_id::<u32>());
        assert_eq!(kind_id::<Vec<u8>>(), kind_id::<Vec<u8>>());
    }

    /// Check that distinct completion kinds get distinct identities
    #[test]
    fn kind_ids_differ_across_types() {
        assert_ne!(kind_id::<u32>(), kind_id::<u64>());
        assert_ne!(kind_id::<()>(), kind_id::<String>());
    }
}
