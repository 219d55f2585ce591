//! Deferred-arming protocol
//!
//! Constructing a completion event and submitting its underlying device
//! operation are two separate things. Eager events submit at construction
//! time, which is the right call when the submission is what the caller asked
//! for in the first place. Deferred events submit lazily, on first wait or
//! explicit `execute_deferred`, which is the right call for side-effect-free
//! or skippable operations: a caller can then construct many events
//! speculatively and only pay device cost for the ones it actually observes.
//!
//! The policy is an explicit value chosen per completion kind at construction
//! time. Both policies drive the exact same cycle state machine; there is no
//! separate "deferred event" type.

/// Strategy deciding when a completion's device operation is submitted
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArmingPolicy {
    /// Submit the device operation when the cycle is created, i.e. at event
    /// construction and again at every reset
    Eager,

    /// Submit the device operation lazily, when the cycle's outcome is first
    /// waited for or when arming is explicitly requested
    Deferred,
}
//
impl ArmingPolicy {
    /// Check whether this policy arms a cycle as soon as it is created
    pub fn arms_at_creation(self) -> bool {
        match self {
            ArmingPolicy::Eager => true,
            ArmingPolicy::Deferred => false,
        }
    }
}
