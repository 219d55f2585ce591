//! Completion events for asynchronous remote device operations
//!
//! Picture yourself in a situation where: you want to delegate work to a
//! remote compute device, such as a GPU on this machine or on another node of
//! a cluster. You know that the work is going to take some time, and you have
//! other things to do meanwhile, so you would rather not wait for its
//! completion. But you would like a way to be notified when it's done, to
//! receive the result without paying for an extra copy, and to be sure that
//! the device forgets about the whole affair once you do not care anymore.
//!
//! This crate provides the client-side primitive for that scenario: a
//! completion event, which is a promise/future pair with a remote identity.
//! An event is constructed as cheap bookkeeping, without any device-side
//! work happening yet. Depending on its arming policy, the underlying device
//! operation is submitted either right away or lazily, on first observation,
//! so that speculatively constructed events whose result nobody ever asks
//! for cost nothing on the device. The eventual value is written by the
//! producer directly into caller-owned storage, and when the last owner of
//! an event drops it, the owning device is told exactly once to drop the
//! event from its active-completions table.

pub mod arming;
pub mod device;
pub mod error;
pub mod event;
pub mod identity;
pub mod loopback;
pub mod program;
pub mod slot;
pub mod state;
