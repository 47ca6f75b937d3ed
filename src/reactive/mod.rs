//! Observable values and cancellation handles.
//!
//! Every listener registration in the crate (auth state, live queries,
//! task list changes, subscription errors) goes through these two types:
//!
//! - [`Subject`] - ordered, serialized fan-out with optional replay of the
//!   current value.
//! - [`Subscription`] - idempotent cancellation handle returned by every
//!   registration.

pub mod subject;
pub mod subscription;

pub use subject::{Listener, Subject};
pub use subscription::Subscription;
