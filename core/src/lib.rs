//! Flow orchestrator and the cooperative main-loop model.
//!
//! A single foreground flow runs at a time. The host listener and UI only
//! deliver events; they never preempt the flow. Every fully reassembled
//! host command is dispatched here to the owning app, gated on user
//! consent, and answered with exactly one result or one typed error, after
//! which transient secrets are zeroed and the interface unpinned.

pub mod events;
pub mod orchestrator;

pub use events::{Event, EventQueue, WaitResult};
pub use orchestrator::{DeviceCore, SecretEntry};
