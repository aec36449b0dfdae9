//! Wristlink Runtime
//!
//! Tokio plumbing around the core router: an in-process paired transport,
//! the phone endpoint task that serializes all inbound work, the completion
//! gate driver and the weak listener set.

pub mod builder;
pub mod endpoint;
pub mod gate_driver;
pub mod listeners;
pub mod memory_transport;

pub use builder::EndpointBuilder;
pub use endpoint::{Control, EndpointHandle, EndpointStats, PhoneEndpoint};
pub use gate_driver::{GateDriver, WatchdogReceiver};
pub use listeners::{weak_listener, ListenerSet, MessageListener};
pub use memory_transport::{InboundEvent, InboundQueue, MemoryTransport, DEFAULT_REQUEST_TIMEOUT};
