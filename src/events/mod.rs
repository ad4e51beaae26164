//! Event streaming for dashboard and log consumers
//!
//! A broadcaster handle is passed explicitly into workers and agent
//! transports; there is no process-global bus.

mod bus;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, create_event_bus};
pub use types::SwarmEvent;
