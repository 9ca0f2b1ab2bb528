//! XC Hub - command-and-control hub for a network of TCP effect actuators.
//!
//! Flame poofers, lights and cameras connect over TCP, announce themselves
//! by name, and receive short command tokens. A button client triggers
//! global on/off, a storm pattern, or a timed multi-pass "round".
//!
//! # Architecture
//!
//! - **Hub** - owns the listener, every connection and all state; one task
//! - **Registry** - named effects, round order, broadcast collections
//! - **Protocol** - record framing, message decoding, dispatch
//! - **Choreography** - precomputed round and finale sequences
//! - **Scheduler** - fires sequence transitions as their deadlines pass
//!
//! # Modules
//!
//! - [`hub`] - event loop and connection handling
//! - [`registry`] - effect registry and collections
//! - [`protocol`] - wire format and routing
//! - [`choreography`] - button actions and round generation
//! - [`scheduler`] - non-blocking event scheduler
//! - [`config`] - configuration loading

pub mod choreography;
pub mod config;
pub mod constants;
pub mod hub;
pub mod protocol;
pub mod registry;
pub mod scheduler;

// Re-export commonly used types
pub use config::Config;
pub use hub::{serve, Hub};
pub use registry::{ConnectionId, EffectRegistry};
