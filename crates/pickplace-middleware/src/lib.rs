//! `pickplace-middleware` – frame and result transport.
//!
//! Carries raw sensor frames into the pipeline and fans its visualization
//! outputs back out, without caring about the data's meaning.
//!
//! # Modules
//!
//! - [`bus`] – Headless, typed, topic-based publish/subscribe event bus built
//!   on Tokio broadcast channels.

pub mod bus;

pub use bus::{BusError, EventBus, Topic, TopicReceiver};
