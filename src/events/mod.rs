//! Runtime events: types, broadcast bus and a tracing writer.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//! - [`LogWriter`] forwards bus events to `tracing`
//!
//! ## Quick reference
//! - **Publishers**: `ReactiveChannel`, `PublishSubscribeChannel` (when built `with_bus`).
//! - **Consumers**: anything holding a `Bus::subscribe()` receiver, e.g. [`LogWriter`].

mod bus;
mod event;
mod log;

pub use bus::Bus;
pub use event::{Event, EventKind};
pub use log::LogWriter;
