//! # Message handlers.
//!
//! Handlers are what channels dispatch to. They stand in for a routing layer:
//! plain functions registered against a channel.
//!
//! - [`MessageHandler`] the handler trait
//! - [`HandlerFn`] closure-backed handler
//! - [`ServiceActivator`] payload function whose result is routed to an output or reply channel

mod activator;
mod handler;
mod handler_fn;

pub use activator::ServiceActivator;
pub use handler::MessageHandler;
pub use handler_fn::HandlerFn;
