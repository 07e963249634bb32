//! # Message handler abstraction.
//!
//! [`MessageHandler`] is what a channel invokes for each message it dispatches.
//! A failing handler returns the original cause as a [`BoxError`]; the channel
//! wraps it into [`HandlingError`](crate::HandlingError) and
//! [`DeliveryError`](crate::DeliveryError) for the sender.

use async_trait::async_trait;

use crate::error::BoxError;
use crate::message::Message;

/// # Asynchronous message consumer.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use fluxgate::{BoxError, Message, MessageHandler};
///
/// struct Audit;
///
/// #[async_trait]
/// impl MessageHandler<String> for Audit {
///     async fn handle_message(&self, message: Message<String>) -> Result<(), BoxError> {
///         if message.payload().is_empty() {
///             return Err("empty payload".into());
///         }
///         Ok(())
///     }
///
///     fn name(&self) -> &str { "audit" }
/// }
/// ```
#[async_trait]
pub trait MessageHandler<T: Send + 'static>: Send + Sync + 'static {
    /// Processes one message.
    async fn handle_message(&self, message: Message<T>) -> Result<(), BoxError>;

    /// Human-readable name (for logs and error messages).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}
