//! Error types produced by channels, subscribers and handlers.
//!
//! - [`SendError`]: why a `send` did not complete.
//! - [`DeliveryError`] / [`HandlingError`]: the layered failure returned when a
//!   handler rejects a message: `DeliveryError -> HandlingError -> original cause`.
//! - [`SubscribeError`]: why a subscription could not be attached.
//! - [`ReplyError`]: why a handler result could not be routed.
//!
//! Every enum provides `as_label` (stable snake_case label for logs/metrics).

use std::any::Any;
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Boxed, thread-safe error used for handler failures.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// # Errors returned by `send`.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SendError {
    /// No subscription is active on the channel (never attached, cancelled or errored).
    #[error("channel '{channel}' has no active subscriber")]
    NoSubscriber {
        /// Name of the channel.
        channel: Arc<str>,
    },

    /// The message reached a handler, and the handler failed.
    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// The deadline passed before the message was handed to a subscriber.
    #[error("send to channel '{channel}' timed out after {timeout:?}")]
    Timeout {
        /// Name of the channel.
        channel: Arc<str>,
        /// The timeout that was exceeded.
        timeout: Duration,
    },

    /// The channel was completed and accepts no more messages.
    #[error("channel '{channel}' is closed")]
    Closed {
        /// Name of the channel.
        channel: Arc<str>,
    },
}

impl SendError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use fluxgate::SendError;
    ///
    /// let err = SendError::NoSubscriber { channel: "orders".into() };
    /// assert_eq!(err.as_label(), "send_no_subscriber");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SendError::NoSubscriber { .. } => "send_no_subscriber",
            SendError::Delivery(_) => "send_delivery_failed",
            SendError::Timeout { .. } => "send_timeout",
            SendError::Closed { .. } => "send_closed",
        }
    }

    /// Returns the delivery failure, if this is one.
    pub fn as_delivery(&self) -> Option<&DeliveryError> {
        match self {
            SendError::Delivery(err) => Some(err),
            _ => None,
        }
    }
}

/// # A handler failed while processing a message.
///
/// Carries the handler name and the original cause, which stays reachable
/// through [`std::error::Error::source`].
#[derive(Error, Debug)]
#[error("handler '{handler}' failed: {source}")]
pub struct HandlingError {
    handler: Arc<str>,
    #[source]
    source: BoxError,
}

impl HandlingError {
    /// Wraps `cause` as a failure of `handler`.
    pub fn new(handler: impl Into<Arc<str>>, cause: impl Into<BoxError>) -> Self {
        Self {
            handler: handler.into(),
            source: cause.into(),
        }
    }

    /// Name of the handler that failed.
    pub fn handler(&self) -> &str {
        &self.handler
    }

    /// The original cause.
    pub fn cause(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.source.as_ref()
    }

    /// Consumes the error and returns the original cause.
    pub fn into_cause(self) -> BoxError {
        self.source
    }
}

/// # A message could not be delivered because its handler failed.
///
/// Outermost layer of the failure chain returned to the sender:
///
/// ```text
/// DeliveryError (channel) ─► HandlingError (handler) ─► original cause
/// ```
///
/// # Example
/// ```
/// use fluxgate::{DeliveryError, HandlingError};
///
/// let err = DeliveryError::new("orders", HandlingError::new("billing", "card declined"));
/// assert_eq!(err.chain().count(), 3);
/// assert!(err.to_string().contains("card declined"));
/// ```
#[derive(Error, Debug)]
#[error("failed to deliver message to channel '{channel}': {source}")]
pub struct DeliveryError {
    channel: Arc<str>,
    #[source]
    source: HandlingError,
}

impl DeliveryError {
    /// Wraps a handling failure observed on `channel`.
    pub fn new(channel: impl Into<Arc<str>>, source: HandlingError) -> Self {
        Self {
            channel: channel.into(),
            source,
        }
    }

    /// Name of the channel the message was sent to.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// The handling failure this delivery failure wraps.
    pub fn handling(&self) -> &HandlingError {
        &self.source
    }

    /// Iterates over the cause chain, outermost first (starting with `self`).
    pub fn chain(&self) -> impl Iterator<Item = &(dyn StdError + 'static)> {
        std::iter::successors(Some(self as &(dyn StdError + 'static)), |&err| err.source())
    }

    /// The innermost error of the chain.
    pub fn root_cause(&self) -> &(dyn StdError + 'static) {
        self.chain().last().unwrap_or(self)
    }
}

/// # A handler panicked while processing a message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("handler panicked: {info}")]
pub struct HandlerPanic {
    /// Panic payload rendered as text.
    pub info: String,
}

impl HandlerPanic {
    /// Builds the error from a payload caught by `catch_unwind`.
    pub(crate) fn from_payload(payload: &(dyn Any + Send)) -> Self {
        let info = if let Some(msg) = payload.downcast_ref::<&'static str>() {
            (*msg).to_string()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.clone()
        } else {
            "unknown panic".to_string()
        };
        Self { info }
    }
}

/// # Errors returned by `subscribe`.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscribeError {
    /// The channel already has an active subscriber.
    #[error("channel '{channel}' already has an active subscriber")]
    DoubleSubscription {
        /// Name of the channel.
        channel: Arc<str>,
    },

    /// The channel was completed.
    #[error("channel '{channel}' is closed")]
    Closed {
        /// Name of the channel.
        channel: Arc<str>,
    },
}

impl SubscribeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SubscribeError::DoubleSubscription { .. } => "subscribe_double_subscription",
            SubscribeError::Closed { .. } => "subscribe_closed",
        }
    }
}

/// # Errors raised while routing a handler's result.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplyError {
    /// Neither an output channel nor a reply channel is available.
    #[error("handler '{handler}' has no output channel and the message carries no reply channel")]
    NoDestination {
        /// Name of the handler.
        handler: Arc<str>,
    },

    /// The reply channel does not accept the handler's result type.
    #[error("reply channel '{channel}' does not accept results of handler '{handler}'")]
    Unresolvable {
        /// Name of the handler.
        handler: Arc<str>,
        /// Name of the reply channel.
        channel: Arc<str>,
    },
}

impl ReplyError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ReplyError::NoDestination { .. } => "reply_no_destination",
            ReplyError::Unresolvable { .. } => "reply_unresolvable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Error, Debug)]
    #[error("intentional")]
    struct Intentional;

    #[test]
    fn test_delivery_chain_preserves_three_layers() {
        let err = DeliveryError::new("input", HandlingError::new("activator", Intentional));

        let chain: Vec<_> = err.chain().collect();
        assert_eq!(chain.len(), 3);
        assert!(chain[0].downcast_ref::<DeliveryError>().is_some());
        assert!(chain[1].downcast_ref::<HandlingError>().is_some());
        assert!(chain[2].downcast_ref::<Intentional>().is_some());
        assert!(err.root_cause().downcast_ref::<Intentional>().is_some());
    }

    #[test]
    fn test_delivery_message_contains_cause() {
        let err = DeliveryError::new("input", HandlingError::new("activator", Intentional));
        let msg = err.to_string();
        assert!(msg.contains("input"));
        assert!(msg.contains("activator"));
        assert!(msg.contains("intentional"));
    }

    #[test]
    fn test_send_error_transparent_delivery() {
        let err: SendError =
            DeliveryError::new("input", HandlingError::new("activator", Intentional)).into();
        assert_eq!(err.as_label(), "send_delivery_failed");
        assert!(err.to_string().contains("intentional"));
        assert_eq!(err.as_delivery().map(DeliveryError::channel), Some("input"));
    }

    #[test]
    fn test_handling_error_accessors() {
        let err = HandlingError::new("h", "boom");
        assert_eq!(err.handler(), "h");
        assert_eq!(err.cause().to_string(), "boom");
        assert_eq!(err.into_cause().to_string(), "boom");
    }

    #[test]
    fn test_panic_payloads() {
        let s: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(HandlerPanic::from_payload(s.as_ref()).info, "static");

        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(HandlerPanic::from_payload(owned.as_ref()).info, "owned");

        let other: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(HandlerPanic::from_payload(other.as_ref()).info, "unknown panic");
    }

    #[test]
    fn test_labels() {
        let ch: Arc<str> = "c".into();
        assert_eq!(
            SubscribeError::DoubleSubscription { channel: ch.clone() }.as_label(),
            "subscribe_double_subscription"
        );
        assert_eq!(SubscribeError::Closed { channel: ch.clone() }.as_label(), "subscribe_closed");
        assert_eq!(
            SendError::Timeout { channel: ch.clone(), timeout: Duration::from_millis(5) }.as_label(),
            "send_timeout"
        );
        assert_eq!(SendError::Closed { channel: ch }.as_label(), "send_closed");
        assert_eq!(
            ReplyError::NoDestination { handler: "h".into() }.as_label(),
            "reply_no_destination"
        );
    }
}
