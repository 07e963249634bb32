//! # Function-backed handler (`HandlerFn`)
//!
//! [`HandlerFn`] wraps a closure `F: Fn(Message<T>) -> Fut`, producing a fresh
//! future per message. If shared state is needed, capture an `Arc<...>` explicitly.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use fluxgate::{BoxError, HandlerFn, Message, MessageHandler};
//!
//! let h: Arc<dyn MessageHandler<u32>> = HandlerFn::arc("double", |msg: Message<u32>| async move {
//!     let _ = msg.payload() * 2;
//!     Ok::<_, BoxError>(())
//! });
//!
//! assert_eq!(h.name(), "double");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BoxError;
use crate::handlers::MessageHandler;
use crate::message::Message;

/// Function-backed handler implementation.
#[derive(Debug)]
pub struct HandlerFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> HandlerFn<F> {
    /// Creates a new function-backed handler.
    ///
    /// Prefer [`HandlerFn::arc`] when you immediately need a shared handle.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self { name: name.into(), f }
    }

    /// Creates the handler and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<T, F, Fut> MessageHandler<T> for HandlerFn<F>
where
    T: Send + 'static,
    F: Fn(Message<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    async fn handle_message(&self, message: Message<T>) -> Result<(), BoxError> {
        (self.f)(message).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_closure_invoked_per_message() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let h = HandlerFn::new("count", move |msg: Message<usize>| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(*msg.payload(), Ordering::SeqCst);
                Ok::<_, BoxError>(())
            }
        });

        h.handle_message(Message::new(2)).await.expect("ok");
        h.handle_message(Message::new(3)).await.expect("ok");
        assert_eq!(seen.load(Ordering::SeqCst), 5);
        assert_eq!(MessageHandler::<usize>::name(&h), "count");
    }

    #[tokio::test]
    async fn test_error_is_returned() {
        let h = HandlerFn::new("fail", |_msg: Message<()>| async { Err::<(), BoxError>("nope".into()) });
        let err = h.handle_message(Message::new(())).await.expect_err("should fail");
        assert_eq!(err.to_string(), "nope");
    }
}
