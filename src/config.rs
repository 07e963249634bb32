//! # Channel configuration.
//!
//! Provides [`ChannelConfig`], the settings shared by the channels in this crate.
//!
//! ## Sentinel values
//! - `send_timeout = 0s` → `send` waits indefinitely
//! - `queue_capacity = 0` → unbounded queue
//! - `bus_capacity` is clamped to a minimum of 1

use std::time::Duration;

/// Settings for channels and their event bus.
///
/// ## Field semantics
/// - `send_timeout`: default deadline for `send` (`0s` = no deadline)
/// - `queue_capacity`: capacity of a [`QueueChannel`](crate::QueueChannel) (`0` = unbounded)
/// - `bus_capacity`: ring buffer size of an event [`Bus`](crate::Bus)
///
/// All fields are public; prefer the helper accessors over checking sentinels inline.
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    /// Default time a `send` may wait for admission and demand.
    ///
    /// - `Duration::ZERO` = wait until the message is handled or rejected
    /// - `> 0` = `send` fails with `SendError::Timeout` once exceeded
    ///
    /// `send_timeout(message, timeout)` overrides it per call.
    pub send_timeout: Duration,

    /// Maximum number of messages buffered by a queue channel.
    ///
    /// - `0` = unbounded
    /// - `n > 0` = `send` waits while `n` messages are queued
    pub queue_capacity: usize,

    /// Capacity of the event bus broadcast ring buffer.
    ///
    /// Slow event consumers that lag further behind skip older events.
    pub bus_capacity: usize,
}

impl ChannelConfig {
    /// Returns the default send deadline as an `Option`.
    ///
    /// - `None` → wait indefinitely
    /// - `Some(d)` → fail after `d`
    #[inline]
    pub fn send_deadline(&self) -> Option<Duration> {
        if self.send_timeout == Duration::ZERO {
            None
        } else {
            Some(self.send_timeout)
        }
    }

    /// Returns the queue capacity as an `Option`.
    ///
    /// - `None` → unbounded
    /// - `Some(n)` → at most `n` queued messages
    #[inline]
    pub fn queue_limit(&self) -> Option<usize> {
        if self.queue_capacity == 0 {
            None
        } else {
            Some(self.queue_capacity)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for ChannelConfig {
    /// Default configuration:
    ///
    /// - `send_timeout = 0s` (wait indefinitely)
    /// - `queue_capacity = 0` (unbounded)
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            send_timeout: Duration::ZERO,
            queue_capacity: 0,
            bus_capacity: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_unbounded() {
        let cfg = ChannelConfig::default();
        assert_eq!(cfg.send_deadline(), None);
        assert_eq!(cfg.queue_limit(), None);
        assert_eq!(cfg.bus_capacity_clamped(), 1024);
    }

    #[test]
    fn test_sentinels_resolve_to_values() {
        let cfg = ChannelConfig {
            send_timeout: Duration::from_millis(250),
            queue_capacity: 8,
            bus_capacity: 0,
        };
        assert_eq!(cfg.send_deadline(), Some(Duration::from_millis(250)));
        assert_eq!(cfg.queue_limit(), Some(8));
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }
}
