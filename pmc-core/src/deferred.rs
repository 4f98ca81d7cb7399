//! Control messages held back until the radio is at full power.

use core::fmt;

use heapless::{Deque, Vec};

/// Maximum number of messages waiting for full power.
pub const DEFERRED_QUEUE_DEPTH: usize = 8;
/// Largest payload a deferred message may carry.
pub const MAX_MESSAGE_PAYLOAD: usize = 32;

/// Kind of control message sent to the link-management layer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MessageKind {
    PowerSaveConfig,
    KeepAlive,
    HostOffload,
    Custom(u16),
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::PowerSaveConfig => f.write_str("power-save-config"),
            MessageKind::KeepAlive => f.write_str("keep-alive"),
            MessageKind::HostOffload => f.write_str("host-offload"),
            MessageKind::Custom(code) => write!(f, "custom({code})"),
        }
    }
}

/// Message queued while the radio sleeps.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeferredMessage {
    pub kind: MessageKind,
    pub payload: Vec<u8, MAX_MESSAGE_PAYLOAD>,
}

impl DeferredMessage {
    /// Copies `payload` into a new message. Returns `None` when it does not fit.
    #[must_use]
    pub fn new(kind: MessageKind, payload: &[u8]) -> Option<Self> {
        Some(Self {
            kind,
            payload: Vec::from_slice(payload).ok()?,
        })
    }
}

/// Bounded FIFO of deferred messages. Callers provide the locking.
pub struct DeferredQueue {
    messages: Deque<DeferredMessage, DEFERRED_QUEUE_DEPTH>,
}

impl DeferredQueue {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            messages: Deque::new(),
        }
    }

    /// Appends a message, handing it back when the queue is full.
    pub fn push_back(&mut self, message: DeferredMessage) -> Result<(), DeferredMessage> {
        self.messages.push_back(message)
    }

    /// Removes the most recently queued message.
    pub fn pop_back(&mut self) -> Option<DeferredMessage> {
        self.messages.pop_back()
    }

    /// Removes the oldest message.
    pub fn pop_front(&mut self) -> Option<DeferredMessage> {
        self.messages.pop_front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

impl Default for DeferredQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(code: u16) -> DeferredMessage {
        DeferredMessage::new(MessageKind::Custom(code), &code.to_le_bytes()).expect("fits")
    }

    #[test]
    fn oversized_payload_is_refused() {
        assert!(DeferredMessage::new(MessageKind::KeepAlive, &[0; MAX_MESSAGE_PAYLOAD]).is_some());
        assert!(
            DeferredMessage::new(MessageKind::KeepAlive, &[0; MAX_MESSAGE_PAYLOAD + 1]).is_none()
        );
    }

    #[test]
    fn full_queue_returns_message() {
        let mut queue = DeferredQueue::new();
        for code in 0..DEFERRED_QUEUE_DEPTH {
            let code = u16::try_from(code).expect("small index");
            queue.push_back(message(code)).expect("room in queue");
        }

        let rejected = queue.push_back(message(99)).expect_err("queue should be full");
        assert_eq!(rejected.kind, MessageKind::Custom(99));
        assert_eq!(queue.len(), DEFERRED_QUEUE_DEPTH);
    }

    #[test]
    fn pop_back_retracts_latest_entry() {
        let mut queue = DeferredQueue::new();
        queue.push_back(message(1)).expect("room");
        queue.push_back(message(2)).expect("room");

        assert_eq!(queue.pop_back().map(|m| m.kind), Some(MessageKind::Custom(2)));
        assert_eq!(queue.pop_front().map(|m| m.kind), Some(MessageKind::Custom(1)));
        assert!(queue.is_empty());
    }
}
