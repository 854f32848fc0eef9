//! Bounded conversation history.
//!
//! [`History`] keeps the most recent `max_size` messages in a `VecDeque`
//! behind a `tokio::sync::RwLock`. Appending past the bound evicts the oldest
//! message, so the length is always `min(total_appends, max_size)`.

use std::collections::VecDeque;

use tokio::sync::RwLock;

use crate::message::Message;

/// Default number of messages retained by [`History::default`].
pub const DEFAULT_HISTORY_SIZE: usize = 100;

/// Bounded FIFO of conversation messages, safe to share between tasks.
///
/// Readers may inspect the history concurrently with an in-flight turn;
/// writes take the lock exclusively.
#[derive(Debug)]
pub struct History {
    max_size: usize,
    messages: RwLock<VecDeque<Message>>,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}

impl History {
    /// Creates an empty history retaining at most `max_size` messages.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            messages: RwLock::new(VecDeque::with_capacity(max_size.min(DEFAULT_HISTORY_SIZE))),
        }
    }

    /// Maximum number of retained messages.
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    /// Appends one message, evicting the oldest if the bound is reached.
    pub async fn push(&self, message: Message) {
        let mut guard = self.messages.write().await;
        Self::push_bounded(&mut guard, self.max_size, message);
    }

    /// Appends several messages atomically with respect to other writers.
    pub async fn extend(&self, messages: impl IntoIterator<Item = Message>) {
        let mut guard = self.messages.write().await;
        for message in messages {
            Self::push_bounded(&mut guard, self.max_size, message);
        }
    }

    /// Returns a snapshot of the retained messages, oldest first.
    pub async fn messages(&self) -> Vec<Message> {
        self.messages.read().await.iter().cloned().collect()
    }

    /// Returns the `n` most recent messages, oldest first.
    pub async fn last(&self, n: usize) -> Vec<Message> {
        let guard = self.messages.read().await;
        let skip = guard.len().saturating_sub(n);
        guard.iter().skip(skip).cloned().collect()
    }

    /// Number of retained messages.
    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    /// Returns `true` if no messages are retained.
    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }

    /// Removes every message.
    pub async fn clear(&self) {
        self.messages.write().await.clear();
    }

    fn push_bounded(deque: &mut VecDeque<Message>, max_size: usize, message: Message) {
        if max_size == 0 {
            return;
        }
        while deque.len() >= max_size {
            deque.pop_front();
        }
        deque.push_back(message);
    }
}
