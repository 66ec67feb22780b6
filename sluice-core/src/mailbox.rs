//! Inbox and outbox plumbing for cooperative operators.
//!
//! The outbox is built on a bounded crossbeam channel: `offer` never blocks
//! and returns `false` when the channel is full, which is how backpressure
//! reaches an operator. A rejected element must be retried by the operator
//! on its next invocation.

use std::collections::VecDeque;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::types::{StreamElement, Watermark};

/// Default outbox capacity (bounded for backpressure).
const DEFAULT_OUTBOX_CAPACITY: usize = 1024;

// ── Inbox ─────────────────────────────────────────────────────────────────────

/// FIFO of stream elements handed to an operator by the host scheduler.
///
/// A watermark that is the only item in the inbox is hidden from
/// [`peek`](Self::peek) and [`poll`](Self::poll): the host may still coalesce
/// it with a following watermark before the operator observes it. The host
/// removes watermarks with [`take_watermark`](Self::take_watermark) and routes
/// them to `process_watermark`.
#[derive(Debug)]
pub struct Inbox<T> {
    items: VecDeque<StreamElement<T>>,
}

impl<T> Default for Inbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Inbox<T> {
    /// Create an empty inbox.
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    /// Append an element at the tail.
    pub fn push(&mut self, element: StreamElement<T>) {
        self.items.push_back(element);
    }

    /// Append a data record at the tail.
    pub fn push_record(&mut self, value: T) {
        self.items.push_back(StreamElement::Record(value));
    }

    /// Look at the head element without removing it.
    ///
    /// Returns `None` when the inbox is empty or when the sole remaining
    /// item is a watermark.
    pub fn peek(&self) -> Option<&StreamElement<T>> {
        match self.items.front() {
            Some(head) if self.items.len() == 1 && head.is_watermark() => None,
            other => other,
        }
    }

    /// Remove and return the head element.
    ///
    /// Follows the same hiding convention as [`peek`](Self::peek).
    pub fn poll(&mut self) -> Option<StreamElement<T>> {
        if self.peek().is_none() {
            return None;
        }
        self.items.pop_front()
    }

    /// Remove the head element if it is a watermark, hidden or not.
    ///
    /// Host-side operation: the returned watermark is fed to the operator's
    /// `process_watermark`.
    pub fn take_watermark(&mut self) -> Option<Watermark> {
        match self.items.front() {
            Some(StreamElement::Watermark(_)) => match self.items.pop_front() {
                Some(StreamElement::Watermark(wm)) => Some(wm),
                _ => None,
            },
            _ => None,
        }
    }

    /// Number of elements in the inbox, hidden watermark included.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Return true if the inbox holds no elements at all.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// ── Outbox ────────────────────────────────────────────────────────────────────

/// Accept-or-reject sink for operator output.
#[derive(Clone)]
pub struct Outbox<T> {
    sender: Sender<StreamElement<T>>,
}

impl<T> Outbox<T> {
    /// Offer an element to the outbox.
    ///
    /// Returns `false` when the outbox is full (or the consumer is gone);
    /// the caller must retry the element on its next invocation.
    pub fn offer(&self, element: StreamElement<T>) -> bool {
        self.sender.try_send(element).is_ok()
    }

    /// Push queued elements from the front of `pending` until the outbox
    /// rejects one or the queue is empty.
    ///
    /// A rejected element is put back at the front, so nothing is emitted
    /// twice. Returns `true` when the queue was fully drained.
    pub fn drain(&self, pending: &mut VecDeque<StreamElement<T>>) -> bool {
        while let Some(element) = pending.pop_front() {
            match self.sender.try_send(element) {
                Ok(()) => {}
                Err(TrySendError::Full(element)) | Err(TrySendError::Disconnected(element)) => {
                    pending.push_front(element);
                    return false;
                }
            }
        }
        true
    }
}

/// Receiving side of an outbox, held by the host (or a test harness).
pub struct OutboxReceiver<T> {
    receiver: Receiver<StreamElement<T>>,
}

impl<T> OutboxReceiver<T> {
    /// Remove and return the next emitted element, if any.
    pub fn poll(&self) -> Option<StreamElement<T>> {
        self.receiver.try_recv().ok()
    }

    /// Remove and return every currently buffered element.
    pub fn drain(&self) -> Vec<StreamElement<T>> {
        let mut out = Vec::new();
        while let Ok(element) = self.receiver.try_recv() {
            out.push(element);
        }
        out
    }
}

/// Create a bounded outbox pair with the given capacity.
pub fn outbox_channel<T>(capacity: usize) -> (Outbox<T>, OutboxReceiver<T>) {
    let (sender, receiver) = bounded(capacity);
    (Outbox { sender }, OutboxReceiver { receiver })
}

/// Create a bounded outbox pair with the default capacity.
pub fn outbox_channel_default<T>() -> (Outbox<T>, OutboxReceiver<T>) {
    outbox_channel(DEFAULT_OUTBOX_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbox_fifo_order() {
        let mut inbox = Inbox::new();
        inbox.push_record(1);
        inbox.push_record(2);

        assert_eq!(inbox.poll(), Some(StreamElement::Record(1)));
        assert_eq!(inbox.poll(), Some(StreamElement::Record(2)));
        assert_eq!(inbox.poll(), None);
    }

    #[test]
    fn test_inbox_hides_lone_watermark() {
        let mut inbox: Inbox<i32> = Inbox::new();
        inbox.push(StreamElement::watermark(1_000));

        // The only item is a watermark: invisible to peek/poll.
        assert!(inbox.peek().is_none());
        assert!(inbox.poll().is_none());
        assert_eq!(inbox.len(), 1);

        // The host can still remove it.
        assert_eq!(inbox.take_watermark(), Some(Watermark::new(1_000)));
        assert!(inbox.is_empty());
    }

    #[test]
    fn test_inbox_watermark_visible_with_trailing_items() {
        let mut inbox = Inbox::new();
        inbox.push(StreamElement::watermark(1_000));
        inbox.push_record(7);

        assert!(matches!(inbox.peek(), Some(StreamElement::Watermark(_))));
    }

    #[test]
    fn test_outbox_backpressure() {
        let (outbox, rx) = outbox_channel::<i32>(2);

        assert!(outbox.offer(StreamElement::record(1)));
        assert!(outbox.offer(StreamElement::record(2)));
        // Full: rejected, not lost on the consumer side.
        assert!(!outbox.offer(StreamElement::record(3)));

        assert_eq!(rx.poll(), Some(StreamElement::Record(1)));
        assert!(outbox.offer(StreamElement::record(3)));
    }

    #[test]
    fn test_outbox_drain_keeps_rejected_element() {
        let (outbox, rx) = outbox_channel::<i32>(1);
        let mut pending: VecDeque<StreamElement<i32>> =
            vec![StreamElement::record(1), StreamElement::record(2)]
                .into_iter()
                .collect();

        assert!(!outbox.drain(&mut pending));
        assert_eq!(pending.len(), 1);
        assert_eq!(rx.poll(), Some(StreamElement::Record(1)));

        // Retry resumes from the rejected element, no duplication.
        assert!(outbox.drain(&mut pending));
        assert_eq!(rx.poll(), Some(StreamElement::Record(2)));
        assert_eq!(rx.poll(), None);
    }
}
