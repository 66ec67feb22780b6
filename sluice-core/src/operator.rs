//! The runtime contract between a windowing operator and the host scheduler.
//!
//! Each operator instance is single-threaded cooperative: the host invokes
//! the methods below on one logical thread per instance and expects each call
//! to make progress and return without blocking on I/O, synchronisation
//! primitives or the outbox. The only permitted suspension point inside a
//! call is a full outbox; the operator keeps enough state that a later retry
//! reproduces the remaining work without re-emitting anything.

use anyhow::Result;

use crate::mailbox::{Inbox, Outbox};
use crate::types::{StreamData, Watermark};

/// Contract implemented by all windowing operators.
///
/// Host call sequence:
///
/// 1. `init` once, before any input.
/// 2. `process_item` whenever data records are at the inbox head. A `false`
///    return signals backpressure; the host retries later with the same
///    inbox.
/// 3. `process_watermark` when the inbox head is a watermark and the
///    preceding record has been consumed. May need several calls under
///    backpressure; the watermark leaves the operator only after `true`.
/// 4. `complete` at end-of-stream: the operator flushes remaining state as
///    if an infinite watermark had been received and returns `true` when
///    everything was emitted.
///
/// All non-watermark emissions triggered by a watermark are pushed to the
/// outbox strictly before the watermark itself.
pub trait Operator<In>: Send {
    /// Output type of this operator.
    type Out: StreamData;

    /// Called once before any input. Hands the operator its outbox.
    fn init(&mut self, outbox: Outbox<Self::Out>) -> Result<()>;

    /// Drain zero or more data records from the inbox.
    ///
    /// Stops in front of a watermark. Returns `true` iff the inbox was
    /// consumed as far as possible for this call (`false` means the outbox
    /// rejected an element and the call must be retried).
    fn process_item(&mut self, ordinal: usize, inbox: &mut Inbox<In>) -> Result<bool>;

    /// Observe a watermark, emitting everything it finalizes followed by
    /// the watermark itself.
    ///
    /// Returns `true` iff fully processed.
    fn process_watermark(&mut self, watermark: Watermark) -> Result<bool>;

    /// Signal end-of-stream. Returns `true` once all remaining state has
    /// been emitted.
    fn complete(&mut self) -> Result<bool>;
}
