//! # Sluice Core
//!
//! Windowing core of the Sluice stream processing engine.
//!
//! This crate provides the per-processor operators that group timestamped
//! events into event-time windows, maintain per-key incremental aggregates,
//! and emit finalized window results as watermarks advance:
//!
//! - [`types`] - Core data types: [`StreamElement`](types::StreamElement),
//!   [`Watermark`](types::Watermark), and the [`StreamData`](types::StreamData)
//!   trait bound.
//! - [`aggregate`] - The [`Aggregation`](aggregate::Aggregation) contract
//!   (create / accumulate / combine / optional deduct / finish) plus stock
//!   operations: [`counting`](aggregate::counting),
//!   [`summing_i64`](aggregate::summing_i64),
//!   [`linear_trend`](aggregate::linear_trend), [`zip`](aggregate::zip).
//! - [`mailbox`] - Cooperative plumbing: [`Inbox`](mailbox::Inbox) and the
//!   backpressure-aware [`Outbox`](mailbox::Outbox).
//! - [`operator`] - The [`Operator`](operator::Operator) runtime contract
//!   shared by all windowing operators.
//! - [`window`] - The operators themselves:
//!   [`FrameGrouper`](window::FrameGrouper),
//!   [`SlidingWindowCombiner`](window::SlidingWindowCombiner),
//!   [`SessionWindowOperator`](window::SessionWindowOperator).

pub mod aggregate;
pub mod mailbox;
pub mod operator;
pub mod types;
pub mod window;
