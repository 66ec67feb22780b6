use serde::{Deserialize, Serialize};

/// Event time in milliseconds since epoch.
pub type EventTime = i64;

/// Minimum possible event time. Used as the initial "no watermark" sentinel.
pub const EVENT_TIME_MIN: EventTime = i64::MIN;

/// Maximum possible event time. Used to represent no upper bound.
pub const EVENT_TIME_MAX: EventTime = i64::MAX;

/// Watermark asserting that no element with a timestamp strictly less than
/// this value will arrive on the stream.
///
/// Watermarks never decrease within a single input stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Watermark {
    pub timestamp: EventTime,
}

impl Watermark {
    /// Create a new watermark at the given timestamp.
    pub fn new(timestamp: EventTime) -> Self {
        Self { timestamp }
    }
}

impl std::fmt::Display for Watermark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Watermark({}ms)", self.timestamp)
    }
}

/// The unit flowing through inboxes, outboxes and channels: either a data
/// record or an in-band watermark.
///
/// End-of-stream is not an element; it is signalled to an operator through
/// [`Operator::complete`](crate::operator::Operator::complete).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StreamElement<T> {
    /// User data record.
    Record(T),
    /// Watermark for event time progress tracking.
    Watermark(Watermark),
}

impl<T> StreamElement<T> {
    /// Create a record element.
    pub fn record(value: T) -> Self {
        Self::Record(value)
    }

    /// Create a watermark element.
    pub fn watermark(timestamp: EventTime) -> Self {
        Self::Watermark(Watermark::new(timestamp))
    }

    /// Return true if this element is a watermark.
    pub fn is_watermark(&self) -> bool {
        matches!(self, Self::Watermark(_))
    }
}

/// Trait bound for types that can flow through the stream.
/// All record, key and accumulator types must satisfy this.
pub trait StreamData: Send + Clone + Serialize + for<'de> Deserialize<'de> + 'static {}

// Blanket implementation: any type satisfying the bounds is StreamData.
impl<T> StreamData for T where T: Send + Clone + Serialize + for<'de> Deserialize<'de> + 'static {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watermark_ordering() {
        assert!(Watermark::new(1_000) < Watermark::new(2_000));
        assert_eq!(Watermark::new(5).to_string(), "Watermark(5ms)");
    }

    #[test]
    fn test_element_constructors() {
        let rec: StreamElement<i32> = StreamElement::record(7);
        assert!(!rec.is_watermark());

        let wm: StreamElement<i32> = StreamElement::watermark(100);
        assert!(wm.is_watermark());
        assert_eq!(wm, StreamElement::Watermark(Watermark::new(100)));
    }
}
