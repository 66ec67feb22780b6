use super::*;

// ── WindowDefinition ──────────────────────────────────────────────────────────

/// Frame and window geometry shared by the frame grouper and the sliding
/// window combiner.
///
/// Event time is divided into frames of `frame_length` timestamp units,
/// aligned to multiples of `frame_length` shifted by `frame_offset`. A frame
/// is identified by its aligned start timestamp (its *frame sequence*); a
/// window spans `frames_per_window` consecutive frames and is identified by
/// its end boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowDefinition {
    frame_length: i64,
    frames_per_window: i64,
    frame_offset: i64,
}

impl WindowDefinition {
    /// Create a window definition aligned to multiples of `frame_length`.
    ///
    /// Fails when `frame_length <= 0` or `frames_per_window < 1`.
    pub fn new(frame_length: i64, frames_per_window: i64) -> Result<Self> {
        Self::with_offset(frame_length, frames_per_window, 0)
    }

    /// Create a window definition whose alignment grid is shifted by
    /// `frame_offset` timestamp units.
    pub fn with_offset(frame_length: i64, frames_per_window: i64, frame_offset: i64) -> Result<Self> {
        if frame_length <= 0 {
            bail!("frame_length must be positive, got {frame_length}");
        }
        if frames_per_window < 1 {
            bail!("frames_per_window must be at least 1, got {frames_per_window}");
        }
        if frame_offset < 0 || frame_offset >= frame_length {
            bail!("frame_offset must be in [0, frame_length), got {frame_offset}");
        }
        Ok(Self {
            frame_length,
            frames_per_window,
            frame_offset,
        })
    }

    /// Frame width in timestamp units.
    pub fn frame_length(&self) -> i64 {
        self.frame_length
    }

    /// Number of frames that make up one window.
    pub fn frames_per_window(&self) -> i64 {
        self.frames_per_window
    }

    /// Shift of the frame alignment grid.
    pub fn frame_offset(&self) -> i64 {
        self.frame_offset
    }

    /// Window width in timestamp units.
    pub fn window_length(&self) -> i64 {
        self.frame_length * self.frames_per_window
    }

    /// The sequence (aligned start) of the frame covering `timestamp`.
    pub fn floor_frame_seq(&self, timestamp: EventTime) -> EventTime {
        timestamp - (timestamp - self.frame_offset).rem_euclid(self.frame_length)
    }

    /// The first frame boundary strictly greater than `timestamp`.
    pub fn higher_frame_seq(&self, timestamp: EventTime) -> EventTime {
        self.floor_frame_seq(timestamp) + self.frame_length
    }
}

// ── Frame ─────────────────────────────────────────────────────────────────────

/// A per-frame partial aggregate, or a finalized window, crossing operator
/// boundaries.
///
/// The frame grouper emits frames labelled with the frame's aligned start
/// timestamp; the sliding combiner emits finalized windows labelled with the
/// window's end boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame<K, V> {
    pub seq: EventTime,
    pub key: K,
    pub value: V,
}

impl<K, V> Frame<K, V> {
    pub fn new(seq: EventTime, key: K, value: V) -> Self {
        Self { seq, key, value }
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// A closed session window for one key.
///
/// `start` is the timestamp of the earliest event in the session and `end`
/// is the timestamp of the latest event plus the session gap, so
/// `start <= end` always holds and `[start, end)` covers every contributing
/// event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Session<K, R> {
    pub key: K,
    pub start: EventTime,
    pub end: EventTime,
    pub result: R,
}

impl<K, R> Session<K, R> {
    pub fn new(key: K, start: EventTime, end: EventTime, result: R) -> Self {
        Self {
            key,
            start,
            end,
            result,
        }
    }
}

impl<K: std::fmt::Debug, R: std::fmt::Debug> std::fmt::Display for Session<K, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Session({:?}, [{}, {}), {:?})",
            self.key, self.start, self.end, self.result
        )
    }
}
