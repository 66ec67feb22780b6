use super::*;

// ── DeadlineIndex ─────────────────────────────────────────────────────────────

/// Expiry index for open sessions: deadline -> serialized keys due then.
///
/// Sorted by deadline in a `BTreeMap`, enabling O(log n) range scans.
/// A `(key, deadline)` pair is registered at most once; re-registering the
/// same pair is idempotent.
#[derive(Debug, Default)]
struct DeadlineIndex {
    at: BTreeMap<EventTime, BTreeSet<Vec<u8>>>,
}

impl DeadlineIndex {
    fn new() -> Self {
        Self {
            at: BTreeMap::new(),
        }
    }

    fn register(&mut self, key_bytes: Vec<u8>, deadline: EventTime) {
        self.at.entry(deadline).or_default().insert(key_bytes);
    }

    /// No-op if the `(key, deadline)` pair was not registered.
    fn unregister(&mut self, key_bytes: &[u8], deadline: EventTime) {
        if let Some(keys) = self.at.get_mut(&deadline) {
            keys.remove(key_bytes);
            if keys.is_empty() {
                self.at.remove(&deadline);
            }
        }
    }

    /// Drain and return all `(key, deadline)` pairs with `deadline <= up_to`,
    /// in ascending deadline order.
    fn drain_due(&mut self, up_to: EventTime) -> Vec<(Vec<u8>, EventTime)> {
        let deadlines: Vec<EventTime> = self.at.range(..=up_to).map(|(&at, _)| at).collect();
        let mut due = Vec::new();
        for deadline in deadlines {
            if let Some(keys) = self.at.remove(&deadline) {
                for key in keys {
                    due.push((key, deadline));
                }
            }
        }
        due
    }

    fn len(&self) -> usize {
        self.at.values().map(BTreeSet::len).sum()
    }
}

// ── SessionWindowOperator ─────────────────────────────────────────────────────

/// One open session: highest event timestamp seen and the running
/// accumulator. Keyed by its start timestamp in the per-key interval map.
#[derive(Debug)]
struct OpenSession<A> {
    end: EventTime,
    acc: A,
}

/// All open sessions of one key, pairwise neither overlapping nor within
/// the session gap of each other (they would have been merged).
#[derive(Debug)]
struct KeySessions<K, A> {
    key: K,
    open: BTreeMap<EventTime, OpenSession<A>>,
}

/// Groups per-key events into variable-length sessions delimited by idle
/// gaps of more than `max_gap` timestamp units, and emits a [`Session`] when
/// a watermark passes a session's deadline.
///
/// # Processing model
///
/// An event at `t` is adjacent to an open session `[start, end]` iff
/// `start - max_gap <= t <= end + max_gap`. An adjacent event extends the
/// session in either direction; an event adjacent to two sessions merges
/// them (this is how an out-of-order event bridging two sessions is
/// handled); anything else opens a new session. A session expires once the
/// watermark reaches `end + max_gap`, which is also the `end` of the emitted
/// [`Session`].
pub struct SessionWindowOperator<T, K, A, R, TS, KF>
where
    TS: Fn(&T) -> EventTime + Send,
    KF: Fn(&T) -> K + Send,
{
    max_gap: i64,
    extract_timestamp: TS,
    extract_key: KF,
    aggregation: Aggregation<T, A, R>,
    /// Serialized key -> open sessions. The original key is kept alongside
    /// for emission.
    sessions: KeyMap<Vec<u8>, KeySessions<K, A>>,
    deadlines: DeadlineIndex,
    last_watermark: EventTime,
    late_events: u64,
    pending: VecDeque<StreamElement<Session<K, R>>>,
    outbox: Option<Outbox<Session<K, R>>>,
}

impl<T, K, A, R, TS, KF> SessionWindowOperator<T, K, A, R, TS, KF>
where
    TS: Fn(&T) -> EventTime + Send,
    KF: Fn(&T) -> K + Send,
    K: StreamData,
{
    /// Create a session operator with the given idle gap.
    ///
    /// Fails when `max_gap < 0`.
    pub fn new(
        max_gap: i64,
        extract_timestamp: TS,
        extract_key: KF,
        aggregation: Aggregation<T, A, R>,
    ) -> Result<Self> {
        if max_gap < 0 {
            bail!("max_gap must be non-negative, got {max_gap}");
        }
        Ok(Self {
            max_gap,
            extract_timestamp,
            extract_key,
            aggregation,
            sessions: KeyMap::default(),
            deadlines: DeadlineIndex::new(),
            last_watermark: EVENT_TIME_MIN,
            late_events: 0,
            pending: VecDeque::new(),
            outbox: None,
        })
    }

    /// Number of events dropped because their session had already expired.
    pub fn late_events(&self) -> u64 {
        self.late_events
    }

    /// Number of currently open sessions across all keys.
    pub fn open_session_count(&self) -> usize {
        self.sessions.values().map(|ks| ks.open.len()).sum()
    }

    /// Number of registered expiry deadlines.
    pub fn pending_deadline_count(&self) -> usize {
        self.deadlines.len()
    }

    fn ingest(&mut self, item: T) -> Result<()> {
        let timestamp = (self.extract_timestamp)(&item);
        let key = (self.extract_key)(&item);
        let key_bytes = bincode::serialize(&key)?;
        let gap = self.max_gap;

        // Locate the open sessions the event is adjacent to: the rightmost
        // session starting at or before the event, and the leftmost one
        // starting after it. Non-overlap means no other session can touch it.
        let (left_start, right_start) = match self.sessions.get(&key_bytes) {
            Some(ks) => {
                let left = ks
                    .open
                    .range(..=timestamp)
                    .next_back()
                    .filter(|(_, open)| open.end.saturating_add(gap) >= timestamp)
                    .map(|(&start, _)| start);
                let right = ks
                    .open
                    .range((Bound::Excluded(timestamp), Bound::Unbounded))
                    .next()
                    .filter(|(&start, _)| start.saturating_sub(gap) <= timestamp)
                    .map(|(&start, _)| start);
                (left, right)
            }
            None => (None, None),
        };

        // An event that touches no open session and whose own session would
        // already be past its deadline cannot produce output ahead of the
        // forwarded watermark.
        if left_start.is_none()
            && right_start.is_none()
            && timestamp.saturating_add(gap) <= self.last_watermark
        {
            self.late_events += 1;
            log::debug!(
                "dropping late event at {timestamp}: watermark already at {}",
                self.last_watermark
            );
            return Ok(());
        }

        let ks = self
            .sessions
            .entry(key_bytes.clone())
            .or_insert_with(|| KeySessions {
                key,
                open: BTreeMap::new(),
            });

        // Fold the event and every adjacent session (none, one, or two when
        // the event bridges a pair) into a single interval.
        let mut start = timestamp;
        let mut end = timestamp;
        let mut acc: Option<A> = None;
        for candidate in [left_start, right_start].into_iter().flatten() {
            if let Some(open) = ks.open.remove(&candidate) {
                self.deadlines
                    .unregister(&key_bytes, open.end.saturating_add(gap));
                start = start.min(candidate);
                end = end.max(open.end);
                acc = Some(match acc {
                    None => open.acc,
                    Some(mut merged) => {
                        self.aggregation.combine(&mut merged, &open.acc);
                        merged
                    }
                });
            }
        }

        let mut acc = acc.unwrap_or_else(|| self.aggregation.create());
        self.aggregation.accumulate(&mut acc, &item);
        ks.open.insert(start, OpenSession { end, acc });
        self.deadlines.register(key_bytes, end.saturating_add(gap));
        Ok(())
    }

    /// Close and queue every session whose deadline is at or below `up_to`,
    /// in ascending deadline order.
    fn expire_due(&mut self, up_to: EventTime) {
        let gap = self.max_gap;
        for (key_bytes, deadline) in self.deadlines.drain_due(up_to) {
            let mut closed = None;
            let mut drop_key = false;
            if let Some(ks) = self.sessions.get_mut(&key_bytes) {
                let start = ks
                    .open
                    .iter()
                    .find(|(_, open)| open.end.saturating_add(gap) == deadline)
                    .map(|(&start, _)| start);
                if let Some(start) = start {
                    if let Some(open) = ks.open.remove(&start) {
                        closed = Some(Session::new(
                            ks.key.clone(),
                            start,
                            open.end.saturating_add(gap),
                            self.aggregation.finish(&open.acc),
                        ));
                    }
                }
                drop_key = ks.open.is_empty();
            }
            // No empty per-key maps at rest.
            if drop_key {
                self.sessions.remove(&key_bytes);
            }
            if let Some(session) = closed {
                self.pending.push_back(StreamElement::Record(session));
            }
        }
    }

    fn drain(&mut self) -> Result<bool> {
        if self.pending.is_empty() {
            return Ok(true);
        }
        let outbox = self
            .outbox
            .as_ref()
            .context("session operator used before init")?;
        Ok(outbox.drain(&mut self.pending))
    }
}

impl<T, A, R, TS> SessionWindowOperator<T, (), A, R, TS, fn(&T)>
where
    TS: Fn(&T) -> EventTime + Send,
{
    /// Create a session operator without a grouping function: all events
    /// share the singleton key.
    pub fn unkeyed(
        max_gap: i64,
        extract_timestamp: TS,
        aggregation: Aggregation<T, A, R>,
    ) -> Result<Self> {
        fn unit_key<T>(_: &T) {}
        Self::new(max_gap, extract_timestamp, unit_key::<T>, aggregation)
    }
}

impl<T, K, A, R, TS, KF> Operator<T> for SessionWindowOperator<T, K, A, R, TS, KF>
where
    T: Send + 'static,
    K: StreamData + Eq + Hash,
    A: Send + 'static,
    R: StreamData,
    TS: Fn(&T) -> EventTime + Send,
    KF: Fn(&T) -> K + Send,
{
    type Out = Session<K, R>;

    fn init(&mut self, outbox: Outbox<Self::Out>) -> Result<()> {
        self.outbox = Some(outbox);
        Ok(())
    }

    fn process_item(&mut self, _ordinal: usize, inbox: &mut Inbox<T>) -> Result<bool> {
        if !self.drain()? {
            return Ok(false);
        }
        loop {
            match inbox.peek() {
                Some(StreamElement::Record(_)) => {
                    if let Some(StreamElement::Record(item)) = inbox.poll() {
                        self.ingest(item)?;
                    }
                }
                _ => return Ok(true),
            }
        }
    }

    fn process_watermark(&mut self, watermark: Watermark) -> Result<bool> {
        self.last_watermark = self.last_watermark.max(watermark.timestamp);
        self.expire_due(watermark.timestamp);
        if !self.drain()? {
            return Ok(false);
        }
        let outbox = self
            .outbox
            .as_ref()
            .context("session operator used before init")?;
        Ok(outbox.offer(StreamElement::Watermark(watermark)))
    }

    fn complete(&mut self) -> Result<bool> {
        self.expire_due(EVENT_TIME_MAX);
        self.drain()
    }
}
