use super::*;

// ── FrameGrouper ──────────────────────────────────────────────────────────────

/// First stage of the frame pipeline: bins events into fixed-length frames
/// keyed by a grouping function and emits one partial aggregate per
/// populated `(frame, key)` pair when a frame is evicted.
///
/// # Processing model
///
/// State is a ring of `frames_per_window` slots, each a key-to-accumulator
/// map. An event lands in the slot of its frame; an event whose frame
/// advances past the highest frame observed so far slides the ring forward,
/// evicting (and emitting) every frame that falls out of it. A watermark
/// evicts every frame it fully covers and is then forwarded downstream.
///
/// Events too old for the ring, or behind a forwarded watermark, are dropped
/// silently and counted in [`late_events`](Self::late_events).
pub struct FrameGrouper<T, K, A, R, TS, KF>
where
    TS: Fn(&T) -> EventTime + Send,
    KF: Fn(&T) -> K + Send,
    K: Eq + Hash,
{
    wdef: WindowDefinition,
    extract_timestamp: TS,
    extract_key: KF,
    aggregation: Aggregation<T, A, R>,
    /// Ring of per-frame key-to-accumulator maps, indexed by
    /// `frame_seq mod frames_per_window`.
    slots: Vec<KeyMap<K, A>>,
    /// Highest frame observed so far.
    current_frame_seq: EventTime,
    /// Lowest frame still accepted; rises as watermarks pass.
    frame_seq_base: EventTime,
    initialized: bool,
    late_events: u64,
    pending: VecDeque<StreamElement<Frame<K, A>>>,
    outbox: Option<Outbox<Frame<K, A>>>,
}

impl<T, K, A, R, TS, KF> FrameGrouper<T, K, A, R, TS, KF>
where
    TS: Fn(&T) -> EventTime + Send,
    KF: Fn(&T) -> K + Send,
    K: Eq + Hash,
{
    /// Create a grouper that bins events by `extract_key` within each frame
    /// of `wdef`.
    pub fn new(
        wdef: WindowDefinition,
        extract_timestamp: TS,
        extract_key: KF,
        aggregation: Aggregation<T, A, R>,
    ) -> Self {
        let slot_count = wdef.frames_per_window() as usize;
        Self {
            wdef,
            extract_timestamp,
            extract_key,
            aggregation,
            slots: (0..slot_count).map(|_| KeyMap::default()).collect(),
            current_frame_seq: EVENT_TIME_MIN,
            frame_seq_base: EVENT_TIME_MIN,
            initialized: false,
            late_events: 0,
            pending: VecDeque::new(),
            outbox: None,
        }
    }

    /// Number of events dropped because their frame was already evicted.
    pub fn late_events(&self) -> u64 {
        self.late_events
    }

    /// Total number of buffered `(frame, key)` accumulators.
    pub fn buffered_entry_count(&self) -> usize {
        self.slots.iter().map(|slot| slot.len()).sum()
    }

    fn slot_index(&self, frame_seq: EventTime) -> usize {
        let frame = (frame_seq - self.wdef.frame_offset()) / self.wdef.frame_length();
        frame.rem_euclid(self.wdef.frames_per_window()) as usize
    }

    /// Move one slot's contents into the pending queue, labelled with `seq`.
    /// Emission order within a slot is unspecified.
    fn evict_slot(&mut self, seq: EventTime) {
        let idx = self.slot_index(seq);
        let slot = std::mem::take(&mut self.slots[idx]);
        for (key, acc) in slot {
            self.pending
                .push_back(StreamElement::Record(Frame::new(seq, key, acc)));
        }
    }

    /// Evict every frame in `[evict_from, evict_until)`, ascending by seq.
    fn evict_range(&mut self, evict_from: EventTime, evict_until: EventTime) {
        let mut seq = evict_from;
        while seq < evict_until {
            self.evict_slot(seq);
            seq += self.wdef.frame_length();
        }
    }

    /// Slide the ring forward so `frame_seq` becomes the highest frame,
    /// evicting everything that falls out of it.
    fn advance_to(&mut self, frame_seq: EventTime) {
        let fl = self.wdef.frame_length();
        let span = self.wdef.window_length();
        let evict_from = self.frame_seq_base.max(self.current_frame_seq - span + fl);
        // Slots above the current frame are empty; no need to walk them.
        let evict_until = (frame_seq - span + fl).min(self.current_frame_seq + fl);
        self.evict_range(evict_from, evict_until);
        self.current_frame_seq = frame_seq;
    }

    /// Evict every frame fully covered by a watermark at `cut` and refuse
    /// older events from now on.
    fn evict_below(&mut self, cut: EventTime) {
        let fl = self.wdef.frame_length();
        let span = self.wdef.window_length();
        let evict_from = self.frame_seq_base.max(self.current_frame_seq - span + fl);
        let evict_until = cut.min(self.current_frame_seq + fl);
        self.evict_range(evict_from, evict_until);
        self.frame_seq_base = self.frame_seq_base.max(cut);
        self.current_frame_seq = self.current_frame_seq.max(cut - fl);
    }

    fn ingest(&mut self, item: T) {
        let timestamp = (self.extract_timestamp)(&item);
        let frame_seq = self.wdef.floor_frame_seq(timestamp);
        if !self.initialized {
            self.initialized = true;
            self.current_frame_seq = frame_seq;
            self.frame_seq_base = frame_seq;
        }
        if frame_seq < self.frame_seq_base
            || frame_seq <= self.current_frame_seq - self.wdef.window_length()
        {
            self.late_events += 1;
            log::debug!(
                "dropping late event: frame {frame_seq} behind frame {}",
                self.current_frame_seq
            );
            return;
        }
        if frame_seq > self.current_frame_seq {
            self.advance_to(frame_seq);
        }

        let key = (self.extract_key)(&item);
        let idx = self.slot_index(frame_seq);
        let slot = &mut self.slots[idx];
        match slot.get_mut(&key) {
            Some(acc) => self.aggregation.accumulate(acc, &item),
            None => {
                let mut acc = self.aggregation.create();
                self.aggregation.accumulate(&mut acc, &item);
                slot.insert(key, acc);
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
            .context("frame grouper used before init")?;
        Ok(outbox.drain(&mut self.pending))
    }
}

impl<T, A, R, TS> FrameGrouper<T, (), A, R, TS, fn(&T)>
where
    TS: Fn(&T) -> EventTime + Send,
{
    /// Create a grouper without a grouping function: all events share the
    /// singleton key.
    pub fn unkeyed(
        wdef: WindowDefinition,
        extract_timestamp: TS,
        aggregation: Aggregation<T, A, R>,
    ) -> Self {
        fn unit_key<T>(_: &T) {}
        Self::new(wdef, extract_timestamp, unit_key::<T>, aggregation)
    }
}

impl<T, K, A, R, TS, KF> Operator<T> for FrameGrouper<T, K, A, R, TS, KF>
where
    T: Send + 'static,
    K: StreamData + Eq + Hash,
    A: StreamData,
    TS: Fn(&T) -> EventTime + Send,
    KF: Fn(&T) -> K + Send,
{
    type Out = Frame<K, A>;

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
                        self.ingest(item);
                        if !self.drain()? {
                            return Ok(false);
                        }
                    }
                }
                // A watermark at the head is routed through process_watermark
                // by the host; anything else means the inbox is exhausted.
                _ => return Ok(true),
            }
        }
    }

    fn process_watermark(&mut self, watermark: Watermark) -> Result<bool> {
        let cut = self.wdef.floor_frame_seq(watermark.timestamp);
        if self.initialized {
            self.evict_below(cut);
        } else {
            self.initialized = true;
            self.frame_seq_base = cut;
            self.current_frame_seq = cut - self.wdef.frame_length();
        }
        if !self.drain()? {
            return Ok(false);
        }
        let outbox = self
            .outbox
            .as_ref()
            .context("frame grouper used before init")?;
        Ok(outbox.offer(StreamElement::Watermark(watermark)))
    }

    fn complete(&mut self) -> Result<bool> {
        if self.initialized {
            let fl = self.wdef.frame_length();
            let span = self.wdef.window_length();
            let evict_from = self.frame_seq_base.max(self.current_frame_seq - span + fl);
            let evict_until = self.current_frame_seq + fl;
            self.evict_range(evict_from, evict_until);
            self.frame_seq_base = self.frame_seq_base.max(evict_until);
        }
        self.drain()
    }
}
