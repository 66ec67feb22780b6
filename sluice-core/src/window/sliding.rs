use super::*;

// ── SlidingWindowCombiner ─────────────────────────────────────────────────────

/// Second stage of the frame pipeline: combines per-frame partial aggregates
/// into overlapping windows of `frames_per_window` frames and emits one
/// finalized [`Frame`] per `(window end, key)` pair as watermarks advance.
///
/// # Window maintenance strategies
///
/// When the aggregation provides `deduct`, a materialised window is kept and
/// patched as it slides: the entering frame is combined in, the leaving frame
/// is deducted out, and a key whose accumulator returns to the identity is
/// dropped. Without `deduct` every emitted window is recomputed by combining
/// all covered frames. Both strategies produce identical output.
///
/// # Emission order
///
/// Windows are emitted in ascending end order; key order within one window
/// end is unspecified. The triggering watermark is emitted after all of its
/// windows.
pub struct SlidingWindowCombiner<T, K, A, R>
where
    K: Eq + Hash,
{
    wdef: WindowDefinition,
    aggregation: Aggregation<T, A, R>,
    deduct: Option<Arc<dyn Fn(&mut A, &A) + Send + Sync>>,
    /// Identity accumulator used to detect keys that dropped out of the
    /// materialised window.
    empty_acc: A,
    /// Incoming partial frames: seq -> key -> accumulator, ascending by seq.
    frames: BTreeMap<EventTime, KeyMap<K, A>>,
    /// The materialised window at the last emitted end. Deduct mode only.
    sliding: KeyMap<K, A>,
    /// Next window end to emit. `None` until the first watermark.
    next_seq_to_emit: Option<EventTime>,
    late_frames: u64,
    pending: VecDeque<StreamElement<Frame<K, R>>>,
    outbox: Option<Outbox<Frame<K, R>>>,
}

impl<T, K, A, R> SlidingWindowCombiner<T, K, A, R>
where
    K: Clone + Eq + Hash,
    A: PartialEq,
{
    /// Create a combiner over windows of `wdef`, using the combine, deduct
    /// and finish operations of `aggregation`.
    pub fn new(wdef: WindowDefinition, aggregation: Aggregation<T, A, R>) -> Self {
        let deduct = aggregation.deduct_fn();
        let empty_acc = aggregation.create();
        Self {
            wdef,
            aggregation,
            deduct,
            empty_acc,
            frames: BTreeMap::new(),
            sliding: KeyMap::default(),
            next_seq_to_emit: None,
            late_frames: 0,
            pending: VecDeque::new(),
            outbox: None,
        }
    }

    /// Number of input frames dropped because every window covering them
    /// had already been emitted.
    pub fn late_frames(&self) -> u64 {
        self.late_frames
    }

    /// Total number of buffered `(frame, key)` accumulators.
    pub fn buffered_frame_count(&self) -> usize {
        self.frames.values().map(|slot| slot.len()).sum()
    }

    /// Number of keys in the materialised window (always zero in recompute
    /// mode).
    pub fn live_key_count(&self) -> usize {
        self.sliding.len()
    }

    fn ingest(&mut self, frame: Frame<K, A>) {
        let Frame { seq, key, value } = frame;
        if let Some(next) = self.next_seq_to_emit {
            // A frame enters the window ending at seq + frame_length. If that
            // end was already emitted the frame can no longer contribute.
            if seq + self.wdef.frame_length() < next {
                self.late_frames += 1;
                log::debug!("dropping late frame {seq}: next window end is {next}");
                return;
            }
        }
        let slot = self.frames.entry(seq).or_default();
        match slot.get_mut(&key) {
            Some(acc) => self.aggregation.combine(acc, &value),
            None => {
                slot.insert(key, value);
            }
        }
    }

    /// Slide the window forward to `end_seq` and queue one output frame per
    /// key it contains.
    fn roll_window_to(&mut self, end_seq: EventTime) {
        let fl = self.wdef.frame_length();
        let span = self.wdef.window_length();
        let leaving = self.frames.remove(&(end_seq - fl - span));

        if let Some(deduct) = &self.deduct {
            if let Some(entering) = self.frames.get(&(end_seq - fl)) {
                for (key, value) in entering {
                    match self.sliding.get_mut(key) {
                        Some(acc) => self.aggregation.combine(acc, value),
                        None => {
                            let mut acc = self.aggregation.create();
                            self.aggregation.combine(&mut acc, value);
                            self.sliding.insert(key.clone(), acc);
                        }
                    }
                }
            }
            if let Some(leaving) = leaving {
                for (key, value) in &leaving {
                    if let Some(acc) = self.sliding.get_mut(key) {
                        deduct(acc, value);
                        // Back at the identity: the key left the window.
                        if *acc == self.empty_acc {
                            self.sliding.remove(key);
                        }
                    }
                }
            }
            for (key, acc) in &self.sliding {
                self.pending.push_back(StreamElement::Record(Frame::new(
                    end_seq,
                    key.clone(),
                    self.aggregation.finish(acc),
                )));
            }
        } else {
            let mut window: KeyMap<K, A> = KeyMap::default();
            for (_, slot) in self.frames.range(end_seq - span..end_seq) {
                for (key, value) in slot {
                    match window.get_mut(key) {
                        Some(acc) => self.aggregation.combine(acc, value),
                        None => {
                            let mut acc = self.aggregation.create();
                            self.aggregation.combine(&mut acc, value);
                            window.insert(key.clone(), acc);
                        }
                    }
                }
            }
            for (key, acc) in window {
                self.pending.push_back(StreamElement::Record(Frame::new(
                    end_seq,
                    key,
                    self.aggregation.finish(&acc),
                )));
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
            .context("sliding combiner used before init")?;
        Ok(outbox.drain(&mut self.pending))
    }
}

impl<T, K, A, R> Operator<Frame<K, A>> for SlidingWindowCombiner<T, K, A, R>
where
    T: Send + 'static,
    K: StreamData + Eq + Hash,
    A: StreamData + PartialEq,
    R: StreamData,
{
    type Out = Frame<K, R>;

    fn init(&mut self, outbox: Outbox<Self::Out>) -> Result<()> {
        self.outbox = Some(outbox);
        Ok(())
    }

    fn process_item(&mut self, _ordinal: usize, inbox: &mut Inbox<Frame<K, A>>) -> Result<bool> {
        if !self.drain()? {
            return Ok(false);
        }
        loop {
            match inbox.peek() {
                Some(StreamElement::Record(_)) => {
                    if let Some(StreamElement::Record(frame)) = inbox.poll() {
                        self.ingest(frame);
                    }
                }
                _ => return Ok(true),
            }
        }
    }

    fn process_watermark(&mut self, watermark: Watermark) -> Result<bool> {
        if !self.drain()? {
            return Ok(false);
        }
        if self.next_seq_to_emit.is_none() {
            // Start from the oldest stored frame so the first emitted window
            // covers at most one frame, the base case the deduct strategy
            // needs. Frames older than the first watermark are folded into
            // the earliest emitted windows.
            let cut = self.wdef.floor_frame_seq(watermark.timestamp);
            let first = self.frames.keys().next().copied();
            self.next_seq_to_emit = Some(first.map_or(cut, |f| f.min(cut)));
        }
        let end_exclusive = self.wdef.higher_frame_seq(watermark.timestamp);
        while let Some(next) = self.next_seq_to_emit {
            if next >= end_exclusive {
                break;
            }
            self.roll_window_to(next);
            self.next_seq_to_emit = Some(next + self.wdef.frame_length());
            if !self.drain()? {
                return Ok(false);
            }
        }
        let outbox = self
            .outbox
            .as_ref()
            .context("sliding combiner used before init")?;
        Ok(outbox.offer(StreamElement::Watermark(watermark)))
    }

    fn complete(&mut self) -> Result<bool> {
        if !self.drain()? {
            return Ok(false);
        }
        let mut next = match self.next_seq_to_emit {
            Some(next) => next,
            None => match self.frames.keys().next() {
                Some(&first) => first,
                None => return Ok(true),
            },
        };
        while !self.frames.is_empty() {
            self.roll_window_to(next);
            next += self.wdef.frame_length();
            self.next_seq_to_emit = Some(next);
            if !self.drain()? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
