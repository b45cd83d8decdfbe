//! Event accumulator: buffers records for the event in flight and detects
//! event boundaries.
//!
//! Event ids come from the engine and are non-decreasing within a run. A
//! change of id closes the previous event; [`EventAccumulator::on_event_boundary`]
//! hands back whatever was buffered for it. At end of run,
//! [`EventAccumulator::take_remaining`] returns the last event exactly once.
//! Empty batches are never returned.

use steptrace_types::StepRecord;

/// Records of one finished event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBatch {
    /// Event the records belong to.
    pub event_id: i32,
    /// Records in emission order.
    pub records: Vec<StepRecord>,
}

/// Buffer for the event currently in flight.
#[derive(Debug, Clone, Default)]
pub struct EventAccumulator {
    current_event: Option<i32>,
    buffered: Vec<StepRecord>,
    events_seen: u64,
    flushes: u64,
    records_flushed: u64,
}

impl EventAccumulator {
    /// An empty accumulator with no current event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Event currently in flight, if any record has been seen.
    pub const fn current_event(&self) -> Option<i32> {
        self.current_event
    }

    /// Records buffered for the current event.
    pub fn buffered(&self) -> &[StepRecord] {
        &self.buffered
    }

    /// Note the event id of an incoming record. When it differs from the
    /// current event, the current event's records are returned and the new
    /// id becomes current.
    pub fn on_event_boundary(&mut self, event_id: i32) -> Option<EventBatch> {
        if self.current_event == Some(event_id) {
            return None;
        }
        let batch = self.take_batch();
        self.current_event = Some(event_id);
        self.events_seen = self.events_seen.saturating_add(1);
        batch
    }

    /// Buffer a record for the current event.
    pub fn append(&mut self, record: StepRecord) {
        self.buffered.push(record);
    }

    /// End of run: return the last event's records, if any. A second call
    /// returns `None`.
    pub fn take_remaining(&mut self) -> Option<EventBatch> {
        self.take_batch()
    }

    /// Distinct events seen.
    pub const fn events_seen(&self) -> u64 {
        self.events_seen
    }

    /// Non-empty batches handed out.
    pub const fn flushes(&self) -> u64 {
        self.flushes
    }

    /// Records handed out across all batches.
    pub const fn records_flushed(&self) -> u64 {
        self.records_flushed
    }

    fn take_batch(&mut self) -> Option<EventBatch> {
        let event_id = self.current_event?;
        if self.buffered.is_empty() {
            return None;
        }
        let records = std::mem::take(&mut self.buffered);
        let count = u64::try_from(records.len()).unwrap_or(u64::MAX);
        self.flushes = self.flushes.saturating_add(1);
        self.records_flushed = self.records_flushed.saturating_add(count);
        Some(EventBatch { event_id, records })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use steptrace_types::{StepPointKind, ThreeVector};

    use super::*;

    fn record(event: i32, step: i32) -> StepRecord {
        StepRecord {
            kind: StepPointKind::Post,
            event_index: event,
            run_event_count: 3,
            particle_id: 22,
            track_id: 1,
            parent_id: 0,
            step_number: step,
            kinetic_energy: 1.0,
            energy_deposit: 0.1,
            global_position: ThreeVector::default(),
            local_position: ThreeVector::default(),
            momentum_direction: ThreeVector::new(0.0, 0.0, 1.0),
            time: 0.0,
            volume_id: 1,
            replica_index: 0,
        }
    }

    /// Drive the accumulator the way the recorder does and collect batches.
    fn frame(events: &[i32]) -> Vec<EventBatch> {
        let mut acc = EventAccumulator::new();
        let mut batches = Vec::new();
        for (step, &event) in (1..).zip(events) {
            batches.extend(acc.on_event_boundary(event));
            acc.append(record(event, step));
        }
        batches.extend(acc.take_remaining());
        batches
    }

    #[test]
    fn flushes_at_each_transition_and_at_end() {
        let batches = frame(&[1, 1, 1, 2, 2, 3]);
        let shape: Vec<(i32, usize)> = batches
            .iter()
            .map(|b| (b.event_id, b.records.len()))
            .collect();
        assert_eq!(shape, vec![(1, 3), (2, 2), (3, 1)]);

        let steps: Vec<i32> = batches
            .iter()
            .flat_map(|b| b.records.iter().map(|r| r.step_number))
            .collect();
        assert_eq!(steps, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn batch_records_share_the_batch_event() {
        for batch in frame(&[0, 0, 5, 5, 5, 9]) {
            assert!(batch.records.iter().all(|r| r.event_index == batch.event_id));
        }
    }

    #[test]
    fn final_flush_happens_once() {
        let mut acc = EventAccumulator::new();
        assert!(acc.on_event_boundary(7).is_none());
        acc.append(record(7, 1));
        assert_eq!(acc.take_remaining().map(|b| b.records.len()), Some(1));
        assert!(acc.take_remaining().is_none());
        assert_eq!(acc.flushes(), 1);
        assert_eq!(acc.records_flushed(), 1);
    }

    #[test]
    fn empty_events_are_not_flushed() {
        let mut acc = EventAccumulator::new();
        assert!(acc.take_remaining().is_none());
        assert!(acc.on_event_boundary(1).is_none());
        // Event 1 produced nothing before event 2 started.
        assert!(acc.on_event_boundary(2).is_none());
        assert_eq!(acc.events_seen(), 2);
        assert_eq!(acc.flushes(), 0);
    }

    #[test]
    fn counters_track_totals() {
        let mut acc = EventAccumulator::new();
        for (step, event) in (1..).zip([1, 1, 2, 3, 3, 3]) {
            let _ = acc.on_event_boundary(event);
            acc.append(record(event, step));
        }
        let _ = acc.take_remaining();
        assert_eq!(acc.events_seen(), 3);
        assert_eq!(acc.flushes(), 3);
        assert_eq!(acc.records_flushed(), 6);
        assert_eq!(acc.current_event(), Some(3));
        assert!(acc.buffered().is_empty());
    }
}
