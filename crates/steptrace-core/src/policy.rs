//! Recording policy: which records a step produces.
//!
//! Two mutually exclusive modes:
//!
//! - **All steps**: every step yields a post-step record, and the first
//!   step of each track is preceded by a pre-step record. Classification
//!   only fills in `volume_id`; nothing is filtered.
//! - **Sensitive volumes** (default), evaluated in order:
//!   1. The primary's first step (track 1, step 1) yields a pre-step
//!      record regardless of classification.
//!   2. If the pre-step volume is sensitive and the step deposited
//!      energy, a non-primary track's first step yields a pre-step record,
//!      then the step yields a post-step record carrying the deposit.
//!      Rule 3 is skipped.
//!   3. Otherwise, if the step crosses into a sensitive post-step volume
//!      and deposited energy, a zero-deposit post-step marker is emitted,
//!      attributed to the volume being entered.
//!
//! The engine attributes a step's deposit to the volume the step started
//! in, so rule 3 is what records entry into a sensitive region.

use steptrace_types::{StepNotification, StepPoint, StepPointKind, StepRecord};

use crate::classifier::VolumeClassifier;

/// Which steps are recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecordingMode {
    /// Only steps touching a sensitive volume.
    #[default]
    SensitiveVolumes,
    /// Every step, unfiltered.
    AllSteps,
}

/// Per-step decision logic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordingPolicy {
    mode: RecordingMode,
}

/// The point a record samples and the volume it is attributed to.
struct Sample<'a> {
    kind: StepPointKind,
    point: &'a StepPoint,
    attributed: &'a StepPoint,
    volume_id: i32,
    energy_deposit: f64,
}

fn build(step: &StepNotification, sample: &Sample<'_>) -> StepRecord {
    let step_number = match sample.kind {
        StepPointKind::Pre => step.step_number.saturating_sub(1),
        StepPointKind::Post => step.step_number,
    };
    StepRecord {
        kind: sample.kind,
        event_index: step.event_id,
        run_event_count: step.run_event_count,
        particle_id: step.particle_id,
        track_id: step.track_id,
        parent_id: step.parent_id,
        step_number,
        kinetic_energy: sample.point.kinetic_energy,
        energy_deposit: sample.energy_deposit,
        global_position: sample.point.position,
        local_position: sample.attributed.frame.apply(sample.point.position),
        momentum_direction: sample.point.momentum_direction,
        time: sample.point.global_time,
        volume_id: sample.volume_id,
        replica_index: sample.attributed.replica,
    }
}

/// Pre-step record attributed to the pre-step volume.
fn pre_record(step: &StepNotification, volume_id: i32) -> StepRecord {
    build(
        step,
        &Sample {
            kind: StepPointKind::Pre,
            point: &step.pre,
            attributed: &step.pre,
            volume_id,
            energy_deposit: 0.0,
        },
    )
}

/// Post-step record carrying the step's deposit, attributed to the
/// pre-step volume where the deposit happened.
fn deposit_record(step: &StepNotification, volume_id: i32) -> StepRecord {
    build(
        step,
        &Sample {
            kind: StepPointKind::Post,
            point: &step.post,
            attributed: &step.pre,
            volume_id,
            energy_deposit: step.energy_deposit,
        },
    )
}

/// Zero-deposit post-step marker attributed to the volume being entered.
fn entry_marker(step: &StepNotification, volume_id: i32) -> StepRecord {
    build(
        step,
        &Sample {
            kind: StepPointKind::Post,
            point: &step.post,
            attributed: &step.post,
            volume_id,
            energy_deposit: 0.0,
        },
    )
}

impl RecordingPolicy {
    /// Create a policy in the given mode.
    pub const fn new(mode: RecordingMode) -> Self {
        Self { mode }
    }

    /// Current mode.
    pub const fn mode(&self) -> RecordingMode {
        self.mode
    }

    /// Switch mode.
    pub const fn set_mode(&mut self, mode: RecordingMode) {
        self.mode = mode;
    }

    /// Records produced by one step, in emission order (zero to two).
    pub fn decide(
        &self,
        step: &StepNotification,
        classifier: &mut VolumeClassifier,
    ) -> Vec<StepRecord> {
        match self.mode {
            RecordingMode::AllSteps => Self::record_all(step, classifier),
            RecordingMode::SensitiveVolumes => Self::record_sensitive(step, classifier),
        }
    }

    fn record_all(step: &StepNotification, classifier: &mut VolumeClassifier) -> Vec<StepRecord> {
        let pre_id = classifier.classify_point(&step.pre);
        let mut records = Vec::with_capacity(2);
        if step.is_first_step() {
            records.push(pre_record(step, pre_id));
        }
        records.push(deposit_record(step, pre_id));
        records
    }

    fn record_sensitive(
        step: &StepNotification,
        classifier: &mut VolumeClassifier,
    ) -> Vec<StepRecord> {
        let pre_id = classifier.classify_point(&step.pre);
        let deposited = step.energy_deposit > 0.0;
        let mut records = Vec::new();

        if step.is_primary_first_step() {
            records.push(pre_record(step, pre_id));
        }

        if pre_id != 0 && deposited {
            if step.is_first_step() && !step.is_primary_first_step() {
                records.push(pre_record(step, pre_id));
            }
            records.push(deposit_record(step, pre_id));
            return records;
        }

        if deposited && step.crosses_boundary() {
            let post_id = classifier.classify_point(&step.post);
            if post_id != 0 {
                records.push(entry_marker(step, post_id));
            }
        }
        records
    }
}
