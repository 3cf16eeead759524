use std::sync::{Arc, Mutex, PoisonError, TryLockError};

/// Knob batches on the panel, each mapped onto one parameter group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParameterFamily {
    Sample,
    SampleSmall,
    Voice,
}

const SAMPLE_LABELS: [&str; 6] = ["START", "END", "GRAIN", "DENSITY", "PITCH", "SPREAD"];
const SAMPLE_DEFAULTS: [f32; 6] = [0.0, 1.0, 0.25, 0.5, 0.5, 0.0];
const SAMPLE_SMALL_LABELS: [&str; 4] = ["ATK", "REL", "JITTER", "STRETCH"];
const SAMPLE_SMALL_DEFAULTS: [f32; 4] = [0.1, 0.3, 0.0, 0.5];
const VOICE_LABELS: [&str; 2] = ["VOLUME", "PAN"];
const VOICE_DEFAULTS: [f32; 2] = [0.8, 0.5];

impl ParameterFamily {
    pub const ALL: [ParameterFamily; 3] = [
        ParameterFamily::Sample,
        ParameterFamily::SampleSmall,
        ParameterFamily::Voice,
    ];

    pub fn labels(self) -> &'static [&'static str] {
        match self {
            ParameterFamily::Sample => &SAMPLE_LABELS,
            ParameterFamily::SampleSmall => &SAMPLE_SMALL_LABELS,
            ParameterFamily::Voice => &VOICE_LABELS,
        }
    }

    pub fn defaults(self) -> &'static [f32] {
        match self {
            ParameterFamily::Sample => &SAMPLE_DEFAULTS,
            ParameterFamily::SampleSmall => &SAMPLE_SMALL_DEFAULTS,
            ParameterFamily::Voice => &VOICE_DEFAULTS,
        }
    }

    pub fn len(self) -> usize {
        self.labels().len()
    }
}

/// Normalized knob values read by the audio thread.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterState {
    sample: Vec<f32>,
    sample_small: Vec<f32>,
    voice: Vec<f32>,
    revision: u64,
}

impl Default for ParameterState {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterState {
    pub fn new() -> Self {
        Self {
            sample: SAMPLE_DEFAULTS.to_vec(),
            sample_small: SAMPLE_SMALL_DEFAULTS.to_vec(),
            voice: VOICE_DEFAULTS.to_vec(),
            revision: 0,
        }
    }

    pub fn values(&self, family: ParameterFamily) -> &[f32] {
        match family {
            ParameterFamily::Sample => &self.sample,
            ParameterFamily::SampleSmall => &self.sample_small,
            ParameterFamily::Voice => &self.voice,
        }
    }

    fn values_mut(&mut self, family: ParameterFamily) -> &mut [f32] {
        match family {
            ParameterFamily::Sample => &mut self.sample,
            ParameterFamily::SampleSmall => &mut self.sample_small,
            ParameterFamily::Voice => &mut self.voice,
        }
    }

    pub fn get(&self, family: ParameterFamily, index: usize) -> Option<f32> {
        self.values(family).get(index).copied()
    }

    /// Stores `value` clamped to `[0, 1]`; returns whether anything changed.
    pub fn set(&mut self, family: ParameterFamily, index: usize, value: f32) -> bool {
        let value = value.clamp(0.0, 1.0);
        let Some(slot) = self.values_mut(family).get_mut(index) else {
            return false;
        };
        if *slot == value {
            return false;
        }
        *slot = value;
        self.revision = self.revision.wrapping_add(1);
        true
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn snapshot(&self) -> ParameterSnapshot {
        ParameterSnapshot {
            revision: self.revision,
            volume: self.voice[0],
            pan: self.voice[1],
        }
    }
}

/// What the realtime thread keeps between cycles.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ParameterSnapshot {
    pub revision: u64,
    pub volume: f32,
    pub pan: f32,
}

impl ParameterSnapshot {
    /// Equal-power stereo gains.
    pub fn stereo_gains(&self) -> (f32, f32) {
        let angle = self.pan.clamp(0.0, 1.0) * std::f32::consts::FRAC_PI_2;
        (self.volume * angle.cos(), self.volume * angle.sin())
    }
}

pub type SharedParameters = Arc<Mutex<ParameterState>>;

pub fn shared_parameters() -> SharedParameters {
    Arc::new(Mutex::new(ParameterState::new()))
}

/// UI-side write. Blocks only for as long as the audio thread copies a
/// snapshot.
pub fn write_parameter(parameters: &SharedParameters, family: ParameterFamily, index: usize, value: f32) -> bool {
    parameters
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .set(family, index, value)
}

/// Realtime-side read. Returns `None` instead of waiting when the UI holds
/// the lock.
pub fn try_snapshot(parameters: &SharedParameters) -> Option<ParameterSnapshot> {
    match parameters.try_lock() {
        Ok(state) => Some(state.snapshot()),
        Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner().snapshot()),
        Err(TryLockError::WouldBlock) => None,
    }
}
