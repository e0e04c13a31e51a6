//! Sequence type definitions
//!
//! A sequence is a declarative workflow: an ordered list of movements, each
//! an ordered list of beats. A beat binds a logical event name to a handler
//! with a timing discipline and an error policy.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Broad grouping for introspection surfaces. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SequenceCategory {
    CanvasOperations,
    DataOperations,
    UiInteractions,
    SystemEvents,
}

impl Default for SequenceCategory {
    fn default() -> Self {
        Self::SystemEvents
    }
}

/// Dynamics marking for a beat. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dynamics {
    Pianissimo,
    Piano,
    MezzoPiano,
    MezzoForte,
    Forte,
    Fortissimo,
}

impl Default for Dynamics {
    fn default() -> Self {
        Self::MezzoForte
    }
}

/// When a beat's handler is invoked relative to the previous beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum BeatTiming {
    /// Invoke within the current cooperative turn.
    Immediate,
    /// Invoke only after the previous beat's handler has settled.
    AfterBeat,
    /// Invoke after a fixed delay from the previous beat's completion.
    Delayed { ms: u64 },
}

impl Default for BeatTiming {
    fn default() -> Self {
        Self::Immediate
    }
}

/// What the executor does when a beat's handler fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    /// Terminate the sequence.
    Stop,
    /// Record the failure and continue with the next beat.
    Continue,
    /// Terminate the sequence, flagged as a controlled abort.
    AbortSequence,
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        Self::Stop
    }
}

/// Atomic scheduled unit: binds a logical event to a handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Beat {
    /// 1-based index within the movement; must equal its position.
    pub beat: u32,
    /// Logical event name. Resolved in the sequence's handler table, or
    /// treated as a pure bus emission when no handler is bound.
    pub event: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dynamics: Dynamics,
    #[serde(default)]
    pub timing: BeatTiming,
    /// Static payload merged under the runtime payload before the handler
    /// is invoked.
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub error_handling: ErrorPolicy,
}

impl Beat {
    /// Create a beat with default timing and error policy.
    pub fn new(beat: u32, event: impl Into<String>) -> Self {
        Self {
            beat,
            event: event.into(),
            title: String::new(),
            description: String::new(),
            dynamics: Dynamics::default(),
            timing: BeatTiming::default(),
            data: Value::Null,
            error_handling: ErrorPolicy::default(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_dynamics(mut self, dynamics: Dynamics) -> Self {
        self.dynamics = dynamics;
        self
    }

    pub fn with_timing(mut self, timing: BeatTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_error_handling(mut self, policy: ErrorPolicy) -> Self {
        self.error_handling = policy;
        self
    }
}

/// Grouping of beats within a sequence. Purely organizational.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Movement {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub beats: Vec<Beat>,
}

impl Movement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            beats: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_beat(mut self, beat: Beat) -> Self {
        self.beats.push(beat);
        self
    }
}

/// Named declarative workflow. Immutable after registration; the name is the
/// registry key and re-registration replaces atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    /// Dotted `<Domain>.<action>-symphony` name, unique per registry.
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub key: String,
    /// Positive beats-per-minute figure. Informational only.
    pub tempo: u32,
    #[serde(default)]
    pub category: SequenceCategory,
    pub movements: Vec<Movement>,
}

impl Sequence {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            key: "C".to_string(),
            tempo: 120,
            category: SequenceCategory::default(),
            movements: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_tempo(mut self, tempo: u32) -> Self {
        self.tempo = tempo;
        self
    }

    pub fn with_category(mut self, category: SequenceCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_movement(mut self, movement: Movement) -> Self {
        self.movements.push(movement);
        self
    }

    /// Total number of beats across all movements.
    pub fn beat_count(&self) -> usize {
        self.movements.iter().map(|m| m.beats.len()).sum()
    }
}
