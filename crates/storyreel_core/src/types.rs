use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Sub};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// TimeUs
// ---------------------------------------------------------------------------

/// Signed microseconds. Every position and length on the timeline uses this.
/// Arithmetic saturates at the `i64` bounds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimeUs(pub i64);

impl TimeUs {
    pub const ZERO: Self = Self(0);

    /// Converts seconds, rounding to the nearest microsecond.
    pub fn from_seconds(s: f64) -> Self {
        Self((s * 1_000_000.0).round() as i64)
    }

    pub fn as_seconds(&self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }
}

impl Add for TimeUs {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sub for TimeUs {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl Mul<i64> for TimeUs {
    type Output = Self;
    fn mul(self, rhs: i64) -> Self {
        Self(self.0.saturating_mul(rhs))
    }
}

/// Transport read-out: `mm:ss:cc` (minutes, seconds, centiseconds).
impl fmt::Display for TimeUs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_us = self.0.unsigned_abs();
        let total_cs = total_us / 10_000;
        let cs = total_cs % 100;
        let total_secs = total_cs / 100;
        let secs = total_secs % 60;
        let mins = total_secs / 60;
        if self.0 < 0 {
            write!(f, "-{:02}:{:02}:{:02}", mins, secs, cs)
        } else {
            write!(f, "{:02}:{:02}:{:02}", mins, secs, cs)
        }
    }
}

// ---------------------------------------------------------------------------
// TrackKind
// ---------------------------------------------------------------------------

/// The fixed set of lanes. A clip never changes lane.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    /// Narration lane.
    Subtitle,
}

// ---------------------------------------------------------------------------
// GenerationMode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    #[default]
    Regenerate,
    Extend,
}

// ---------------------------------------------------------------------------
// Clip
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Clip {
    pub id: Uuid,
    pub track: TrackKind,
    pub start_us: TimeUs,
    pub duration_us: TimeUs,
    /// Longest duration reachable by plain trimming.
    pub original_duration_us: TimeUs,
    /// Duration at which extend mode began, if extending.
    #[serde(default)]
    pub extension_start_us: Option<TimeUs>,
    /// Asset URL for video, narration text for subtitles.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub is_generating: bool,
    #[serde(default)]
    pub is_pending_confirmation: bool,
    #[serde(default)]
    pub last_generation_mode: Option<GenerationMode>,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

impl Clip {
    /// A fresh idle clip whose original duration equals its duration.
    pub fn new(track: TrackKind, start_us: TimeUs, duration_us: TimeUs) -> Self {
        Self {
            id: Uuid::new_v4(),
            track,
            start_us,
            duration_us,
            original_duration_us: duration_us,
            extension_start_us: None,
            content: String::new(),
            prompt: None,
            is_generating: false,
            is_pending_confirmation: false,
            last_generation_mode: None,
            thumbnail: None,
        }
    }

    pub fn end_us(&self) -> TimeUs {
        self.start_us + self.duration_us
    }

    pub fn is_extended(&self) -> bool {
        self.extension_start_us.is_some()
    }

    /// Upper bound for trimming: `extension_start + cap` while extending,
    /// otherwise the original duration.
    pub fn effective_cap(&self, settings: &EditorSettings) -> TimeUs {
        match self.extension_start_us {
            Some(ext) => ext + settings.extension_cap_us,
            None => self.original_duration_us,
        }
    }

    /// Clamp a duration proposed by a trim gesture to `[min, effective_cap]`.
    pub fn clamp_trim(&self, proposed: TimeUs, settings: &EditorSettings) -> TimeUs {
        let cap = self.effective_cap(settings).max(settings.min_clip_duration_us);
        proposed.max(settings.min_clip_duration_us).min(cap)
    }

    /// Length shown in the duration field: the extension part while
    /// extending, the whole clip otherwise.
    pub fn extension_amount(&self) -> TimeUs {
        match self.extension_start_us {
            Some(ext) => self.duration_us - ext,
            None => self.duration_us,
        }
    }

    /// Prompt offered for re-editing when the clip is selected again.
    /// Extend prompts describe a continuation, so they are not offered.
    pub fn prefill_prompt(&self) -> Option<&str> {
        match self.last_generation_mode {
            Some(GenerationMode::Extend) => None,
            _ => self.prompt.as_deref(),
        }
    }
}

// ---------------------------------------------------------------------------
// EditorSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EditorSettings {
    pub min_clip_duration_us: TimeUs,
    pub extension_cap_us: TimeUs,
    pub extend_increment_us: TimeUs,
    /// Start times closer than this count as equal when ordering a move.
    pub reorder_epsilon_us: TimeUs,
    pub default_total_duration_us: TimeUs,
    /// Pixels per second.
    pub default_zoom: f64,
    /// Placeholder length for clips created in a gap.
    pub new_clip_duration_us: TimeUs,
    pub playback_tick_us: TimeUs,
    pub generation_delay_us: TimeUs,
    pub narration_us_per_char: TimeUs,
    pub narration_max_duration_us: TimeUs,
}

// ---------------------------------------------------------------------------
// EditorState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EditorState {
    pub current_time_us: TimeUs,
    /// Never shrinks; grows to cover every clip end.
    pub total_duration_us: TimeUs,
    pub is_playing: bool,
    pub zoom: f64,
    pub selected_clip_id: Option<Uuid>,
    pub clips: Vec<Clip>,
}

impl EditorState {
    /// An empty editor sized by the settings.
    pub fn new(settings: &EditorSettings) -> Self {
        Self {
            current_time_us: TimeUs::ZERO,
            total_duration_us: settings.default_total_duration_us,
            is_playing: false,
            zoom: settings.default_zoom,
            selected_clip_id: None,
            clips: vec![],
        }
    }

    pub fn clip(&self, id: Uuid) -> Option<&Clip> {
        self.clips.iter().find(|c| c.id == id)
    }

    pub fn selected_clip(&self) -> Option<&Clip> {
        self.selected_clip_id.and_then(|id| self.clip(id))
    }

    /// Clips of one track, ordered by start time.
    pub fn track_clips(&self, track: TrackKind) -> Vec<&Clip> {
        let mut clips: Vec<&Clip> = self.clips.iter().filter(|c| c.track == track).collect();
        clips.sort_by_key(|c| c.start_us);
        clips
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
