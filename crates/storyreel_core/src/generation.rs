use crate::collision;
use crate::error::{CoreError, Result};
use crate::store::{ClipChanges, Command, Store};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Requests and outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

/// What the generation backend is asked to produce.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationRequest {
    pub request_id: RequestId,
    pub clip_id: Uuid,
    pub track: TrackKind,
    pub mode: GenerationMode,
    pub prompt: String,
    pub start_us: TimeUs,
    pub duration_us: TimeUs,
}

/// What the backend delivers. Narration results carry a fresh duration;
/// video results keep the requested geometry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationOutcome {
    pub content: String,
    #[serde(default)]
    pub duration_us: Option<TimeUs>,
}

// ---------------------------------------------------------------------------
// GenerationPhase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum GenerationPhase {
    Idle,
    Generating,
    PendingConfirmation,
}

impl GenerationPhase {
    pub fn of(clip: &Clip) -> Self {
        if clip.is_generating {
            GenerationPhase::Generating
        } else if clip.is_pending_confirmation {
            GenerationPhase::PendingConfirmation
        } else {
            GenerationPhase::Idle
        }
    }
}

// ---------------------------------------------------------------------------
// PendingTransaction
// ---------------------------------------------------------------------------

/// Clips of one track as they were before a speculative edit.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTransaction {
    pub clip_id: Uuid,
    pub track: TrackKind,
    pub snapshot: Vec<Clip>,
}

impl PendingTransaction {
    fn capture(state: &EditorState, clip_id: Uuid, track: TrackKind) -> Self {
        Self {
            clip_id,
            track,
            snapshot: state.clips.iter().filter(|c| c.track == track).cloned().collect(),
        }
    }

    /// The current clip set with the speculative edit undone.
    ///
    /// The edited clip comes back exactly as captured. Other clips of the
    /// track only get their captured start back, since the preview moved
    /// nothing else about them; content, flags and prompts they picked up
    /// meanwhile stay. Clips deleted since the capture stay deleted and
    /// clips added since are kept as they are.
    fn restored(self, current: &[Clip]) -> Vec<Clip> {
        current
            .iter()
            .map(|clip| match self.snapshot.iter().find(|prior| prior.id == clip.id) {
                Some(prior) if prior.id == self.clip_id => prior.clone(),
                Some(prior) => Clip {
                    start_us: prior.start_us,
                    ..clip.clone()
                },
                None => clip.clone(),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// GenerationController
// ---------------------------------------------------------------------------

/// Generation state layered over the store: edit mode, the single
/// speculative-edit transaction, and one in-flight request per clip.
#[derive(Debug, Default)]
pub struct GenerationController {
    edit_mode: GenerationMode,
    transaction: Option<PendingTransaction>,
    in_flight: HashMap<Uuid, RequestId>,
    cancelled: Vec<RequestId>,
    next_request: u64,
}

impl GenerationController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn edit_mode(&self) -> GenerationMode {
        self.edit_mode
    }

    pub fn transaction(&self) -> Option<&PendingTransaction> {
        self.transaction.as_ref()
    }

    pub fn in_flight(&self, clip_id: Uuid) -> Option<RequestId> {
        self.in_flight.get(&clip_id).copied()
    }

    /// Requests abandoned since the last call, for the backend to cancel.
    pub fn take_cancelled(&mut self) -> Vec<RequestId> {
        std::mem::take(&mut self.cancelled)
    }

    /// Change selection. An outstanding speculative edit on another clip is
    /// reverted and the edit mode resets.
    pub fn select(&mut self, store: &mut Store, id: Option<Uuid>) {
        let changed = store.state().selected_clip_id != id;
        store.dispatch(Command::SelectClip(id));
        if self.transaction.as_ref().is_some_and(|t| Some(t.clip_id) != id) {
            self.revert(store);
        }
        if changed {
            self.edit_mode = GenerationMode::Regenerate;
        }
    }

    /// Switch the edit mode of the selected clip.
    ///
    /// Entering extend captures the track, grows the clip by the extend
    /// increment and marks where the extension begins. Leaving it reverts
    /// the capture.
    pub fn set_edit_mode(&mut self, store: &mut Store, mode: GenerationMode) -> Result<()> {
        let clip = selected_clip(store)?;
        let clip_id = clip.id;

        match mode {
            GenerationMode::Extend => {
                if self.transaction.as_ref().is_some_and(|t| t.clip_id == clip_id) {
                    self.edit_mode = mode;
                    return Ok(());
                }
                require_phase(clip, GenerationPhase::Idle)?;
                if self.transaction.is_some() {
                    self.revert(store);
                }
                let clip = selected_clip(store)?;
                let duration = clip.duration_us;
                let grown = duration + store.settings().extend_increment_us;
                self.transaction = Some(PendingTransaction::capture(store.state(), clip_id, clip.track));
                store.dispatch(Command::UpdateClip {
                    id: clip_id,
                    changes: ClipChanges {
                        duration_us: Some(grown),
                        extension_start_us: Some(Some(duration)),
                        ..ClipChanges::default()
                    },
                });
                tracing::info!(clip = %clip_id, from_us = duration.0, to_us = grown.0, "extend preview");
            }
            GenerationMode::Regenerate => {
                if self.transaction.as_ref().is_some_and(|t| t.clip_id == clip_id) {
                    self.revert(store);
                }
            }
        }
        self.edit_mode = mode;
        Ok(())
    }

    /// The editor was dismissed without submitting; drop any preview.
    pub fn close_editor(&mut self, store: &mut Store) {
        if self.transaction.is_some() {
            self.revert(store);
        }
        self.edit_mode = GenerationMode::Regenerate;
    }

    /// Place a generating placeholder clip at `at` inside an empty gap.
    pub fn create_in_gap(
        &mut self,
        store: &mut Store,
        track: TrackKind,
        at: TimeUs,
        prompt: &str,
    ) -> Result<GenerationRequest> {
        let prompt = non_empty(prompt)?;
        if self.transaction.is_some() {
            self.revert(store);
        }
        let gap = collision::find_gap(&store.state().clips, track, at).ok_or_else(|| {
            CoreError::InvalidOperation(format!("no free gap on {track:?} track at {at}"))
        })?;

        let settings = store.settings();
        let mut duration = settings.new_clip_duration_us;
        if let Some(end) = gap.end_us {
            duration = duration.min(end - at);
        }
        if duration < settings.min_clip_duration_us {
            return Err(CoreError::InvalidOperation(format!(
                "gap at {at} is shorter than the minimum clip length"
            )));
        }

        let mut clip = Clip::new(track, at, duration);
        clip.prompt = Some(prompt.to_string());
        clip.is_generating = true;
        clip.last_generation_mode = Some(GenerationMode::Regenerate);
        let clip_id = clip.id;
        store.dispatch(Command::AddClip(clip));
        self.edit_mode = GenerationMode::Regenerate;

        let request = self.register(clip_id, track, GenerationMode::Regenerate, prompt, at, duration);
        tracing::info!(clip = %clip_id, request = %request.request_id, "created placeholder clip");
        Ok(request)
    }

    /// Submit the prompt for the selected clip in the current edit mode.
    pub fn submit(&mut self, store: &mut Store, prompt: &str) -> Result<GenerationRequest> {
        let prompt = non_empty(prompt)?;
        let clip = selected_clip(store)?;
        require_phase(clip, GenerationPhase::Idle)?;
        let clip_id = clip.id;
        let mode = self.edit_mode;

        store.dispatch(Command::UpdateClip {
            id: clip_id,
            changes: ClipChanges {
                prompt: Some(Some(prompt.to_string())),
                last_generation_mode: Some(Some(mode)),
                ..ClipChanges::default()
            },
        });
        store.dispatch(Command::SetGenerating { id: clip_id, generating: true });

        let clip = selected_clip(store)?;
        let (track, start, duration) = (clip.track, clip.start_us, clip.duration_us);
        let request = self.register(clip_id, track, mode, prompt, start, duration);
        tracing::info!(clip = %clip_id, request = %request.request_id, ?mode, "generation submitted");
        Ok(request)
    }

    /// Apply a backend result. Results for requests that are no longer
    /// in flight are dropped; returns whether it was applied.
    pub fn complete(&mut self, store: &mut Store, request_id: RequestId, outcome: GenerationOutcome) -> bool {
        let Some(clip_id) = self.finish(request_id) else {
            tracing::warn!(request = %request_id, "completion for unknown request dropped");
            return false;
        };
        let Some(clip) = store.state().clip(clip_id) else {
            return false;
        };

        let mut changes = ClipChanges {
            content: Some(outcome.content),
            is_generating: Some(false),
            is_pending_confirmation: Some(true),
            ..ClipChanges::default()
        };
        if clip.track == TrackKind::Subtitle {
            if let Some(duration) = outcome.duration_us {
                changes.duration_us = Some(duration);
                changes.original_duration_us = Some(duration);
            }
        }
        store.dispatch(Command::UpdateClip { id: clip_id, changes });
        tracing::info!(clip = %clip_id, request = %request_id, "generation completed");
        true
    }

    /// The backend gave up. The clip goes back to idle and any speculative
    /// edit on it is reverted.
    pub fn fail(&mut self, store: &mut Store, request_id: RequestId) -> bool {
        let Some(clip_id) = self.finish(request_id) else {
            tracing::warn!(request = %request_id, "failure for unknown request dropped");
            return false;
        };
        store.dispatch(Command::SetGenerating { id: clip_id, generating: false });
        if self.transaction.as_ref().is_some_and(|t| t.clip_id == clip_id) {
            self.revert(store);
        }
        tracing::info!(clip = %clip_id, request = %request_id, "generation failed");
        true
    }

    /// Accept the generated result; any pending snapshot is discarded.
    pub fn confirm(&mut self, store: &mut Store, clip_id: Uuid) -> Result<()> {
        let clip = store.state().clip(clip_id).ok_or(CoreError::ClipNotFound(clip_id))?;
        require_phase(clip, GenerationPhase::PendingConfirmation)?;

        store.dispatch(Command::UpdateClip {
            id: clip_id,
            changes: ClipChanges {
                is_pending_confirmation: Some(false),
                ..ClipChanges::default()
            },
        });
        if self.transaction.as_ref().is_some_and(|t| t.clip_id == clip_id) {
            self.transaction = None;
        }
        self.edit_mode = GenerationMode::Regenerate;
        tracing::info!(clip = %clip_id, "generation confirmed");
        Ok(())
    }

    /// Reject the generated result. Restores the snapshot if this cycle
    /// took one, otherwise just leaves the confirmation state.
    pub fn reject(&mut self, store: &mut Store, clip_id: Uuid) -> Result<()> {
        let clip = store.state().clip(clip_id).ok_or(CoreError::ClipNotFound(clip_id))?;
        require_phase(clip, GenerationPhase::PendingConfirmation)?;

        if self.transaction.as_ref().is_some_and(|t| t.clip_id == clip_id) {
            self.revert(store);
        } else {
            store.dispatch(Command::UpdateClip {
                id: clip_id,
                changes: ClipChanges {
                    is_pending_confirmation: Some(false),
                    ..ClipChanges::default()
                },
            });
        }
        self.edit_mode = GenerationMode::Regenerate;
        tracing::info!(clip = %clip_id, "generation rejected");
        Ok(())
    }

    /// Delete a clip, abandoning its in-flight request and its preview.
    pub fn delete(&mut self, store: &mut Store, clip_id: Uuid) {
        self.cancel(clip_id);
        if self.transaction.as_ref().is_some_and(|t| t.clip_id == clip_id) {
            self.transaction = None;
            self.edit_mode = GenerationMode::Regenerate;
        }
        store.dispatch(Command::DeleteClip(clip_id));
    }

    /// Abandon the in-flight request of a clip, if any.
    pub fn cancel(&mut self, clip_id: Uuid) -> Option<RequestId> {
        let request_id = self.in_flight.remove(&clip_id)?;
        self.cancelled.push(request_id);
        tracing::debug!(clip = %clip_id, request = %request_id, "request cancelled");
        Some(request_id)
    }

    /// Abandon every in-flight request.
    pub fn cancel_all(&mut self) {
        let mut abandoned: Vec<RequestId> = self.in_flight.drain().map(|(_, id)| id).collect();
        abandoned.sort();
        self.cancelled.extend(abandoned);
    }

    /// Set the length shown in the duration field. While extending this is
    /// the extension part, capped by the extension limit.
    pub fn set_requested_duration(&mut self, store: &mut Store, amount: TimeUs) -> Result<()> {
        let clip = selected_clip(store)?;
        require_phase(clip, GenerationPhase::Idle)?;
        let clip_id = clip.id;

        let duration = match clip.extension_start_us {
            Some(ext) if self.edit_mode == GenerationMode::Extend => {
                let cap = store.settings().extension_cap_us;
                ext + amount.max(TimeUs(1)).min(cap)
            }
            _ => amount,
        };
        store.dispatch(Command::UpdateClip {
            id: clip_id,
            changes: ClipChanges::duration(duration),
        });
        Ok(())
    }

    fn revert(&mut self, store: &mut Store) {
        let Some(transaction) = self.transaction.take() else {
            return;
        };
        let clip_id = transaction.clip_id;
        self.cancel(clip_id);
        let restored = transaction.restored(&store.state().clips);
        store.dispatch(Command::RestoreClips(restored));
        tracing::info!(clip = %clip_id, "speculative edit reverted");
    }

    fn register(
        &mut self,
        clip_id: Uuid,
        track: TrackKind,
        mode: GenerationMode,
        prompt: &str,
        start_us: TimeUs,
        duration_us: TimeUs,
    ) -> GenerationRequest {
        self.next_request += 1;
        let request_id = RequestId(self.next_request);
        if let Some(previous) = self.in_flight.insert(clip_id, request_id) {
            self.cancelled.push(previous);
        }
        GenerationRequest {
            request_id,
            clip_id,
            track,
            mode,
            prompt: prompt.to_string(),
            start_us,
            duration_us,
        }
    }

    fn finish(&mut self, request_id: RequestId) -> Option<Uuid> {
        let clip_id = self
            .in_flight
            .iter()
            .find(|(_, id)| **id == request_id)
            .map(|(clip_id, _)| *clip_id)?;
        self.in_flight.remove(&clip_id);
        Some(clip_id)
    }
}

fn selected_clip(store: &Store) -> Result<&Clip> {
    store
        .state()
        .selected_clip()
        .ok_or_else(|| CoreError::InvalidOperation("no clip selected".into()))
}

fn require_phase(clip: &Clip, expected: GenerationPhase) -> Result<()> {
    let phase = GenerationPhase::of(clip);
    if phase == expected {
        Ok(())
    } else {
        Err(CoreError::InvalidOperation(format!(
            "clip {} is {:?}, expected {:?}",
            clip.id, phase, expected
        )))
    }
}

fn non_empty(prompt: &str) -> Result<&str> {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        Err(CoreError::InvalidOperation("prompt is empty".into()))
    } else {
        Ok(trimmed)
    }
}
