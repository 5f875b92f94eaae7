use crate::collision;
use crate::types::*;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// ClipChanges
// ---------------------------------------------------------------------------

/// Partial update merged into a clip by [`Command::UpdateClip`].
///
/// `None` leaves a field alone. For the optional clip fields the inner
/// `Option` is the new value, so `Some(None)` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClipChanges {
    pub start_us: Option<TimeUs>,
    pub duration_us: Option<TimeUs>,
    pub original_duration_us: Option<TimeUs>,
    #[serde(deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub extension_start_us: Option<Option<TimeUs>>,
    pub content: Option<String>,
    #[serde(deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub prompt: Option<Option<String>>,
    pub is_generating: Option<bool>,
    pub is_pending_confirmation: Option<bool>,
    #[serde(deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub last_generation_mode: Option<Option<GenerationMode>>,
    #[serde(deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Option<String>>,
}

/// A field that appears in the input, even as `null`, is `Some`.
fn present<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl ClipChanges {
    pub fn start(start_us: TimeUs) -> Self {
        Self {
            start_us: Some(start_us),
            ..Self::default()
        }
    }

    pub fn duration(duration_us: TimeUs) -> Self {
        Self {
            duration_us: Some(duration_us),
            ..Self::default()
        }
    }

    fn merge_into(self, clip: &mut Clip) {
        if let Some(v) = self.start_us {
            clip.start_us = v;
        }
        if let Some(v) = self.duration_us {
            clip.duration_us = v;
        }
        if let Some(v) = self.original_duration_us {
            clip.original_duration_us = v;
        }
        if let Some(v) = self.extension_start_us {
            clip.extension_start_us = v;
        }
        if let Some(v) = self.content {
            clip.content = v;
        }
        if let Some(v) = self.prompt {
            clip.prompt = v;
        }
        if let Some(v) = self.is_generating {
            clip.is_generating = v;
        }
        if let Some(v) = self.is_pending_confirmation {
            clip.is_pending_confirmation = v;
        }
        if let Some(v) = self.last_generation_mode {
            clip.last_generation_mode = v;
        }
        if let Some(v) = self.thumbnail {
            clip.thumbnail = v;
        }
    }
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// Everything that can change an [`EditorState`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Command {
    SetTime(TimeUs),
    TogglePlay,
    SelectClip(Option<Uuid>),
    UpdateClip { id: Uuid, changes: ClipChanges },
    AddClip(Clip),
    DeleteClip(Uuid),
    RestoreClips(Vec<Clip>),
    SetGenerating { id: Uuid, generating: bool },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::SetTime(_) => "set_time",
            Command::TogglePlay => "toggle_play",
            Command::SelectClip(_) => "select_clip",
            Command::UpdateClip { .. } => "update_clip",
            Command::AddClip(_) => "add_clip",
            Command::DeleteClip(_) => "delete_clip",
            Command::RestoreClips(_) => "restore_clips",
            Command::SetGenerating { .. } => "set_generating",
        }
    }
}

// ---------------------------------------------------------------------------
// reduce
// ---------------------------------------------------------------------------

/// Apply one command. Total: unknown ids leave the state untouched and
/// out-of-range values are clamped.
pub fn reduce(mut state: EditorState, command: Command, settings: &EditorSettings) -> EditorState {
    match command {
        Command::SetTime(t) => {
            state.current_time_us = t.max(TimeUs::ZERO).min(state.total_duration_us);
        }
        Command::TogglePlay => {
            state.is_playing = !state.is_playing;
        }
        Command::SelectClip(id) => {
            state.selected_clip_id = id;
        }
        Command::UpdateClip { id, changes } => {
            update_clip(&mut state, id, changes, settings);
        }
        Command::AddClip(mut clip) => {
            if state.clip(clip.id).is_some() {
                tracing::debug!(clip = %clip.id, "add_clip: id already present, ignored");
                return state;
            }
            clip.start_us = clip.start_us.max(TimeUs::ZERO);
            clip.duration_us = clip.duration_us.max(settings.min_clip_duration_us);
            state.total_duration_us = state.total_duration_us.max(clip.end_us());
            state.selected_clip_id = Some(clip.id);
            state.clips.push(clip);
        }
        Command::DeleteClip(id) => {
            let before = state.clips.len();
            state.clips.retain(|c| c.id != id);
            if state.clips.len() == before {
                tracing::debug!(clip = %id, "delete_clip: unknown id, ignored");
            }
            if state.selected_clip_id == Some(id) {
                state.selected_clip_id = None;
            }
        }
        Command::RestoreClips(clips) => {
            state.clips = clips;
            state.total_duration_us = state.total_duration_us.max(collision::max_end(&state.clips));
        }
        Command::SetGenerating { id, generating } => {
            match state.clips.iter_mut().find(|c| c.id == id) {
                Some(clip) => clip.is_generating = generating,
                None => tracing::debug!(clip = %id, "set_generating: unknown id, ignored"),
            }
        }
    }
    state
}

fn update_clip(state: &mut EditorState, id: Uuid, changes: ClipChanges, settings: &EditorSettings) {
    let Some(idx) = state.clips.iter().position(|c| c.id == id) else {
        tracing::debug!(clip = %id, "update_clip: unknown id, ignored");
        return;
    };

    let old_start = state.clips[idx].start_us;
    let old_duration = state.clips[idx].duration_us;
    let duration_given = changes.duration_us.is_some();
    let start_given = changes.start_us.is_some();

    let clip = &mut state.clips[idx];
    changes.merge_into(clip);
    clip.start_us = clip.start_us.max(TimeUs::ZERO);
    clip.duration_us = clip.duration_us.max(settings.min_clip_duration_us);
    if let Some(ext) = clip.extension_start_us {
        clip.duration_us = clip.duration_us.min(ext + settings.extension_cap_us);
    }
    let new_start = clip.start_us;
    let new_duration = clip.duration_us;

    if duration_given && new_duration > old_duration {
        collision::ripple_growth(&mut state.clips, id);
    }
    if start_given && new_start != old_start {
        collision::ripple_move(&mut state.clips, id, settings.reorder_epsilon_us);
    }

    state.total_duration_us = state.total_duration_us.max(collision::max_end(&state.clips));
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Sole owner and writer of the editor state.
#[derive(Debug, Clone)]
pub struct Store {
    state: EditorState,
    settings: EditorSettings,
}

impl Store {
    pub fn new(state: EditorState, settings: EditorSettings) -> Self {
        Self { state, settings }
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn settings(&self) -> &EditorSettings {
        &self.settings
    }

    pub fn dispatch(&mut self, command: Command) {
        tracing::trace!(command = command.name(), "dispatch");
        let state = std::mem::replace(&mut self.state, EditorState::new(&self.settings));
        self.state = reduce(state, command, &self.settings);
    }

    pub fn into_state(self) -> EditorState {
        self.state
    }
}
