use crate::backend::{BackendEvent, GenerationBackend};
use crate::error::{Result, SessionError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use storyreel_core::error::CoreError;
use storyreel_core::generation::{GenerationController, GenerationRequest};
use storyreel_core::store::{ClipChanges, Command, Store};
use storyreel_core::types::{EditorState, GenerationMode, TimeUs, TrackKind};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

const INTENT_QUEUE: usize = 64;
const BACKEND_QUEUE: usize = 16;

/// What the user asked for, as the UI collaborator reports it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserIntent {
    Seek {
        time_us: TimeUs,
    },
    TogglePlay,
    Select {
        clip_id: Option<Uuid>,
    },
    /// One pointer-move tick of a drag.
    Move {
        clip_id: Uuid,
        start_us: TimeUs,
    },
    /// One pointer-move tick of a trim handle.
    Trim {
        clip_id: Uuid,
        duration_us: TimeUs,
    },
    SetEditMode {
        mode: GenerationMode,
    },
    CloseEditor,
    SetRequestedDuration {
        amount_us: TimeUs,
    },
    CreateInGap {
        track: TrackKind,
        at_us: TimeUs,
        prompt: String,
    },
    Submit {
        prompt: String,
    },
    Confirm {
        clip_id: Uuid,
    },
    Reject {
        clip_id: Uuid,
    },
    Delete {
        clip_id: Uuid,
    },
    SetThumbnail {
        clip_id: Uuid,
        thumbnail: Option<String>,
    },
    Shutdown,
}

/// The single writer of editor state. Intents, backend results and clock
/// ticks are handled one at a time, each to completion.
pub struct Session {
    store: Store,
    generation: GenerationController,
    backend: Arc<dyn GenerationBackend>,
    intents: mpsc::Receiver<UserIntent>,
    backend_tx: mpsc::Sender<BackendEvent>,
    backend_rx: mpsc::Receiver<BackendEvent>,
    state_tx: watch::Sender<EditorState>,
}

/// Cloneable access to a running session.
#[derive(Debug, Clone)]
pub struct SessionSender {
    intents: mpsc::Sender<UserIntent>,
}

impl SessionSender {
    pub async fn send(&self, intent: UserIntent) -> Result<()> {
        self.intents.send(intent).await.map_err(|_| SessionError::Closed)
    }

    /// Parse one JSON intent and queue it.
    pub async fn send_line(&self, line: &str) -> Result<()> {
        let intent: UserIntent = serde_json::from_str(line)?;
        self.send(intent).await
    }
}

pub struct SessionHandle {
    sender: SessionSender,
    state: watch::Receiver<EditorState>,
    task: JoinHandle<EditorState>,
}

impl SessionHandle {
    pub async fn send(&self, intent: UserIntent) -> Result<()> {
        self.sender.send(intent).await
    }

    pub fn sender(&self) -> SessionSender {
        self.sender.clone()
    }

    /// The most recently published state.
    pub fn state(&self) -> EditorState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<EditorState> {
        self.state.clone()
    }

    /// Stop the session and return its final state.
    pub async fn shutdown(self) -> Result<EditorState> {
        if self.sender.send(UserIntent::Shutdown).await.is_err() {
            tracing::debug!("session already stopped");
        }
        self.task.await.map_err(|_| SessionError::Closed)
    }
}

impl Session {
    /// Start a session on the current tokio runtime.
    pub fn spawn(store: Store, backend: Arc<dyn GenerationBackend>) -> SessionHandle {
        let (intent_tx, intents) = mpsc::channel(INTENT_QUEUE);
        let (backend_tx, backend_rx) = mpsc::channel(BACKEND_QUEUE);
        let (state_tx, state_rx) = watch::channel(store.state().clone());

        let session = Session {
            store,
            generation: GenerationController::new(),
            backend,
            intents,
            backend_tx,
            backend_rx,
            state_tx,
        };
        let task = tokio::spawn(session.run());

        SessionHandle {
            sender: SessionSender { intents: intent_tx },
            state: state_rx,
            task,
        }
    }

    async fn run(mut self) -> EditorState {
        let tick = self.store.settings().playback_tick_us;
        let mut clock = tokio::time::interval(Duration::from_micros(tick.0.max(1) as u64));
        clock.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(clips = self.store.state().clips.len(), "session started");

        loop {
            let playing = self.store.state().is_playing;
            tokio::select! {
                intent = self.intents.recv() => match intent {
                    Some(UserIntent::Shutdown) | None => break,
                    Some(intent) => {
                        self.handle_intent(intent);
                        if !playing && self.store.state().is_playing {
                            clock.reset();
                        }
                    }
                },
                Some(event) = self.backend_rx.recv() => self.handle_backend(event),
                _ = clock.tick(), if playing => self.advance_playhead(),
            }
            self.flush_cancellations();
            self.publish();
        }

        self.generation.cancel_all();
        self.flush_cancellations();
        tracing::info!("session stopped");
        self.store.into_state()
    }

    fn handle_intent(&mut self, intent: UserIntent) {
        tracing::debug!(?intent, "intent");
        if let Err(e) = self.apply(intent) {
            tracing::debug!(error = %e, "intent ignored");
        }
    }

    fn apply(&mut self, intent: UserIntent) -> storyreel_core::error::Result<()> {
        match intent {
            UserIntent::Seek { time_us } => self.store.dispatch(Command::SetTime(time_us)),
            UserIntent::TogglePlay => self.store.dispatch(Command::TogglePlay),
            UserIntent::Select { clip_id } => self.generation.select(&mut self.store, clip_id),
            UserIntent::Move { clip_id, start_us } => self.move_clip(clip_id, start_us)?,
            UserIntent::Trim { clip_id, duration_us } => self.trim_clip(clip_id, duration_us)?,
            UserIntent::SetEditMode { mode } => self.generation.set_edit_mode(&mut self.store, mode)?,
            UserIntent::CloseEditor => self.generation.close_editor(&mut self.store),
            UserIntent::SetRequestedDuration { amount_us } => {
                self.generation.set_requested_duration(&mut self.store, amount_us)?
            }
            UserIntent::CreateInGap { track, at_us, prompt } => {
                let request = self.generation.create_in_gap(&mut self.store, track, at_us, &prompt)?;
                self.start(request);
            }
            UserIntent::Submit { prompt } => {
                let request = self.generation.submit(&mut self.store, &prompt)?;
                self.start(request);
            }
            UserIntent::Confirm { clip_id } => self.generation.confirm(&mut self.store, clip_id)?,
            UserIntent::Reject { clip_id } => self.generation.reject(&mut self.store, clip_id)?,
            UserIntent::Delete { clip_id } => self.generation.delete(&mut self.store, clip_id),
            UserIntent::SetThumbnail { clip_id, thumbnail } => self.store.dispatch(Command::UpdateClip {
                id: clip_id,
                changes: ClipChanges {
                    thumbnail: Some(thumbnail),
                    ..ClipChanges::default()
                },
            }),
            UserIntent::Shutdown => {}
        }
        Ok(())
    }

    fn move_clip(&mut self, clip_id: Uuid, start_us: TimeUs) -> storyreel_core::error::Result<()> {
        let clip = self.store.state().clip(clip_id).ok_or(CoreError::ClipNotFound(clip_id))?;
        if clip.is_generating {
            return Err(CoreError::InvalidOperation(format!("clip {clip_id} is generating")));
        }
        self.store.dispatch(Command::UpdateClip {
            id: clip_id,
            changes: ClipChanges::start(start_us.max(TimeUs::ZERO)),
        });
        Ok(())
    }

    fn trim_clip(&mut self, clip_id: Uuid, duration_us: TimeUs) -> storyreel_core::error::Result<()> {
        let clip = self.store.state().clip(clip_id).ok_or(CoreError::ClipNotFound(clip_id))?;
        if clip.track != TrackKind::Video || clip.is_generating {
            return Err(CoreError::InvalidOperation(format!("clip {clip_id} cannot be trimmed")));
        }
        let duration = clip.clamp_trim(duration_us, self.store.settings());
        self.store.dispatch(Command::UpdateClip {
            id: clip_id,
            changes: ClipChanges::duration(duration),
        });
        Ok(())
    }

    fn start(&self, request: GenerationRequest) {
        self.backend.submit(request, self.backend_tx.clone());
    }

    fn handle_backend(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::Completed { request_id, outcome } => {
                self.generation.complete(&mut self.store, request_id, outcome);
            }
            BackendEvent::Failed { request_id, reason } => {
                tracing::warn!(request = %request_id, %reason, "backend reported failure");
                self.generation.fail(&mut self.store, request_id);
            }
        }
    }

    fn advance_playhead(&mut self) {
        let state = self.store.state();
        let next = state.current_time_us + self.store.settings().playback_tick_us;
        self.store.dispatch(Command::SetTime(next));
    }

    fn flush_cancellations(&mut self) {
        for request_id in self.generation.take_cancelled() {
            self.backend.cancel(request_id);
        }
    }

    fn publish(&self) {
        let state = self.store.state();
        self.state_tx.send_if_modified(|current| {
            if *current == *state {
                false
            } else {
                *current = state.clone();
                true
            }
        });
    }
}
