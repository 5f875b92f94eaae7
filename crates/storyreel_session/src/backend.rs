use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use storyreel_core::generation::{GenerationOutcome, GenerationRequest, RequestId};
use storyreel_core::types::{EditorSettings, TimeUs, TrackKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Delivered by a backend back into the session queue.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    Completed {
        request_id: RequestId,
        outcome: GenerationOutcome,
    },
    Failed {
        request_id: RequestId,
        reason: String,
    },
}

/// Something that turns prompts into clip content.
///
/// `submit` must not block; results arrive later on `events`. A cancelled
/// request should never deliver, but the session tolerates it if one does.
pub trait GenerationBackend: Send + Sync {
    fn submit(&self, request: GenerationRequest, events: mpsc::Sender<BackendEvent>);
    fn cancel(&self, request_id: RequestId);
}

/// Spoken length of a narration text at the configured speech rate.
pub fn estimate_narration(text: &str, settings: &EditorSettings) -> TimeUs {
    let chars = text.trim().chars().count() as i64;
    (settings.narration_us_per_char * chars)
        .max(settings.min_clip_duration_us)
        .min(settings.narration_max_duration_us)
}

/// Timer-driven stand-in for a generation service.
pub struct MockBackend {
    settings: EditorSettings,
    tasks: Mutex<HashMap<RequestId, JoinHandle<()>>>,
}

impl MockBackend {
    pub fn new(settings: EditorSettings) -> Self {
        Self {
            settings,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Requests that have not delivered yet.
    pub fn pending(&self) -> usize {
        self.lock_tasks().values().filter(|h| !h.is_finished()).count()
    }

    fn outcome(&self, request: &GenerationRequest) -> GenerationOutcome {
        match request.track {
            TrackKind::Video => GenerationOutcome {
                content: format!("/videos/generated/{}.mp4", request.request_id),
                duration_us: None,
            },
            TrackKind::Subtitle => GenerationOutcome {
                content: request.prompt.clone(),
                duration_us: Some(estimate_narration(&request.prompt, &self.settings)),
            },
        }
    }

    fn lock_tasks(&self) -> MutexGuard<'_, HashMap<RequestId, JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl GenerationBackend for MockBackend {
    fn submit(&self, request: GenerationRequest, events: mpsc::Sender<BackendEvent>) {
        let delay = Duration::from_micros(self.settings.generation_delay_us.0.max(0) as u64);
        let outcome = self.outcome(&request);
        let request_id = request.request_id;
        tracing::debug!(
            request = %request_id,
            delay_s = self.settings.generation_delay_us.as_seconds(),
            "mock generation scheduled"
        );

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let event = BackendEvent::Completed { request_id, outcome };
            if events.send(event).await.is_err() {
                tracing::debug!(request = %request_id, "session closed before delivery");
            }
        });

        let mut tasks = self.lock_tasks();
        tasks.retain(|_, h| !h.is_finished());
        tasks.insert(request_id, handle);
    }

    fn cancel(&self, request_id: RequestId) {
        if let Some(handle) = self.lock_tasks().remove(&request_id) {
            handle.abort();
            tracing::debug!(request = %request_id, "mock generation aborted");
        }
    }
}
