//! Chat-collaborator seam — rooms, prompts, and notifications.
//!
//! The engine never renders anything itself: it opens prompts with a choice
//! space and a window, and observes whichever choices the transport reports
//! back. `ChannelPresenter` is the transport-agnostic implementation used by
//! the integration tests and by embedders that bridge to a real chat
//! platform over channels.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::participant::ParticipantId;

/// Error type for presenter operations.
#[derive(Debug, thiserror::Error)]
pub enum PresenterError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unknown room: {0}")]
    UnknownRoom(String),

    #[error("unknown participant: {0}")]
    UnknownParticipant(String),
}

/// Result type for presenter operations.
pub type PresenterResult<T> = Result<T, PresenterError>;

/// Handle to a transport-side room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomHandle(pub String);

impl std::fmt::Display for RoomHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of room to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomKind {
    /// Shared text room for the whole match.
    Match,
    /// Per-team voice room created after the draft.
    TeamVoice,
}

/// Where a prompt is shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptScope {
    /// Visible to everyone in the room.
    Room(RoomHandle),
    /// Private prompt to a single participant (duel gestures).
    Direct(ParticipantId),
}

/// One selectable option in a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    /// Stable id reported back in `ObservedChoice`.
    pub id: String,
    /// Human-readable label for the transport to render.
    pub label: String,
}

impl ChoiceOption {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// A prompt for the transport to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptRequest {
    pub prompt_id: String,
    pub scope: PromptScope,
    /// What decision this prompt serves, e.g. "captain vote".
    pub purpose: String,
    pub options: Vec<ChoiceOption>,
    pub window: Duration,
}

impl PromptRequest {
    pub fn new(
        scope: PromptScope,
        purpose: impl Into<String>,
        options: Vec<ChoiceOption>,
        window: Duration,
    ) -> Self {
        Self {
            prompt_id: uuid::Uuid::new_v4().to_string(),
            scope,
            purpose: purpose.into(),
            options,
            window,
        }
    }
}

/// A choice the transport observed in response to a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedChoice {
    pub voter: ParticipantId,
    pub option_id: String,
}

impl ObservedChoice {
    pub fn new(voter: impl Into<ParticipantId>, option_id: impl Into<String>) -> Self {
        Self {
            voter: voter.into(),
            option_id: option_id.into(),
        }
    }
}

/// Presentation collaborator. The engine aggregates; the transport renders.
#[async_trait]
pub trait Presenter: Send + Sync {
    async fn create_room(
        &self,
        kind: RoomKind,
        name: &str,
        participants: &[ParticipantId],
    ) -> PresenterResult<RoomHandle>;

    async fn delete_room(&self, room: &RoomHandle) -> PresenterResult<()>;

    async fn move_participant(
        &self,
        participant: &ParticipantId,
        room: &RoomHandle,
    ) -> PresenterResult<()>;

    /// Private message to one participant.
    async fn notify(&self, participant: &ParticipantId, message: &str) -> PresenterResult<()>;

    /// Message visible to everyone in a room.
    async fn announce(&self, room: &RoomHandle, message: &str) -> PresenterResult<()>;

    async fn display_name(&self, participant: &ParticipantId) -> PresenterResult<String>;

    /// Open a prompt and return the stream of observed choices. The stream
    /// ends when the transport closes the prompt; the engine applies its own
    /// deadline regardless.
    async fn prompt(
        &self,
        request: PromptRequest,
    ) -> PresenterResult<mpsc::Receiver<ObservedChoice>>;
}

/// A prompt currently open on a `ChannelPresenter`, handed to the host side.
/// Dropping `choices` without sending anything simulates silence.
#[derive(Debug)]
pub struct OpenPrompt {
    pub request: PromptRequest,
    pub choices: mpsc::Sender<ObservedChoice>,
}

/// Everything a `ChannelPresenter` delivered outward, for inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delivery {
    Notice {
        participant: ParticipantId,
        message: String,
    },
    Announcement {
        room: RoomHandle,
        message: String,
    },
}

/// Channel-backed presenter: prompt requests flow out over an mpsc channel
/// and the host injects observed choices back in. Rooms are handles only.
pub struct ChannelPresenter {
    prompt_tx: mpsc::Sender<OpenPrompt>,
    deliveries: Mutex<Vec<Delivery>>,
    moves: Mutex<Vec<(ParticipantId, RoomHandle)>>,
    names: Mutex<HashMap<ParticipantId, String>>,
    room_seq: AtomicU64,
    fail_moves: AtomicBool,
}

impl ChannelPresenter {
    /// Create a presenter plus the host-side receiver of open prompts.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<OpenPrompt>) {
        let (prompt_tx, prompt_rx) = mpsc::channel(buffer);
        (
            Self {
                prompt_tx,
                deliveries: Mutex::new(Vec::new()),
                moves: Mutex::new(Vec::new()),
                names: Mutex::new(HashMap::new()),
                room_seq: AtomicU64::new(0),
                fail_moves: AtomicBool::new(false),
            },
            prompt_rx,
        )
    }

    pub fn set_display_name(&self, id: ParticipantId, name: impl Into<String>) {
        lock_clean(&self.names).insert(id, name.into());
    }

    /// Make subsequent `move_participant` calls fail (participant not in a
    /// movable state), so callers exercise their notify fallback.
    pub fn set_fail_moves(&self, fail: bool) {
        self.fail_moves.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of everything delivered so far.
    pub fn deliveries(&self) -> Vec<Delivery> {
        lock_clean(&self.deliveries).clone()
    }

    /// Snapshot of successful participant moves.
    pub fn moves(&self) -> Vec<(ParticipantId, RoomHandle)> {
        lock_clean(&self.moves).clone()
    }
}

fn lock_clean<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Presenter for ChannelPresenter {
    async fn create_room(
        &self,
        kind: RoomKind,
        name: &str,
        _participants: &[ParticipantId],
    ) -> PresenterResult<RoomHandle> {
        let seq = self.room_seq.fetch_add(1, Ordering::SeqCst);
        let handle = RoomHandle(format!("room-{}-{:?}-{}", seq, kind, name));
        debug!(room = %handle, "room created");
        Ok(handle)
    }

    async fn delete_room(&self, room: &RoomHandle) -> PresenterResult<()> {
        debug!(room = %room, "room deleted");
        Ok(())
    }

    async fn move_participant(
        &self,
        participant: &ParticipantId,
        room: &RoomHandle,
    ) -> PresenterResult<()> {
        if self.fail_moves.load(Ordering::SeqCst) {
            return Err(PresenterError::Transport(format!(
                "{} is not in a movable state",
                participant
            )));
        }
        lock_clean(&self.moves).push((participant.clone(), room.clone()));
        Ok(())
    }

    async fn notify(&self, participant: &ParticipantId, message: &str) -> PresenterResult<()> {
        lock_clean(&self.deliveries).push(Delivery::Notice {
            participant: participant.clone(),
            message: message.to_string(),
        });
        Ok(())
    }

    async fn announce(&self, room: &RoomHandle, message: &str) -> PresenterResult<()> {
        lock_clean(&self.deliveries).push(Delivery::Announcement {
            room: room.clone(),
            message: message.to_string(),
        });
        Ok(())
    }

    async fn display_name(&self, participant: &ParticipantId) -> PresenterResult<String> {
        lock_clean(&self.names)
            .get(participant)
            .cloned()
            .ok_or_else(|| PresenterError::UnknownParticipant(participant.to_string()))
    }

    async fn prompt(
        &self,
        request: PromptRequest,
    ) -> PresenterResult<mpsc::Receiver<ObservedChoice>> {
        let (tx, rx) = mpsc::channel(64);
        debug!(
            prompt_id = %request.prompt_id,
            purpose = %request.purpose,
            options = request.options.len(),
            "prompt opened"
        );
        // If the host stopped listening the prompt simply never receives
        // choices and resolves by deadline.
        let _ = self
            .prompt_tx
            .send(OpenPrompt {
                request,
                choices: tx,
            })
            .await;
        Ok(rx)
    }
}
