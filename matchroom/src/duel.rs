//! Two-party tie-break — rock/paper/scissors with random fallback.
//!
//! Each side is prompted privately; a missing gesture becomes a uniformly
//! random one, and equal gestures void the round and restart it from
//! scratch. Used for match pick-order and the draft-format tie-break.

use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::{self, Instant};
use tracing::{debug, info};

use crate::participant::ParticipantId;
use crate::presenter::{
    ChoiceOption, Presenter, PresenterResult, PromptRequest, PromptScope, RoomHandle,
};

/// The three gestures and their fixed beats-table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gesture {
    Rock,
    Paper,
    Scissors,
}

impl Gesture {
    pub const ALL: [Gesture; 3] = [Gesture::Rock, Gesture::Paper, Gesture::Scissors];

    /// Rock beats scissors, scissors beats paper, paper beats rock.
    pub fn beats(self, other: Gesture) -> bool {
        matches!(
            (self, other),
            (Gesture::Rock, Gesture::Scissors)
                | (Gesture::Scissors, Gesture::Paper)
                | (Gesture::Paper, Gesture::Rock)
        )
    }

    pub fn option_id(self) -> &'static str {
        match self {
            Self::Rock => "rock",
            Self::Paper => "paper",
            Self::Scissors => "scissors",
        }
    }

    pub fn from_option_id(id: &str) -> Option<Self> {
        match id {
            "rock" => Some(Self::Rock),
            "paper" => Some(Self::Paper),
            "scissors" => Some(Self::Scissors),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Rock => "Rock",
            Self::Paper => "Paper",
            Self::Scissors => "Scissors",
        }
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        *Self::ALL.choose(rng).unwrap_or(&Gesture::Rock)
    }
}

impl std::fmt::Display for Gesture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.option_id())
    }
}

/// Outcome of a resolved duel — always a strict winner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuelResult {
    pub winner: ParticipantId,
    pub loser: ParticipantId,
    pub winner_gesture: Gesture,
    pub loser_gesture: Gesture,
    /// How many rounds it took, counting voided ties.
    pub rounds: u32,
}

/// Runs duels against a presenter with a fixed per-gesture window.
pub struct DuelResolver<P> {
    presenter: Arc<P>,
    window: Duration,
}

impl<P: Presenter> DuelResolver<P> {
    pub fn new(presenter: Arc<P>, window: Duration) -> Self {
        Self { presenter, window }
    }

    /// Resolve a strict winner between two participants. Ties void the
    /// round and it is retried from scratch with fresh prompts.
    pub async fn run(
        &self,
        room: &RoomHandle,
        a: &ParticipantId,
        b: &ParticipantId,
        purpose: &str,
    ) -> PresenterResult<DuelResult> {
        let mut rounds = 0u32;
        loop {
            rounds += 1;
            let gesture_a = self.gesture_of(a, purpose).await?;
            let gesture_b = self.gesture_of(b, purpose).await?;

            if gesture_a == gesture_b {
                debug!(%a, %b, gesture = %gesture_a, purpose, "duel tie, rerunning");
                self.presenter
                    .announce(
                        room,
                        &format!(
                            "Both chose {} — tie! Rerunning the duel for {}.",
                            gesture_a.label(),
                            purpose
                        ),
                    )
                    .await?;
                for side in [a, b] {
                    let _ = self
                        .presenter
                        .notify(
                            side,
                            &format!(
                                "Tie on {} — rerunning the duel for {}.",
                                gesture_a.label(),
                                purpose
                            ),
                        )
                        .await;
                }
                continue;
            }

            let (winner, loser, winner_gesture, loser_gesture) = if gesture_a.beats(gesture_b) {
                (a.clone(), b.clone(), gesture_a, gesture_b)
            } else {
                (b.clone(), a.clone(), gesture_b, gesture_a)
            };

            info!(%winner, %loser, purpose, rounds, "duel resolved");
            self.presenter
                .announce(
                    room,
                    &format!(
                        "Duel ({}): {} ({}) vs ({}) {} — {} wins!",
                        purpose,
                        a,
                        gesture_a.label(),
                        gesture_b.label(),
                        b,
                        winner
                    ),
                )
                .await?;
            let _ = self
                .presenter
                .notify(&winner, &format!("You won the duel for {}!", purpose))
                .await;
            let _ = self
                .presenter
                .notify(&loser, &format!("You lost the duel for {}.", purpose))
                .await;

            return Ok(DuelResult {
                winner,
                loser,
                winner_gesture,
                loser_gesture,
                rounds,
            });
        }
    }

    /// Privately prompt one participant for a gesture; absence of a timely
    /// choice resolves to a uniformly random one.
    async fn gesture_of(
        &self,
        participant: &ParticipantId,
        purpose: &str,
    ) -> PresenterResult<Gesture> {
        let options = Gesture::ALL
            .iter()
            .map(|g| ChoiceOption::new(g.option_id(), g.label()))
            .collect();
        let request = PromptRequest::new(
            PromptScope::Direct(participant.clone()),
            format!("duel: {}", purpose),
            options,
            self.window,
        );
        let mut rx = self.presenter.prompt(request).await?;
        let deadline = Instant::now() + self.window;

        loop {
            tokio::select! {
                _ = time::sleep_until(deadline) => break,
                observed = rx.recv() => {
                    let Some(observed) = observed else {
                        time::sleep_until(deadline).await;
                        break;
                    };
                    if observed.voter != *participant {
                        continue;
                    }
                    let Some(gesture) = Gesture::from_option_id(&observed.option_id) else {
                        continue;
                    };
                    let _ = self
                        .presenter
                        .notify(participant, "Choice recorded!")
                        .await;
                    return Ok(gesture);
                }
            }
        }

        let auto = Gesture::random(&mut rand::thread_rng());
        debug!(%participant, gesture = %auto, purpose, "no gesture in time, auto-choosing");
        let _ = self
            .presenter
            .notify(
                participant,
                &format!("No pick in time — auto {}.", auto.label()),
            )
            .await;
        Ok(auto)
    }
}
