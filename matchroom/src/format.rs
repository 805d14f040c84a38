//! Draft-format selection — the two captains vote, with a duel fallback.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ballot::{self, Ballot};
use crate::duel::DuelResolver;
use crate::participant::ParticipantId;
use crate::presenter::{
    ChoiceOption, Presenter, PresenterResult, PromptRequest, PromptScope, RoomHandle,
};

/// How draft turns are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftFormat {
    /// Strict alternation: first pick, second pick, first, second, …
    Straight,
    /// Pick pairs reverse each round: first, second, second, first, …
    Snake,
}

impl DraftFormat {
    pub fn option_id(self) -> &'static str {
        match self {
            Self::Straight => "straight",
            Self::Snake => "snake",
        }
    }

    pub fn from_option_id(id: &str) -> Option<Self> {
        match id {
            "straight" => Some(Self::Straight),
            "snake" => Some(Self::Snake),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Straight => "Straight Draft",
            Self::Snake => "Snake Draft",
        }
    }
}

impl std::fmt::Display for DraftFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.option_id())
    }
}

/// Outcome of the format decision, including how it was reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatDecision {
    pub format: DraftFormat,
    /// Whether a tie-break duel was needed.
    pub by_duel: bool,
}

/// Resolve the draft format between the two captains.
///
/// Both captains voting the same format settles it. Disagreement,
/// abstention, or a lone vote falls back to a tie-break duel; the winner's
/// previously submitted choice is used, defaulting to [`DraftFormat::Straight`]
/// when the winner never voted.
pub async fn select_format<P: Presenter>(
    presenter: &Arc<P>,
    duels: &DuelResolver<P>,
    room: &RoomHandle,
    captain_1: &ParticipantId,
    captain_2: &ParticipantId,
    window: Duration,
) -> PresenterResult<FormatDecision> {
    let options = [DraftFormat::Snake, DraftFormat::Straight]
        .iter()
        .map(|f| ChoiceOption::new(f.option_id(), f.label()))
        .collect();
    let request = PromptRequest::new(
        PromptScope::Room(room.clone()),
        "draft format",
        options,
        window,
    );
    let mut rx = presenter.prompt(request).await?;

    let mut ballot: Ballot<DraftFormat> =
        Ballot::open(vec![captain_1.clone(), captain_2.clone()], window);
    ballot::collect(
        &mut ballot,
        &mut rx,
        |observed| DraftFormat::from_option_id(&observed.option_id),
        Ballot::all_voted,
        |_, _| async {},
    )
    .await;

    let vote_1 = ballot.vote_of(captain_1).copied();
    let vote_2 = ballot.vote_of(captain_2).copied();

    if let (Some(a), Some(b)) = (vote_1, vote_2) {
        if a == b {
            info!(format = %a, "captains agreed on draft format");
            presenter
                .announce(room, &format!("Draft format chosen: {}", a.label()))
                .await?;
            return Ok(FormatDecision {
                format: a,
                by_duel: false,
            });
        }
    }

    // Disagreement, abstention, or a lone vote: the duel winner's recorded
    // choice carries, straight when the winner never voted.
    let result = duels
        .run(room, captain_1, captain_2, "draft format tie-break")
        .await?;
    let format = ballot
        .vote_of(&result.winner)
        .copied()
        .unwrap_or(DraftFormat::Straight);
    info!(format = %format, winner = %result.winner, "draft format settled by duel");
    presenter
        .announce(
            room,
            &format!(
                "Format tie-break: duel winner {} — format is {}",
                result.winner,
                format.label()
            ),
        )
        .await?;
    Ok(FormatDecision {
        format,
        by_duel: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duel::Gesture;
    use crate::presenter::{ChannelPresenter, ObservedChoice, OpenPrompt};
    use tokio::sync::mpsc;

    fn pid(s: &str) -> ParticipantId {
        ParticipantId::new(s)
    }

    #[test]
    fn test_format_option_round_trip() {
        for f in [DraftFormat::Straight, DraftFormat::Snake] {
            assert_eq!(DraftFormat::from_option_id(f.option_id()), Some(f));
        }
        assert_eq!(DraftFormat::from_option_id("spiral"), None);
    }

    fn spawn_select(
        presenter: &Arc<ChannelPresenter>,
    ) -> tokio::task::JoinHandle<FormatDecision> {
        let presenter = Arc::clone(presenter);
        tokio::spawn(async move {
            let duels = DuelResolver::new(Arc::clone(&presenter), Duration::from_secs(5));
            let room = RoomHandle("room".to_string());
            select_format(
                &presenter,
                &duels,
                &room,
                &pid("c1"),
                &pid("c2"),
                Duration::from_secs(30),
            )
            .await
            .unwrap()
        })
    }

    async fn answer_duel_prompt(prompts: &mut mpsc::Receiver<OpenPrompt>, gesture: Gesture) {
        let open = prompts.recv().await.unwrap();
        let PromptScope::Direct(target) = open.request.scope.clone() else {
            panic!("expected direct duel prompt, got {:?}", open.request.scope);
        };
        open.choices
            .send(ObservedChoice::new(target.as_str(), gesture.option_id()))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_agreement_settles_without_duel() {
        let (presenter, mut prompts) = ChannelPresenter::new(8);
        let presenter = Arc::new(presenter);
        let task = spawn_select(&presenter);

        let open = prompts.recv().await.unwrap();
        assert_eq!(open.request.purpose, "draft format");
        for captain in ["c1", "c2"] {
            open.choices
                .send(ObservedChoice::new(captain, "snake"))
                .await
                .unwrap();
        }

        let decision = task.await.unwrap();
        assert_eq!(decision.format, DraftFormat::Snake);
        assert!(!decision.by_duel);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disagreement_falls_back_to_duel_winner_choice() {
        let (presenter, mut prompts) = ChannelPresenter::new(8);
        let presenter = Arc::new(presenter);
        let task = spawn_select(&presenter);

        let open = prompts.recv().await.unwrap();
        open.choices
            .send(ObservedChoice::new("c1", "snake"))
            .await
            .unwrap();
        open.choices
            .send(ObservedChoice::new("c2", "straight"))
            .await
            .unwrap();
        drop(open);

        // c2 wins the duel.
        answer_duel_prompt(&mut prompts, Gesture::Rock).await; // c1
        answer_duel_prompt(&mut prompts, Gesture::Paper).await; // c2

        let decision = task.await.unwrap();
        assert_eq!(decision.format, DraftFormat::Straight);
        assert!(decision.by_duel);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_winner_defaults_to_straight() {
        let (presenter, mut prompts) = ChannelPresenter::new(8);
        let presenter = Arc::new(presenter);
        let task = spawn_select(&presenter);

        let open = prompts.recv().await.unwrap();
        // Only c1 votes snake; window lapses.
        open.choices
            .send(ObservedChoice::new("c1", "snake"))
            .await
            .unwrap();
        drop(open);

        // c2 wins the duel but never voted on the format.
        answer_duel_prompt(&mut prompts, Gesture::Scissors).await; // c1
        answer_duel_prompt(&mut prompts, Gesture::Rock).await; // c2

        let decision = task.await.unwrap();
        assert_eq!(decision.format, DraftFormat::Straight);
        assert!(decision.by_duel);
    }
}
