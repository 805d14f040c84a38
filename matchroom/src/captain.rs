//! Captain selection — one pool-wide ballot plus cascading tie-break rules.

use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::info;

use crate::ballot::{self, Ballot, Tally};
use crate::participant::{NameCache, ParticipantId};
use crate::presenter::{
    ChoiceOption, Presenter, PresenterResult, PromptRequest, PromptScope, RoomHandle,
};

/// Run the captain vote and resolve two captains.
///
/// Every pool member gets one vote for any pool member (self-votes carry no
/// special status). Resolution falls through the tie-break cascade in
/// [`resolve`]. The returned pair is unordered; pick order is decided by a
/// separate duel.
pub async fn select_captains<P: Presenter>(
    presenter: &Arc<P>,
    room: &RoomHandle,
    pool: &[ParticipantId],
    names: &NameCache,
    window: Duration,
) -> PresenterResult<(ParticipantId, ParticipantId)> {
    let options = pool
        .iter()
        .map(|id| ChoiceOption::new(id.as_str(), names.label_for(id)))
        .collect();
    let request = PromptRequest::new(
        PromptScope::Room(room.clone()),
        "captain vote",
        options,
        window,
    );
    let mut rx = presenter.prompt(request).await?;

    let mut ballot: Ballot<ParticipantId> = Ballot::open(pool.to_vec(), window);
    let pool_set = pool.to_vec();
    ballot::collect(
        &mut ballot,
        &mut rx,
        |observed| {
            let candidate = ParticipantId::new(observed.option_id.clone());
            pool_set.contains(&candidate).then_some(candidate)
        },
        Ballot::all_voted,
        |_, _| async {},
    )
    .await;

    let tally = ballot.tally();
    let (first, second) = resolve(pool, &tally, &mut rand::thread_rng());
    info!(%first, %second, votes = ballot.votes_cast(), "captains selected");

    presenter
        .announce(
            room,
            &format!(
                "Captains selected: {} & {}",
                names.label_for(&first),
                names.label_for(&second)
            ),
        )
        .await?;
    Ok((first, second))
}

/// Tie-break cascade over the captain-vote tally:
/// - no votes: two uniform random pool members;
/// - two or more tied for the lead: two uniform random from the tied set;
/// - unique leader with a unique second place: that pair;
/// - unique leader with a tie for second: leader plus one random from the
///   second-place set;
/// - unique leader and nobody else voted for: leader plus one random other
///   pool member.
pub(crate) fn resolve<R: Rng + ?Sized>(
    pool: &[ParticipantId],
    tally: &Tally<ParticipantId>,
    rng: &mut R,
) -> (ParticipantId, ParticipantId) {
    let leaders = tally.leaders();
    match leaders.len() {
        0 => {
            let picks: Vec<_> = pool.choose_multiple(rng, 2).cloned().collect();
            (picks[0].clone(), picks[1].clone())
        }
        1 => {
            let leader = leaders[0].clone();
            let runners_up = tally.runners_up();
            let second = if runners_up.is_empty() {
                let others: Vec<_> = pool.iter().filter(|p| **p != leader).cloned().collect();
                others
                    .choose(rng)
                    .cloned()
                    .unwrap_or_else(|| leader.clone())
            } else {
                runners_up
                    .choose(rng)
                    .cloned()
                    .unwrap_or_else(|| leader.clone())
            };
            (leader, second)
        }
        _ => {
            let picks: Vec<_> = leaders.choose_multiple(rng, 2).cloned().collect();
            (picks[0].clone(), picks[1].clone())
        }
    }
}
