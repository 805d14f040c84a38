//! Degraded paths: silent participants, force-termination, failed moves,
//! and persistence failures.
//!
//! Verifies:
//! - a fully silent pool still produces a complete match (random captains,
//!   auto-gestures, auto-picks) that a void quorum can close out
//! - force-terminate voids an in-flight match, releases locks, and leaves
//!   ratings untouched
//! - unmovable participants are told to join their room manually
//! - a failed rating batch write surfaces an event but never unsettles
//!   the match
//! - participant locks release at settlement, not at the end of the
//!   archive grace

mod common;

use common::{drive_happy_path, fixture, pid, pool8};
use matchroom::{Delivery, DraftFormat, ForceSignal, MatchEvent, MatchOutcome, RatingStore};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn silent_pool_auto_resolves_then_void_quorum_closes() {
    let mut fx = fixture();

    let mut run = tokio::spawn({
        let runner = Arc::clone(&fx.runner);
        async move { runner.run(pool8(), ForceSignal::new()).await }
    });

    // Nobody ever votes; every window lapses. Once the result-report
    // prompt opens, four void votes end the match.
    let record = loop {
        tokio::select! {
            result = &mut run => break result.unwrap().unwrap(),
            maybe = fx.prompts.recv() => {
                let open = maybe.expect("prompt stream closed mid-match");
                if open.request.purpose == "result report" {
                    // A captain among these four voids instantly and closes
                    // the prompt, so later sends may fail; that's fine.
                    for voter in ["p1", "p2", "p3", "p4"] {
                        open.choices
                            .send(matchroom::ObservedChoice::new(voter, "void"))
                            .await
                            .ok();
                    }
                } else {
                    drop(open);
                }
            }
        }
    };

    assert_eq!(record.outcome, MatchOutcome::Void);
    assert!(!record.forced);
    // Abstaining captains leave the format at the straight default.
    assert_eq!(record.format, Some(DraftFormat::Straight));
    // Six lapsed turns were auto-picked into full rosters.
    assert_eq!(record.picks.len(), 6);
    assert!(record.picks.iter().all(|p| p.auto));
    assert_eq!(record.team_a.unwrap().len(), 4);
    assert_eq!(record.team_b.unwrap().len(), 4);
    // Void: no deltas, nothing written.
    assert!(record.rating_deltas.is_empty());
    assert!(fx.store.snapshot().is_empty());
    assert!(fx.registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn force_terminate_mid_draft_voids_and_unlocks() {
    let mut fx = fixture();
    let force = ForceSignal::new();

    let mut run = tokio::spawn({
        let runner = Arc::clone(&fx.runner);
        let force = force.clone();
        async move { runner.run(pool8(), force).await }
    });

    // Drive up to the draft, then pull the plug on the first pick prompt.
    let record = loop {
        tokio::select! {
            result = &mut run => break result.unwrap().unwrap(),
            maybe = fx.prompts.recv() => {
                let open = maybe.expect("prompt stream closed mid-match");
                let purpose = open.request.purpose.clone();
                if purpose.starts_with("draft pick") {
                    force.terminate();
                    drop(open);
                } else {
                    // Let pre-draft decisions lapse to their defaults.
                    drop(open);
                }
            }
        }
    };

    assert_eq!(record.outcome, MatchOutcome::Void);
    assert!(record.forced);
    // Terminated before the draft finished: no rosters in the record.
    assert!(record.team_a.is_none());
    assert!(record.picks.is_empty());
    assert!(record.rating_deltas.is_empty());
    assert!(fx.store.snapshot().is_empty());
    assert!(fx.registry.is_empty());

    // A second terminate on a finished match is a harmless no-op.
    force.terminate();
}

#[tokio::test(start_paused = true)]
async fn locks_release_at_settlement_not_after_archive_grace() {
    let mut fx = fixture();
    let mut event_rx = fx.events.subscribe();

    let mut run = tokio::spawn({
        let runner = Arc::clone(&fx.runner);
        async move { runner.run(pool8(), ForceSignal::new()).await }
    });

    // Let every decision window lapse, then close the match with void
    // votes; once it settles, the pool must be free to queue again well
    // before the archive grace ends.
    let mut checked_at_settlement = false;
    let record = loop {
        tokio::select! {
            result = &mut run => break result.unwrap().unwrap(),
            maybe = fx.prompts.recv() => {
                let open = maybe.expect("prompt stream closed mid-match");
                if open.request.purpose == "result report" {
                    for voter in ["p1", "p2", "p3", "p4"] {
                        open.choices
                            .send(matchroom::ObservedChoice::new(voter, "void"))
                            .await
                            .ok();
                    }
                } else {
                    drop(open);
                }
            }
            event = event_rx.recv() => {
                if matches!(event.unwrap(), MatchEvent::MatchSettled { .. }) {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    assert!(
                        fx.registry.is_empty(),
                        "participants still locked after settlement"
                    );
                    checked_at_settlement = true;
                }
            }
        }
    };

    assert!(checked_at_settlement);
    assert_eq!(record.outcome, MatchOutcome::Void);
    assert!(fx.registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_moves_fall_back_to_notifications() {
    let mut fx = fixture();
    fx.presenter.set_fail_moves(true);

    let mut run = tokio::spawn({
        let runner = Arc::clone(&fx.runner);
        async move { runner.run(pool8(), ForceSignal::new()).await }
    });
    let record = drive_happy_path(&mut fx.prompts, &mut run).await.unwrap();

    assert_eq!(record.outcome, MatchOutcome::TeamAWin);
    assert!(fx.presenter.moves().is_empty());
    let deliveries = fx.presenter.deliveries();
    for participant in pool8() {
        assert!(deliveries.iter().any(|d| matches!(
            d,
            Delivery::Notice { participant: p, message }
                if *p == participant && message.contains("join")
        )));
    }
}

#[tokio::test(start_paused = true)]
async fn failed_rating_write_never_unsettles_the_match() {
    let mut fx = fixture();
    let mut event_rx = fx.events.subscribe();
    fx.store.fail_next_write();

    let mut run = tokio::spawn({
        let runner = Arc::clone(&fx.runner);
        async move { runner.run(pool8(), ForceSignal::new()).await }
    });
    let record = drive_happy_path(&mut fx.prompts, &mut run).await.unwrap();

    // Settlement stands even though the write failed.
    assert_eq!(record.outcome, MatchOutcome::TeamAWin);
    assert!(record.rating_deltas.is_empty());
    assert!(fx.store.snapshot().is_empty());
    assert!(fx.registry.is_empty());

    let mut types = Vec::new();
    while let Ok(event) = event_rx.try_recv() {
        types.push(event.event_type());
    }
    assert!(types.contains(&"match_settled"));
    assert!(types.contains(&"persistence_failure"));
    assert!(!types.contains(&"ratings_applied"));
    assert!(types.contains(&"match_archived"));

    // The failure was announced in the match room.
    assert!(fx.presenter.deliveries().iter().any(|d| matches!(
        d,
        Delivery::Announcement { message, .. } if message.contains("could not be saved")
    )));

    // The next match writes fine.
    let next = fx.store.get_rating(&pid("p1")).await.unwrap();
    assert!(next.is_none());
}
