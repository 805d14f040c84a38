//! Shared fixtures: a channel-backed presenter, an in-memory store, and a
//! scripted driver that plays one fixed match from the host side.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use matchroom::{
    ChannelPresenter, EventBus, MatchConfig, MatchRecord, MatchResult, MatchRunner, MemoryStore,
    ObservedChoice, OpenPrompt, ParticipantId, ParticipantRegistry, PromptScope, SharedEventBus,
};

pub fn pid(s: &str) -> ParticipantId {
    ParticipantId::new(s)
}

pub fn pool8() -> Vec<ParticipantId> {
    (1..=8).map(|i| pid(&format!("p{}", i))).collect()
}

pub struct Fixture {
    pub presenter: Arc<ChannelPresenter>,
    pub prompts: mpsc::Receiver<OpenPrompt>,
    pub store: Arc<MemoryStore>,
    pub registry: Arc<ParticipantRegistry>,
    pub events: SharedEventBus,
    pub runner: Arc<MatchRunner<ChannelPresenter, MemoryStore>>,
}

pub fn fixture() -> Fixture {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();

    let (presenter, prompts) = ChannelPresenter::new(64);
    let presenter = Arc::new(presenter);
    let store = MemoryStore::new().shared();
    let registry = ParticipantRegistry::new().shared();
    let events: SharedEventBus = Arc::new(EventBus::new());
    let runner = Arc::new(MatchRunner::new(
        Arc::clone(&presenter),
        Arc::clone(&store),
        Arc::clone(&registry),
        Arc::clone(&events),
        MatchConfig::default(),
    ));
    Fixture {
        presenter,
        prompts,
        store,
        registry,
        events,
        runner,
    }
}

async fn answer(open: &OpenPrompt, voter: &str, option: &str) {
    open.choices
        .send(ObservedChoice::new(voter, option))
        .await
        .expect("prompt closed before the scripted answer");
}

/// Play the fixed happy-path script against the runner:
///
/// - captain vote: p1 leads (4 votes), p2 second (3) → captains {p1, p2};
/// - pick-order duel: p1 rock beats p2 scissors → p1 is Captain A;
/// - format: both captains vote snake;
/// - snake draft, all manual: A p3 | B p4, p5 | A p6, p7 | B p8;
/// - settlement: after the move countdown, p3/p4/p5 report a Team A win.
pub async fn drive_happy_path(
    prompts: &mut mpsc::Receiver<OpenPrompt>,
    run: &mut JoinHandle<MatchResult<MatchRecord>>,
) -> MatchResult<MatchRecord> {
    let captain_votes = [
        ("p1", "p2"),
        ("p2", "p1"),
        ("p3", "p1"),
        ("p4", "p1"),
        ("p5", "p1"),
        ("p6", "p2"),
        ("p7", "p2"),
        ("p8", "p3"),
    ];
    let mut draft_script = [
        ("p1", "p3"),
        ("p2", "p4"),
        ("p2", "p5"),
        ("p1", "p6"),
        ("p1", "p7"),
        ("p2", "p8"),
    ]
    .into_iter();

    loop {
        tokio::select! {
            result = &mut *run => return result.expect("runner task panicked"),
            maybe = prompts.recv() => {
                let open = maybe.expect("prompt stream closed mid-match");
                let purpose = open.request.purpose.clone();
                if purpose == "captain vote" {
                    for (voter, choice) in captain_votes {
                        answer(&open, voter, choice).await;
                    }
                } else if purpose.starts_with("duel:") {
                    let PromptScope::Direct(target) = open.request.scope.clone() else {
                        panic!("duel prompts must be direct");
                    };
                    let gesture = if target == pid("p1") { "rock" } else { "scissors" };
                    answer(&open, target.as_str(), gesture).await;
                } else if purpose == "draft format" {
                    answer(&open, "p1", "snake").await;
                    answer(&open, "p2", "snake").await;
                } else if purpose.starts_with("draft pick") {
                    let (voter, choice) = draft_script.next().expect("too many draft turns");
                    answer(&open, voter, choice).await;
                } else if purpose == "result report" {
                    // Let the move countdown elapse so the mover runs first.
                    tokio::time::sleep(Duration::from_secs(61)).await;
                    for voter in ["p3", "p4", "p5"] {
                        answer(&open, voter, "report_team_a").await;
                    }
                } else {
                    panic!("unexpected prompt: {}", purpose);
                }
            }
        }
    }
}
