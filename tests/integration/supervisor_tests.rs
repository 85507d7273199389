//! Reconnect supervisor against a scripted connector: bounded retries,
//! heartbeat timeout and counter reset on a successful open.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use afd_webui::client::supervisor::BoxFuture;
use afd_webui::client::{
    ClientFrame, Connection, Connector, Flow, Outcome, ReconnectPolicy, ReconnectSupervisor,
    SessionHandler, SupervisorState,
};
use afd_webui::{AppError, Result};

/// One scripted connect attempt.
enum Attempt {
    Fail,
    /// Frames delivered after their delay; the connection then stays silent.
    Open(Vec<(Duration, ClientFrame)>),
}

#[derive(Default)]
struct Log {
    sent: Mutex<Vec<String>>,
    closes: AtomicUsize,
}

struct ScriptedConnector {
    script: Mutex<VecDeque<Attempt>>,
    attempts: AtomicUsize,
    log: Arc<Log>,
}

impl ScriptedConnector {
    fn new(script: Vec<Attempt>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            attempts: AtomicUsize::new(0),
            log: Arc::new(Log::default()),
        }
    }
}

impl Connector for ScriptedConnector {
    fn connect(&self) -> BoxFuture<'_, Result<Box<dyn Connection>>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front().unwrap_or(Attempt::Fail);
        let log = Arc::clone(&self.log);
        Box::pin(async move {
            match next {
                Attempt::Fail => Err(AppError::Session("connection refused".into())),
                Attempt::Open(frames) => Ok(Box::new(ScriptedConnection {
                    frames: frames.into(),
                    log,
                }) as Box<dyn Connection>),
            }
        })
    }
}

struct ScriptedConnection {
    frames: VecDeque<(Duration, ClientFrame)>,
    log: Arc<Log>,
}

impl Connection for ScriptedConnection {
    fn send_text(&mut self, text: String) -> BoxFuture<'_, Result<()>> {
        self.log.sent.lock().unwrap().push(text);
        Box::pin(async { Ok(()) })
    }

    fn next_frame(&mut self) -> BoxFuture<'_, Option<Result<ClientFrame>>> {
        let next = self.frames.pop_front();
        Box::pin(async move {
            match next {
                Some((delay, frame)) => {
                    tokio::time::sleep(delay).await;
                    Some(Ok(frame))
                }
                None => std::future::pending().await,
            }
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }
}

#[derive(Default)]
struct Recorder {
    opened: usize,
    messages: Vec<String>,
    stop_after: Option<usize>,
}

impl SessionHandler for Recorder {
    fn on_open(&mut self) -> Vec<String> {
        self.opened += 1;
        vec![json!({ "class": "fsa", "action": "start" }).to_string()]
    }

    fn on_message(&mut self, text: &str) -> Flow {
        self.messages.push(text.to_owned());
        match self.stop_after {
            Some(n) if self.messages.len() >= n => Flow::Stop,
            _ => Flow::Continue,
        }
    }
}

fn policy(max_attempts: u32) -> ReconnectPolicy {
    ReconnectPolicy {
        max_attempts,
        ..ReconnectPolicy::default()
    }
}

// ── Bounded retry ───────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn gives_up_after_ten_failures_without_an_eleventh_attempt() {
    let connector = Arc::new(ScriptedConnector::new(Vec::new()));
    let supervisor = ReconnectSupervisor::new(Arc::clone(&connector), ReconnectPolicy::default());
    let state = supervisor.state();
    let started = Instant::now();

    let outcome = supervisor
        .run(&mut Recorder::default(), CancellationToken::new())
        .await;

    assert_eq!(outcome, Outcome::GivenUp);
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 10);
    assert_eq!(started.elapsed(), Duration::from_secs(90), "fixed 10 s between attempts");
    assert_eq!(*state.borrow(), SupervisorState::GivenUp);

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 10);
}

#[tokio::test(start_paused = true)]
async fn successful_open_resets_the_attempt_counter() {
    let mut script: Vec<Attempt> = (0..5).map(|_| Attempt::Fail).collect();
    script.push(Attempt::Open(vec![(Duration::ZERO, ClientFrame::Close)]));
    let connector = Arc::new(ScriptedConnector::new(script));
    let supervisor = ReconnectSupervisor::new(Arc::clone(&connector), ReconnectPolicy::default());

    let outcome = supervisor
        .run(&mut Recorder::default(), CancellationToken::new())
        .await;

    assert_eq!(outcome, Outcome::GivenUp);
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 5 + 1 + 10);
}

#[tokio::test(start_paused = true)]
async fn reconnecting_state_counts_the_next_attempt() {
    let connector = Arc::new(ScriptedConnector::new(Vec::new()));
    let supervisor = ReconnectSupervisor::new(Arc::clone(&connector), policy(3));
    let mut state = supervisor.state();
    let watcher = tokio::spawn(async move {
        let mut seen = Vec::new();
        while state.changed().await.is_ok() {
            let current = *state.borrow_and_update();
            seen.push(current);
            if current == SupervisorState::GivenUp {
                break;
            }
        }
        seen
    });

    supervisor
        .run(&mut Recorder::default(), CancellationToken::new())
        .await;
    let seen = watcher.await.unwrap();

    assert!(seen.contains(&SupervisorState::Reconnecting { attempt: 2 }));
    assert!(seen.contains(&SupervisorState::Reconnecting { attempt: 3 }));
    assert!(!seen.contains(&SupervisorState::Reconnecting { attempt: 4 }));
    assert_eq!(seen.last(), Some(&SupervisorState::GivenUp));
}

// ── Heartbeat ───────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn silent_connection_is_closed_after_heartbeat_and_grace() {
    let connector = Arc::new(ScriptedConnector::new(vec![Attempt::Open(Vec::new())]));
    let supervisor = ReconnectSupervisor::new(Arc::clone(&connector), policy(1));
    let started = Instant::now();

    let outcome = supervisor
        .run(&mut Recorder::default(), CancellationToken::new())
        .await;

    assert_eq!(outcome, Outcome::GivenUp);
    assert_eq!(connector.log.closes.load(Ordering::SeqCst), 1);
    // 11 s of silence, then one retry after 10 s.
    assert_eq!(started.elapsed(), Duration::from_secs(21));
}

#[tokio::test(start_paused = true)]
async fn inbound_activity_resets_the_heartbeat_deadline() {
    let frames = vec![
        (Duration::from_secs(6), ClientFrame::Ping),
        (Duration::from_secs(6), ClientFrame::Text("{\"class\":\"fsa\",\"data\":[]}".into())),
        (Duration::from_secs(6), ClientFrame::Ping),
    ];
    let connector = Arc::new(ScriptedConnector::new(vec![Attempt::Open(frames)]));
    let supervisor = ReconnectSupervisor::new(Arc::clone(&connector), policy(1));
    let mut recorder = Recorder::default();
    let started = Instant::now();

    supervisor.run(&mut recorder, CancellationToken::new()).await;

    assert_eq!(recorder.messages.len(), 1);
    // last activity at 18 s, timeout 11 s later, one retry after 10 s
    assert_eq!(started.elapsed(), Duration::from_secs(18 + 11 + 10));
}

// ── Open hook and termination ───────────────────────────────

#[tokio::test(start_paused = true)]
async fn subscription_is_sent_on_every_open() {
    let connector = Arc::new(ScriptedConnector::new(vec![
        Attempt::Open(vec![(Duration::ZERO, ClientFrame::Close)]),
        Attempt::Open(vec![(Duration::ZERO, ClientFrame::Close)]),
    ]));
    let supervisor = ReconnectSupervisor::new(Arc::clone(&connector), policy(1));
    let mut recorder = Recorder::default();

    supervisor.run(&mut recorder, CancellationToken::new()).await;

    assert_eq!(recorder.opened, 2);
    let sent = connector.log.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 2);
    for frame in sent {
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, json!({ "class": "fsa", "action": "start" }));
    }
}

#[tokio::test(start_paused = true)]
async fn handler_stop_ends_the_run() {
    let connector = Arc::new(ScriptedConnector::new(vec![Attempt::Open(vec![(
        Duration::from_secs(1),
        ClientFrame::Text("{}".into()),
    )])]));
    let supervisor = ReconnectSupervisor::new(Arc::clone(&connector), ReconnectPolicy::default());
    let state = supervisor.state();
    let mut recorder = Recorder {
        stop_after: Some(1),
        ..Recorder::default()
    };

    let outcome = supervisor.run(&mut recorder, CancellationToken::new()).await;

    assert_eq!(outcome, Outcome::Stopped);
    assert_eq!(connector.log.closes.load(Ordering::SeqCst), 1);
    assert_eq!(*state.borrow(), SupervisorState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_pending_retries() {
    let connector = Arc::new(ScriptedConnector::new(Vec::new()));
    let supervisor = ReconnectSupervisor::new(Arc::clone(&connector), ReconnectPolicy::default());
    let state = supervisor.state();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(15)).await;
        trigger.cancel();
    });

    let outcome = supervisor.run(&mut Recorder::default(), cancel).await;

    assert_eq!(outcome, Outcome::Cancelled);
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
    assert_eq!(*state.borrow(), SupervisorState::Disconnected);
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
}
