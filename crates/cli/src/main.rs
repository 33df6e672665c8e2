//! rtcall - run scripted call scenarios between in-memory peers
//!
//! Three users (alice, bob, carol) are logged in against a loopback hub.
//! Each scenario drives their sessions through one call flow and prints
//! every `CallEvent` as a JSON line, followed by the signaling notices that
//! crossed the relay.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use rtcall_infra_common::{log_welcome, parse_log_level, setup_logging, LoggingConfig};
use rtcall_session_core::loopback::LoopbackHub;
use rtcall_session_core::{CallSession, CallSessionConfig, CallStatus, MediaKind, SessionRegistry};
use tokio::task::JoinHandle;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// alice calls bob, bob answers, alice hangs up
    Connect,
    /// alice calls bob and nobody answers
    Missed,
    /// alice calls bob and bob declines
    Decline,
    /// carol calls bob while bob is on a call with alice
    Busy,
}

#[derive(Parser, Debug)]
#[command(name = "rtcall", version, about = "Drive loopback peers through call scenarios")]
struct Args {
    /// Scenario to run
    #[arg(value_enum, default_value = "connect")]
    scenario: Scenario,

    /// Media kind (audio or video)
    #[arg(short, long, default_value = "audio")]
    kind: MediaKind,

    /// Override the ring timeout in milliseconds
    #[arg(short = 't', long, env = "RTCALL_RING_TIMEOUT_MS")]
    ring_timeout_ms: Option<u64>,

    /// How long a connected call is held before hanging up, in milliseconds
    #[arg(long, default_value = "1500")]
    hold_ms: u64,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut logging = LoggingConfig::new(parse_log_level(&args.log_level)?, "rtcall");
    if args.json_logs {
        logging = logging.with_json();
    }
    setup_logging(logging)?;
    log_welcome("rtcall", env!("CARGO_PKG_VERSION"));

    let mut config = CallSessionConfig::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(ms) = args.ring_timeout_ms {
        config.ring_timeout_ms = ms;
    }
    config.validate()?;

    let hub = LoopbackHub::new();
    let registry = SessionRegistry::new();
    let mut tracers = Vec::new();

    let mut login = |name: &str| -> Result<CallSession> {
        let endpoint = hub.endpoint(name);
        let session = registry.login(endpoint.user.clone(), endpoint.collaborators(), config.clone())?;
        tracers.push(trace_events(&session));
        Ok(session)
    };
    let alice = login("alice")?;
    let bob = login("bob")?;
    let carol = login("carol")?;

    // Ringing may take up to the ring timeout before anything settles
    let settle = config.ring_timeout() + Duration::from_secs(2);
    let hold = Duration::from_millis(args.hold_ms);

    info!("Running {:?} scenario ({} call)", args.scenario, args.kind);
    alice.unlock_audio().await?;
    bob.unlock_audio().await?;

    match args.scenario {
        Scenario::Connect => {
            connect(&alice, &bob, args.kind, settle).await?;
            tokio::time::sleep(hold).await;
            alice.end_call().await?;
            wait_for(&alice, CallStatus::Idle, settle).await?;
            wait_for(&bob, CallStatus::Idle, settle).await?;
        }
        Scenario::Missed => {
            alice.start_call("bob", args.kind).await?;
            wait_for(&bob, CallStatus::Ringing, settle).await?;
            wait_for(&alice, CallStatus::Idle, settle).await?;
            wait_for(&bob, CallStatus::Idle, settle).await?;
        }
        Scenario::Decline => {
            alice.start_call("bob", args.kind).await?;
            wait_for(&bob, CallStatus::Ringing, settle).await?;
            bob.decline_call().await?;
            wait_for(&alice, CallStatus::Idle, settle).await?;
        }
        Scenario::Busy => {
            connect(&alice, &bob, args.kind, settle).await?;
            carol.start_call("bob", args.kind).await?;
            wait_for(&carol, CallStatus::Idle, settle).await?;
            if bob.snapshot().status != CallStatus::Connected {
                bail!("bob lost the first call while rejecting carol");
            }
            alice.end_call().await?;
            wait_for(&bob, CallStatus::Idle, settle).await?;
        }
    }

    for user in registry.users() {
        registry.logout(&user).await?;
    }
    // Tracers finish once every handle to the event channels is gone
    drop((alice, bob, carol));
    for tracer in tracers {
        let _ = tracer.await;
    }

    println!("--- signaling ---");
    for message in hub.relayed() {
        println!("{} -> {}: {} {}", message.from, message.to, message.event, message.payload);
    }
    Ok(())
}

/// alice calls bob and bob answers
async fn connect(caller: &CallSession, callee: &CallSession, kind: MediaKind, settle: Duration) -> Result<()> {
    caller.start_call(callee.local_user().clone(), kind).await?;
    wait_for(callee, CallStatus::Ringing, settle).await?;
    callee.accept_call().await?;
    wait_for(caller, CallStatus::Connected, settle).await?;
    Ok(())
}

async fn wait_for(session: &CallSession, status: CallStatus, limit: Duration) -> Result<()> {
    let mut rx = session.watch();
    tokio::time::timeout(limit, rx.wait_for(|snapshot| snapshot.status == status))
        .await
        .with_context(|| format!("{} never reached {}", session.local_user(), status))?
        .context("session stopped")?;
    Ok(())
}

/// Print every event of `session` as a JSON line until it shuts down
fn trace_events(session: &CallSession) -> JoinHandle<()> {
    let mut events = session.subscribe();
    let user = session.local_user().clone();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => println!("[{}] {}", user, json),
                    Err(e) => eprintln!("[{}] unserializable event: {}", user, e),
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    eprintln!("[{}] skipped {} events", user, n)
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
