#![forbid(unsafe_code)]

//! `afd-webui-watch`: terminal companion for `afd-webui`.
//!
//! Subscribes to live host status on `/ctrl` and prints every broadcast as
//! one JSON line, reconnecting across transient disconnects. With `--once`
//! it sends a single alias command and exits.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use afd_webui::client::{
    send_alias_command, CommandOutcome, Flow, Outcome, ReconnectPolicy, ReconnectSupervisor,
    SessionHandler, WsConnector,
};

/// How long `--once` waits for a failure echo.
const ECHO_WINDOW: Duration = Duration::from_secs(2);

#[derive(Debug, Parser)]
#[command(
    name = "afd-webui-watch",
    about = "Watch AFD host status from the terminal",
    version,
    long_about = None
)]
struct Cli {
    /// Control endpoint of the server.
    #[arg(long, default_value = "ws://127.0.0.1:8040/ctrl")]
    url: String,

    /// Send one alias command (`start`, `stop`, `able`, `debug`, `switch`,
    /// `retry`, ...) for the given aliases and exit.
    #[arg(long, num_args = 2.., value_names = ["ACTION", "ALIAS"])]
    once: Option<Vec<String>>,

    /// Stop after this many status broadcasts.
    #[arg(long)]
    count: Option<u64>,
}

/// Prints live status broadcasts.
struct StatusPrinter {
    remaining: Option<u64>,
}

impl SessionHandler for StatusPrinter {
    fn on_open(&mut self) -> Vec<String> {
        vec![json!({ "class": "fsa", "action": "start" }).to_string()]
    }

    fn on_message(&mut self, text: &str) -> Flow {
        let Ok(message) = serde_json::from_str::<Value>(text) else {
            eprintln!("unparseable frame: {text}");
            return Flow::Continue;
        };
        if message.get("class").and_then(Value::as_str) != Some("fsa") {
            eprintln!("{message}");
            return Flow::Continue;
        }
        println!("{}", message.get("data").unwrap_or(&Value::Null));

        match self.remaining.as_mut() {
            Some(left) if *left <= 1 => Flow::Stop,
            Some(left) => {
                *left -= 1;
                Flow::Continue
            }
            None => Flow::Continue,
        }
    }
}

fn main() -> ExitCode {
    let args = Cli::parse();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("failed to build tokio runtime: {err}");
            return ExitCode::FAILURE;
        }
    };
    runtime.block_on(run(args))
}

async fn run(args: Cli) -> ExitCode {
    let connector = WsConnector::new(args.url);

    if let Some(once) = args.once {
        return send_once(&connector, &once).await;
    }

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        signal_cancel.cancel();
    });

    let supervisor = ReconnectSupervisor::new(connector, ReconnectPolicy::default());
    let mut printer = StatusPrinter {
        remaining: args.count,
    };
    match supervisor.run(&mut printer, cancel).await {
        Outcome::Cancelled | Outcome::Stopped => ExitCode::SUCCESS,
        Outcome::GivenUp => {
            eprintln!("Connection to server lost. Reconnect failed, giving up.");
            ExitCode::FAILURE
        }
    }
}

async fn send_once(connector: &WsConnector, once: &[String]) -> ExitCode {
    let Some((action, aliases)) = once.split_first() else {
        eprintln!("--once needs an action and at least one alias");
        return ExitCode::FAILURE;
    };
    match send_alias_command(connector, action, aliases, ECHO_WINDOW).await {
        Ok(CommandOutcome::Accepted) => {
            println!("OK");
            ExitCode::SUCCESS
        }
        Ok(CommandOutcome::Rejected { status }) => {
            eprintln!("{action} failed for {}: status {status}", aliases.join(" "));
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("{action} not sent to {}: {err}", connector.url());
            ExitCode::FAILURE
        }
    }
}
