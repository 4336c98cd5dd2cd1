//! `sockio`: connect to a server, optionally emit or request once, and
//! print the events it sends back.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use clap::Parser;
use serde_json::Value;
use sockio_core::logging::init_subscriber;
use sockio_session::{Client, EventHandler, InvokeError, Session};
use sockio_settings::{DispatchMode, SockioSettings, get_settings, load_settings_from_path};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "sockio", about = "Talk to a socket.io v2 (EIO=3) server over WebSocket")]
struct Args {
    /// WebSocket URL, e.g. `ws://localhost:3000/socket.io/?EIO=3&transport=websocket`.
    url: String,

    /// Emit this event after the handshake.
    #[arg(long, conflicts_with = "ack")]
    emit: Option<String>,

    /// Send this event as an acknowledged request and print the reply.
    #[arg(long)]
    ack: Option<String>,

    /// JSON arguments for `--emit` / `--ack`.
    #[arg(long)]
    args: Option<String>,

    /// Print every inbound event with this name. Repeatable.
    #[arg(long = "watch")]
    watch: Vec<String>,

    /// Seconds to stay connected after the request completes.
    #[arg(long, default_value_t = 0)]
    linger: u64,

    /// Seconds to wait for the handshake and for an ack reply.
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    /// Run handlers one at a time in arrival order.
    #[arg(long, default_value_t = false)]
    serialized: bool,

    /// Settings file to load instead of `~/.sockio/settings.json`.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log filter; `RUST_LOG` wins when set.
    #[arg(long)]
    log_level: Option<String>,
}

/// Prints the raw arguments of a watched event.
struct PrintEvent {
    method: String,
}

#[async_trait]
impl EventHandler for PrintEvent {
    fn takes_args(&self) -> bool {
        true
    }

    fn returns_value(&self) -> bool {
        false
    }

    async fn invoke(&self, _session: Session, args: &str) -> Result<Option<Value>, InvokeError> {
        println!("{} {}", self.method, if args.is_empty() { "-" } else { args });
        Ok(None)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings: SockioSettings = match &args.settings {
        Some(path) => load_settings_from_path(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => get_settings().clone(),
    };
    if args.serialized {
        settings.session.dispatch_mode = DispatchMode::Serialized;
    }
    init_subscriber(args.log_level.as_deref().unwrap_or(&settings.logging.level));

    let payload = parse_args(args.args.as_deref())?;
    let timeout = Duration::from_secs(args.timeout);

    let client = Client::from_settings(&settings);
    for method in &args.watch {
        let _ = client.on_handler(method, PrintEvent { method: method.clone() });
    }
    let (connected_tx, mut connected) = mpsc::unbounded_channel();
    let _ = client.on_connect(move |s: &Session| {
        let _ = connected_tx.send(s.id());
    });

    let (session, tasks) = client
        .connect_url(&args.url)
        .await
        .with_context(|| format!("failed to connect to {}", args.url))?;

    let sid = tokio::time::timeout(timeout, connected.recv())
        .await
        .context("timed out waiting for the handshake")?
        .context("session closed before the handshake")?;
    info!(sid = %sid, peer = %session.peer(), "connected");

    if let Some(method) = &args.emit {
        match &payload {
            Some(value) => session.emit(method, value)?,
            None => session.emit_bare(method)?,
        }
    }
    if let Some(method) = &args.ack {
        let reply = session
            .ack(method, &payload.unwrap_or(Value::Null), timeout)
            .await
            .with_context(|| format!("request {method} failed"))?;
        println!("{reply}");
    }

    if args.linger > 0 {
        tokio::select! {
            () = session.closed() => warn!("server closed the session"),
            () = tokio::time::sleep(Duration::from_secs(args.linger)) => {}
        }
    }

    client.close();
    tasks.join().await?;
    if let Some(cause) = session.shutdown_cause().filter(|c| !c.is_clean()) {
        bail!("session ended: {cause}");
    }
    Ok(())
}

fn parse_args(raw: Option<&str>) -> Result<Option<Value>> {
    raw.map(|text| serde_json::from_str(text).with_context(|| format!("--args is not valid JSON: {text}")))
        .transpose()
}
