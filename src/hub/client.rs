// src/hub/client.rs

//! Reconnecting websocket client towards the dashboard hub.
//!
//! A background task owns the socket. It connects to the first
//! reachable candidate endpoint, pushes outbound events and a periodic
//! `Alive` heartbeat, forwards streamed log lines, and hands inbound
//! retry commands to the processor. A lost connection never blocks the
//! engine: outbound events are dropped while disconnected and the task
//! reconnects with stepped backoff.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::hub::protocol::{InboundMessage, OutboundMessage};

/// Environment variable overriding the hub endpoint.
pub const WEBUI_URL_ENV: &str = "FILEJOBROUTER_WEBUI_URL";

/// Development endpoints tried after the environment override.
const DEV_URLS: &[&str] = &[
    "ws://127.0.0.1:5187/dispatchhub",
    "ws://localhost:5187/dispatchhub",
];

/// Reconnect backoff steps; the last step repeats.
const BACKOFF_STEPS: &[Duration] = &[
    Duration::ZERO,
    Duration::from_secs(2),
    Duration::from_secs(10),
    Duration::from_secs(30),
];

/// Heartbeat period for `system_status("Alive")`.
const HEARTBEAT_PERIOD: Duration = Duration::from_secs(5);

/// Capacity of the outbound event channel. Overflow drops events at
/// the sender, which is the contract: the dashboard is an observer.
const OUTBOUND_CAPACITY: usize = 256;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Cheap cloneable handle the engine components use to emit events.
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<OutboundMessage>,
}

impl HubHandle {
    /// Fire-and-forget send. A full or closed channel logs at debug and
    /// drops the event.
    pub fn send(&self, message: OutboundMessage) {
        if let Err(err) = self.tx.try_send(message) {
            debug!(error = %err, "dropping hub event (disconnected or backlogged)");
        }
    }

    /// Create a handle backed by a plain channel, without a client
    /// task. The receiver sees exactly what a connected hub would.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

/// Spawn the hub client task.
///
/// - `retry_tx` receives job ids from inbound retry commands.
/// - `log_rx` is the logging broadcast; lines are forwarded as
///   `log_update` events.
pub fn spawn_hub_client(
    retry_tx: mpsc::Sender<String>,
    log_rx: broadcast::Receiver<String>,
    cancel: CancellationToken,
) -> HubHandle {
    let (handle, rx) = HubHandle::channel(OUTBOUND_CAPACITY);

    tokio::spawn(client_task(rx, retry_tx, log_rx, cancel));

    handle
}

fn candidate_urls() -> Vec<String> {
    let mut urls = Vec::new();
    if let Ok(url) = std::env::var(WEBUI_URL_ENV) {
        if !url.trim().is_empty() {
            urls.push(url);
        }
    }
    urls.extend(DEV_URLS.iter().map(|s| s.to_string()));
    urls
}

async fn client_task(
    mut outbound_rx: mpsc::Receiver<OutboundMessage>,
    retry_tx: mpsc::Sender<String>,
    mut log_rx: broadcast::Receiver<String>,
    cancel: CancellationToken,
) {
    let urls = candidate_urls();
    let mut attempt: usize = 0;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let mut connected = None;
        for url in &urls {
            debug!(url = %url, "connecting to dashboard hub");
            match connect_async(url.as_str()).await {
                Ok((ws, _response)) => {
                    info!(url = %url, "dashboard hub connected");
                    connected = Some(ws);
                    break;
                }
                Err(err) => {
                    debug!(url = %url, error = %err, "hub connection failed");
                }
            }
        }

        match connected {
            Some(ws) => {
                attempt = 0;
                let events_open =
                    run_session(ws, &mut outbound_rx, &retry_tx, &mut log_rx, &cancel).await;
                if cancel.is_cancelled() || !events_open {
                    break;
                }
                warn!("dashboard hub session ended; reconnecting");
            }
            None => {
                let step = BACKOFF_STEPS[attempt.min(BACKOFF_STEPS.len() - 1)];
                attempt = attempt.saturating_add(1);
                debug!(backoff_secs = step.as_secs(), "all hub endpoints unreachable");
                if !disconnected_wait(step, &mut outbound_rx, &mut log_rx, &cancel).await {
                    break;
                }
            }
        }
    }

    debug!("hub client task exiting");
}

/// Wait out a backoff step, draining (and dropping) outbound traffic so
/// the channel never backs up against the processor while disconnected.
/// Returns false when cancelled.
async fn disconnected_wait(
    step: Duration,
    outbound_rx: &mut mpsc::Receiver<OutboundMessage>,
    log_rx: &mut broadcast::Receiver<String>,
    cancel: &CancellationToken,
) -> bool {
    let sleep = tokio::time::sleep(step);
    tokio::pin!(sleep);
    let mut logs_open = true;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = &mut sleep => return true,
            msg = outbound_rx.recv() => {
                if msg.is_none() {
                    return false;
                }
                // Dropped silently: no connection to carry it.
            }
            res = log_rx.recv(), if logs_open => {
                if matches!(res, Err(broadcast::error::RecvError::Closed)) {
                    logs_open = false;
                }
            }
        }
    }
}

/// Drive one connected session until the socket drops or the engine is
/// cancelled. Returns false when the outbound event channel itself has
/// closed, meaning no component will ever emit again.
async fn run_session(
    ws: WsStream,
    outbound_rx: &mut mpsc::Receiver<OutboundMessage>,
    retry_tx: &mpsc::Sender<String>,
    log_rx: &mut broadcast::Receiver<String>,
    cancel: &CancellationToken,
) -> bool {
    let (mut sink, mut stream) = ws.split();
    let mut heartbeat = tokio::time::interval(HEARTBEAT_PERIOD);
    let mut logs_open = true;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return true;
            }

            _ = heartbeat.tick() => {
                let alive = OutboundMessage::system_status("Alive", "");
                if !send_message(&mut sink, &alive).await {
                    return true;
                }
            }

            event = outbound_rx.recv() => {
                match event {
                    Some(msg) => {
                        if !send_message(&mut sink, &msg).await {
                            return true;
                        }
                    }
                    None => return false,
                }
            }

            line = log_rx.recv(), if logs_open => {
                match line {
                    Ok(line) => {
                        let msg = OutboundMessage::log_update(line);
                        if !send_message(&mut sink, &msg).await {
                            return true;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "log stream lagged; dropping lines");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        logs_open = false;
                    }
                }
            }

            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_incoming(retry_tx, &text).await;
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        // Handled by tungstenite.
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(?frame, "dashboard hub closed the connection");
                        return true;
                    }
                    Some(Ok(_)) => {
                        // Binary / raw frames from the hub are ignored.
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, "hub receive error");
                        return true;
                    }
                    None => {
                        info!("hub stream exhausted");
                        return true;
                    }
                }
            }
        }
    }
}

/// Serialize and push one frame. Returns false when the socket is gone.
async fn send_message<S>(sink: &mut S, message: &OutboundMessage) -> bool
where
    S: SinkExt<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let json = match serde_json::to_string(message) {
        Ok(j) => j,
        Err(err) => {
            warn!(error = %err, "failed to serialize hub message");
            return true;
        }
    };

    match sink.send(Message::Text(json)).await {
        Ok(()) => true,
        Err(err) => {
            warn!(error = %err, "failed to send hub message");
            false
        }
    }
}

/// Parse and dispatch one inbound frame from the dashboard.
async fn handle_incoming(retry_tx: &mpsc::Sender<String>, text: &str) {
    match serde_json::from_str::<InboundMessage>(text) {
        Ok(InboundMessage::ReceiveRetryJobCommand { job_id }) => {
            info!(job_id = %job_id, "retry command received from dashboard");
            if let Err(err) = retry_tx.send(job_id).await {
                warn!(error = %err, "processor retry channel closed; dropping command");
            }
        }
        Err(err) => {
            warn!(error = %err, raw = %text, "unknown or malformed hub message");
        }
    }
}
