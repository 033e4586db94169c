// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! WebSocket transport channel
//!
//! Long-lived duplex connection to the processing service. Owns the
//! connect/send/receive/close lifecycle and the channel state machine:
//!
//! `Connecting --(peer accepts)--> Open --(close / peer close / error)--> Closed`
//!
//! `Closing` is a transient step between a local close request and `Closed`.
//! Sends issued while the channel is not Open are dropped silently (counted,
//! never queued). Inbound text is delivered to the registered handler in
//! arrival order. There is no automatic reconnection: once Closed, a channel
//! stays Closed until the owner rebuilds the pipeline with a fresh one.
//!
//! Failures during establishment surface through the `Result` returned by
//! [`TransportChannel::connect`]; the registered observers cover events after
//! the channel is open.

use crate::core::{PipelineError, Result};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

/// Transport channel lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closing,
    Closed,
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

type ReadyCallback = Box<dyn FnOnce() + Send>;
type MessageHandler = Arc<dyn Fn(&str) + Send + Sync>;
type ErrorObserver = Arc<dyn Fn(&PipelineError) + Send + Sync>;
type CloseObserver = Arc<dyn Fn() + Send + Sync>;

struct ChannelShared {
    state: Mutex<ChannelState>,
    /// One-shot connect guard; a channel never dials twice.
    started: AtomicBool,
    /// Close observers fire at most once per connection.
    close_notified: AtomicBool,
    /// Sends suppressed while the channel was not Open.
    dropped: AtomicU64,
    on_ready: Mutex<Option<ReadyCallback>>,
    on_message: Mutex<Option<MessageHandler>>,
    on_error: Mutex<Option<ErrorObserver>>,
    on_close: Mutex<Option<CloseObserver>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    writer_task: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelShared {
    fn state(&self) -> ChannelState {
        *self.state.lock()
    }

    fn locally_closing(&self) -> bool {
        matches!(self.state(), ChannelState::Closing | ChannelState::Closed)
    }

    /// Hands one inbound text message to the registered handler.
    fn deliver(&self, text: &str) {
        let handler = self.on_message.lock().clone();
        match handler {
            Some(handler) => handler(text),
            None => debug!("[Channel] inbound message with no handler registered; dropping"),
        }
    }

    fn report_error(&self, error: &PipelineError) {
        if let Some(observer) = self.on_error.lock().clone() {
            observer(error);
        }
    }

    /// Final transition. Drops the outbound sender (which lets the writer
    /// drain and run the closing handshake) and notifies the close observer
    /// exactly once.
    fn transition_closed(&self) {
        *self.state.lock() = ChannelState::Closed;
        self.outbound.lock().take();
        if !self.close_notified.swap(true, Ordering::SeqCst) {
            debug!("[Channel] state -> Closed");
            if let Some(observer) = self.on_close.lock().clone() {
                observer();
            }
        }
    }
}

/// Message-oriented duplex connection to the processing peer.
///
/// Cheap to clone; clones share the same underlying channel. At most one
/// connection is ever live per channel instance.
#[derive(Clone)]
pub struct TransportChannel {
    shared: Arc<ChannelShared>,
}

impl TransportChannel {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(ChannelShared {
                state: Mutex::new(ChannelState::Closed),
                started: AtomicBool::new(false),
                close_notified: AtomicBool::new(false),
                dropped: AtomicU64::new(0),
                on_ready: Mutex::new(None),
                on_message: Mutex::new(None),
                on_error: Mutex::new(None),
                on_close: Mutex::new(None),
                outbound: Mutex::new(None),
                reader_task: Mutex::new(None),
                writer_task: Mutex::new(None),
            }),
        }
    }

    /// Registers the callback fired exactly once when the channel opens.
    pub fn on_ready(&self, callback: impl FnOnce() + Send + 'static) {
        *self.shared.on_ready.lock() = Some(Box::new(callback));
    }

    /// Registers the inbound text handler. Messages arrive in order;
    /// registering again replaces the previous handler.
    pub fn on_message(&self, handler: impl Fn(&str) + Send + Sync + 'static) {
        *self.shared.on_message.lock() = Some(Arc::new(handler));
    }

    /// Registers the observer for transport errors after establishment.
    pub fn on_error(&self, observer: impl Fn(&PipelineError) + Send + Sync + 'static) {
        *self.shared.on_error.lock() = Some(Arc::new(observer));
    }

    /// Registers the observer fired once when the connection ends, whether
    /// locally requested or peer-initiated.
    pub fn on_close(&self, observer: impl Fn() + Send + Sync + 'static) {
        *self.shared.on_close.lock() = Some(Arc::new(observer));
    }

    pub fn state(&self) -> ChannelState {
        self.shared.state()
    }

    /// Monotonic count of frames dropped because the channel was not Open.
    pub fn dropped_frames(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Dials the service and transitions `Connecting -> Open`.
    ///
    /// On success the ready callback fires once, after which [`send`] starts
    /// transmitting. A channel is one-shot: a second connect attempt fails
    /// locally without dialing.
    ///
    /// [`send`]: TransportChannel::send
    pub async fn connect(&self, url: &str) -> Result<()> {
        if self.shared.started.swap(true, Ordering::SeqCst) {
            return Err(PipelineError::ConnectFailure(
                "channel already used; connect is one-shot".into(),
            ));
        }
        *self.shared.state.lock() = ChannelState::Connecting;
        debug!("[Channel] connecting to {}", url);

        let (socket, _response) = match tokio_tungstenite::connect_async(url).await {
            Ok(pair) => pair,
            Err(e) => {
                *self.shared.state.lock() = ChannelState::Closed;
                return Err(PipelineError::ConnectFailure(format!("{}: {}", url, e)));
            }
        };

        let (sink, stream) = socket.split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        *self.shared.outbound.lock() = Some(outbound_tx);
        *self.shared.writer_task.lock() =
            Some(spawn_writer(Arc::clone(&self.shared), sink, outbound_rx));
        *self.shared.reader_task.lock() = Some(spawn_reader(Arc::clone(&self.shared), stream));

        // close() may have raced the dial; the tasks above then belong to a
        // connection nobody wants.
        {
            let mut state = self.shared.state.lock();
            if *state != ChannelState::Connecting {
                drop(state);
                debug!("[Channel] dial finished after close; dropping socket");
                self.shared.outbound.lock().take();
                if let Some(reader) = self.shared.reader_task.lock().take() {
                    reader.abort();
                }
                self.shared.writer_task.lock().take();
                return Err(PipelineError::ConnectFailure(
                    "channel closed during connect".into(),
                ));
            }
            *state = ChannelState::Open;
        }

        info!("[Channel] open ({})", url);
        let ready = self.shared.on_ready.lock().take();
        if let Some(callback) = ready {
            callback();
        }
        Ok(())
    }

    /// Sends one text payload if the channel is Open.
    ///
    /// Anything else is a silent no-op: the frame is dropped and counted,
    /// never queued. Best-effort by design; live frames are worthless late.
    pub fn send(&self, payload: &str) {
        let state = self.state();
        if state != ChannelState::Open {
            let dropped = self.shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(
                "[Channel] dropping frame while {:?} ({} dropped so far)",
                state, dropped
            );
            return;
        }
        let sent = self
            .shared
            .outbound
            .lock()
            .as_ref()
            .map(|tx| tx.send(Message::text(payload)).is_ok())
            .unwrap_or(false);
        if !sent {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            debug!("[Channel] writer unavailable; frame dropped");
        }
    }

    /// Closes the connection and releases the transport resources.
    ///
    /// Idempotent. Safe to call while Connecting (the surplus socket is
    /// dropped when the dial resolves) or before any connect at all.
    pub fn close(&self) {
        {
            let mut state = self.shared.state.lock();
            if *state == ChannelState::Closed {
                return;
            }
            *state = ChannelState::Closing;
            debug!("[Channel] close requested");
        }
        if let Some(reader) = self.shared.reader_task.lock().take() {
            reader.abort();
        }
        // The writer is left to drain: dropping the outbound sender in
        // transition_closed ends its loop and flushes the closing handshake.
        self.shared.writer_task.lock().take();
        self.shared.transition_closed();
    }
}

impl Default for TransportChannel {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_writer(
    shared: Arc<ChannelShared>,
    mut sink: WsSink,
    mut outbound: mpsc::UnboundedReceiver<Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            if let Err(e) = sink.send(message).await {
                warn!("[Channel] websocket send failed: {}", e);
                shared.report_error(&PipelineError::TransportError(e.to_string()));
                shared.transition_closed();
                return;
            }
        }
        // Outbound sender dropped: deliberate local close. The peer may
        // already be gone, so the handshake result is advisory.
        let _ = sink.close().await;
    })
}

fn spawn_reader(shared: Arc<ChannelShared>, mut stream: WsStream) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(next) = stream.next().await {
            if shared.state() == ChannelState::Closed {
                break;
            }
            match next {
                Ok(Message::Text(text)) => shared.deliver(text.as_str()),
                Ok(Message::Close(frame)) => {
                    if shared.locally_closing() {
                        debug!("[Channel] close acknowledged by peer");
                    } else {
                        let reason = frame
                            .map(|f| format!("code {}, reason {:?}", f.code, f.reason.as_str()))
                            .unwrap_or_else(|| "no close frame details".into());
                        warn!("[Channel] peer closed the connection ({})", reason);
                        shared.report_error(&PipelineError::UnexpectedClose(reason));
                    }
                    shared.transition_closed();
                    return;
                }
                Ok(Message::Ping(_) | Message::Pong(_)) => {
                    // Keepalives are answered by the protocol layer.
                }
                Ok(other) => {
                    debug!("[Channel] ignoring non-text frame ({} bytes)", other.len());
                }
                Err(e) => {
                    warn!("[Channel] websocket receive failed: {}", e);
                    shared.report_error(&PipelineError::TransportError(e.to_string()));
                    shared.transition_closed();
                    return;
                }
            }
        }
        // Stream ended without a close frame.
        if !shared.locally_closing() {
            warn!("[Channel] connection dropped without close handshake");
            shared.report_error(&PipelineError::UnexpectedClose(
                "connection dropped without close handshake".into(),
            ));
        }
        shared.transition_closed();
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_before_connect_is_silent_noop() {
        let channel = TransportChannel::new();
        channel.send("data:image/jpeg;base64,AA==");
        channel.send("data:image/jpeg;base64,AA==");
        assert_eq!(channel.state(), ChannelState::Closed);
        assert_eq!(channel.dropped_frames(), 2);
    }

    #[test]
    fn test_close_without_connect_never_notifies() {
        let channel = TransportChannel::new();
        let closes = Arc::new(AtomicU64::new(0));
        let observed = Arc::clone(&closes);
        channel.on_close(move || {
            observed.fetch_add(1, Ordering::SeqCst);
        });
        channel.close();
        channel.close();
        assert_eq!(channel.state(), ChannelState::Closed);
        assert_eq!(closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_connect_refused_maps_to_connect_failure() {
        let channel = TransportChannel::new();
        let err = channel.connect("ws://127.0.0.1:1").await.unwrap_err();
        assert!(matches!(err, PipelineError::ConnectFailure(_)));
        assert_eq!(channel.state(), ChannelState::Closed);
    }

    #[tokio::test]
    async fn test_connect_is_one_shot() {
        let channel = TransportChannel::new();
        let _ = channel.connect("ws://127.0.0.1:1").await;
        let err = channel.connect("ws://127.0.0.1:1").await.unwrap_err();
        assert!(matches!(err, PipelineError::ConnectFailure(_)));
    }
}
