// src/stream/channel.rs
//
// Frame channel: one WebSocket per session, driven by its own task.
//
// The task never touches session state. It turns socket activity into
// `ChannelEvent`s tagged with the session they belong to and pushes them
// onto a queue; the session controller drains that queue. A session that
// has been stopped or replaced simply stops matching the tag, so anything
// still in flight from it is discarded on arrival.
//
//   connect ──ok──▶ send control ──▶ Opened ──▶ Text/Binary ... ──▶ Closed
//      │                  │                          │
//      └──err──▶ Errored  └──err──▶ Errored          └──err──▶ Errored

use futures_util::{SinkExt, StreamExt};
use std::fmt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::protocol::StreamSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Opened,
    TextMessage(String),
    BinaryMessage(Vec<u8>),
    Closed,
    Errored(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedEvent {
    pub session: SessionId,
    pub event: ChannelEvent,
}

pub type EventSink = mpsc::UnboundedSender<TaggedEvent>;
pub type EventStream = mpsc::UnboundedReceiver<TaggedEvent>;

pub fn event_queue() -> (EventSink, EventStream) {
    mpsc::unbounded_channel()
}

/// Live connection owned by a session.
pub trait ChannelHandle: Send {
    /// Idempotent. Events already queued may still arrive afterwards.
    fn close(&mut self);
    fn is_open(&self) -> bool;
}

pub trait FrameTransport {
    /// Starts connecting and returns immediately. Progress and failures are
    /// reported through `sink`, never returned.
    fn open(&self, source: &StreamSource, session: SessionId, sink: EventSink)
        -> Box<dyn ChannelHandle>;
}

// ============================================================================
// WEBSOCKET TRANSPORT
// ============================================================================

pub struct WsTransport {
    url: String,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl FrameTransport for WsTransport {
    fn open(
        &self,
        source: &StreamSource,
        session: SessionId,
        sink: EventSink,
    ) -> Box<dyn ChannelHandle> {
        let (close_tx, close_rx) = oneshot::channel();
        let control = source.control_message().to_json();
        let task = tokio::spawn(run_channel(
            self.url.clone(),
            control,
            session,
            sink,
            close_rx,
        ));
        Box::new(WsHandle {
            close_tx: Some(close_tx),
            task,
        })
    }
}

struct WsHandle {
    close_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ChannelHandle for WsHandle {
    fn close(&mut self) {
        if let Some(tx) = self.close_tx.take() {
            // task may already be gone; that is a closed channel too
            let _ = tx.send(());
        }
    }

    fn is_open(&self) -> bool {
        self.close_tx.is_some() && !self.task.is_finished()
    }
}

impl Drop for WsHandle {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_channel(
    url: String,
    control: String,
    session: SessionId,
    sink: EventSink,
    mut close_rx: oneshot::Receiver<()>,
) {
    let emit = |event: ChannelEvent| {
        // receiver gone means the viewer is shutting down
        let _ = sink.send(TaggedEvent { session, event });
    };

    debug!("Session {} connecting to {}", session, url);
    let connected = tokio::select! {
        _ = &mut close_rx => {
            debug!("Session {} closed before connecting", session);
            return;
        }
        result = connect_async(url.as_str()) => result,
    };

    let (ws, _response) = match connected {
        Ok(ok) => ok,
        Err(e) => {
            warn!("Session {}: cannot connect to {}: {}", session, url, e);
            emit(ChannelEvent::Errored(e.to_string()));
            return;
        }
    };
    let (mut write, mut read) = ws.split();

    if let Err(e) = write.send(Message::Text(control)).await {
        warn!("Session {}: failed to send control message: {}", session, e);
        emit(ChannelEvent::Errored(e.to_string()));
        return;
    }
    info!("🔌 Session {} channel open at {}", session, url);
    emit(ChannelEvent::Opened);

    loop {
        tokio::select! {
            _ = &mut close_rx => {
                debug!("Session {} closing channel", session);
                let _ = write.send(Message::Close(None)).await;
                break;
            }
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => emit(ChannelEvent::TextMessage(text)),
                Some(Ok(Message::Binary(bytes))) => emit(ChannelEvent::BinaryMessage(bytes)),
                Some(Ok(Message::Close(frame))) => {
                    debug!("Session {} closed by server: {:?}", session, frame);
                    emit(ChannelEvent::Closed);
                    break;
                }
                Some(Ok(_)) => {} // ping/pong handled by tungstenite
                Some(Err(e)) => {
                    emit(ChannelEvent::Errored(e.to_string()));
                    break;
                }
                None => {
                    emit(ChannelEvent::Closed);
                    break;
                }
            }
        }
    }
}
