//! Session management: write pump, status pump, command read loop.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Instant;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use edgesight_media::ImageCodec;
use edgesight_protocol::binary;
use edgesight_protocol::constants::{
    SHUTDOWN_TIMEOUT, WS_MAX_MESSAGE_SIZE, WS_PING_PERIOD, WS_PONG_WAIT,
};
use edgesight_protocol::messages::{
    ConfigResponsePayload, ControlKind, DetectionData, DetectionResultPayload, FrameMeta,
};
use edgesight_protocol::{Command, Envelope, MessageType};

use crate::SEND_BUFFER_SIZE;
use crate::engine::{InferOutput, InferenceEngine, ResultMode, WakeHook};
use crate::status::{SessionStats, status_pump};

/// Handle for writing to the connected client.
///
/// Cloneable and cheap — wraps the session's `mpsc::Sender`. Every writer
/// (read loop, status pump) goes through this channel, so exactly one
/// write is in flight on the underlying stream at any instant.
#[derive(Clone)]
pub struct Sender {
    tx: mpsc::Sender<WsMessage>,
}

impl Sender {
    /// Sends a protocol [`Envelope`] as JSON text.
    pub fn send_msg(&self, env: Envelope) -> Result<(), SendError> {
        let json = serde_json::to_string(&env).map_err(|_| SendError)?;
        self.tx.try_send(WsMessage::Text(json.into())).map_err(|_| {
            warn!("send buffer full or closed, dropping message");
            SendError
        })
    }

    /// Sends a raw binary frame.
    pub fn send_binary(&self, data: Vec<u8>) -> Result<(), SendError> {
        self.tx
            .try_send(WsMessage::Binary(data.into()))
            .map_err(|_| SendError)
    }

    /// Returns `true` if the send channel is still open.
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Error returned when the send channel is full or closed.
#[derive(Debug, thiserror::Error)]
#[error("send failed: buffer full or connection closed")]
pub struct SendError;

/// Collaborator handles a session needs; owned by the server, passed in.
pub(crate) struct SessionContext<C, E> {
    pub codec: Arc<C>,
    pub engine: Arc<E>,
    pub device_id: String,
    pub result_mode: ResultMode,
    pub jpeg_quality: u8,
    pub wake_hook: Arc<std::sync::Mutex<Option<WakeHook>>>,
}

/// One active session.
pub(crate) struct Session {
    sender: Sender,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Session {
    pub fn sender(&self) -> Sender {
        self.sender.clone()
    }

    /// Cancels the session and waits a bounded time for its tasks;
    /// stragglers are abandoned rather than blocking the caller.
    pub async fn close_and_wait(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await.is_err() {
                warn!("session task did not exit within {SHUTDOWN_TIMEOUT:?}, abandoning it");
            }
        }
    }
}

/// Spawns the pumps for an accepted connection and returns the session.
pub(crate) fn spawn_session<S, C, E>(
    ws_stream: S,
    peer: String,
    ctx: SessionContext<C, E>,
    server_cancel: &CancellationToken,
) -> Session
where
    S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error>
        + Send
        + 'static,
    C: ImageCodec,
    E: InferenceEngine<Image = C::Image>,
{
    let (tx, rx) = mpsc::channel::<WsMessage>(SEND_BUFFER_SIZE);
    let cancel = server_cancel.child_token();
    let sender = Sender { tx };
    let stats = Arc::new(SessionStats::default());

    let (ws_sink, ws_stream) = ws_stream.split();

    let write_task = tokio::spawn(write_pump(ws_sink, rx, cancel.clone()));

    let read_task = {
        let sender = sender.clone();
        let cancel = cancel.clone();
        let stats = Arc::clone(&stats);
        let device_id = ctx.device_id.clone();
        tokio::spawn(async move {
            let status = tokio::spawn(status_pump(
                sender.clone(),
                device_id,
                Arc::clone(&stats),
                cancel.clone(),
            ));

            read_pump(ws_stream, sender, ctx, stats, cancel.clone()).await;

            // The status pump shares the cancel token; stop it and wait
            // before the handler resolves.
            cancel.cancel();
            let _ = status.await;
            info!(%peer, "session closed");
        })
    };

    Session {
        sender,
        cancel,
        tasks: vec![read_task, write_task],
    }
}

/// Write pump: drains the send channel and sends keepalive pings.
async fn write_pump<S>(mut sink: S, mut rx: mpsc::Receiver<WsMessage>, cancel: CancellationToken)
where
    S: futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Send + Unpin,
{
    let mut ping_interval = tokio::time::interval(WS_PING_PERIOD);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            msg = rx.recv() => {
                match msg {
                    Some(ws_msg) => {
                        if let Err(e) = sink.send(ws_msg).await {
                            warn!("write pump send error: {e}");
                            break;
                        }
                    }
                    None => break, // Channel closed.
                }
            }

            _ = ping_interval.tick() => {
                if let Err(e) = sink.send(WsMessage::Ping(Vec::new().into())).await {
                    warn!("write pump ping error: {e}");
                    break;
                }
            }
        }
    }

    // Best-effort close frame.
    let _ = sink.close().await;
}

/// Read loop: dispatches commands until stop, cancellation, or failed read.
async fn read_pump<S, C, E>(
    mut stream: S,
    sender: Sender,
    ctx: SessionContext<C, E>,
    stats: Arc<SessionStats>,
    cancel: CancellationToken,
) where
    S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + Send
        + Unpin,
    C: ImageCodec,
    E: InferenceEngine<Image = C::Image>,
{
    debug!("session read loop entered");

    let mut pong_deadline = tokio::time::interval(WS_PONG_WAIT);
    pong_deadline.reset();
    let mut got_pong = true;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            _ = pong_deadline.tick() => {
                if !got_pong {
                    warn!("pong timeout, closing session");
                    break;
                }
                got_pong = false;
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(ws_msg)) => {
                        match ws_msg {
                            WsMessage::Text(text) => {
                                if text.len() > WS_MAX_MESSAGE_SIZE {
                                    warn!("message exceeds max size ({})", text.len());
                                    continue;
                                }
                                if dispatch_text(&sender, &ctx, &text).is_break() {
                                    break;
                                }
                            }
                            WsMessage::Binary(data) => {
                                if data.len() > WS_MAX_MESSAGE_SIZE {
                                    warn!("binary message exceeds max size ({})", data.len());
                                    continue;
                                }
                                if dispatch_binary(&sender, &ctx, &stats, &data).is_break() {
                                    break;
                                }
                            }
                            WsMessage::Pong(_) => {
                                got_pong = true;
                                pong_deadline.reset();
                            }
                            WsMessage::Ping(data) => {
                                let _ = sender.tx.try_send(WsMessage::Pong(data));
                            }
                            WsMessage::Close(_) => {
                                info!("received close frame");
                                break;
                            }
                            WsMessage::Frame(_) => {} // Raw frames ignored.
                        }
                    }
                    Some(Err(e)) => {
                        warn!("read failed: {e}");
                        break;
                    }
                    None => break, // Peer closed.
                }
            }
        }
    }
}

/// Dispatches a JSON command. `Break` ends the session.
fn dispatch_text<C, E>(
    sender: &Sender,
    ctx: &SessionContext<C, E>,
    text: &str,
) -> ControlFlow<()>
where
    C: ImageCodec,
    E: InferenceEngine<Image = C::Image>,
{
    let cmd = match Command::from_text(text) {
        Ok(cmd) => cmd,
        Err(e) => {
            warn!("invalid command, skipping: {e}");
            return ControlFlow::Continue(());
        }
    };

    match cmd {
        Command::ControlAction(req) => match req.action {
            ControlKind::StopStreaming | ControlKind::Reboot => {
                info!(action = ?req.action, "control action, acknowledging termination");
                match Envelope::new(
                    uuid::Uuid::new_v4().to_string(),
                    MessageType::ConfigResponse,
                    Some(&ConfigResponsePayload::terminate_ack()),
                ) {
                    // The session ends regardless of ack delivery.
                    Ok(ack) => {
                        if sender.send_msg(ack).is_err() {
                            warn!("failed to send terminate_ack");
                        }
                    }
                    Err(e) => warn!("failed to build terminate_ack: {e}"),
                }
                return ControlFlow::Break(());
            }
            ControlKind::StartStreaming => {
                info!("start streaming requested");
                if let Ok(guard) = ctx.wake_hook.lock() {
                    if let Some(hook) = guard.as_ref() {
                        hook();
                    }
                }
            }
        },
        Command::Heartbeat(hb) => {
            debug!(timestamp_ms = hb.timestamp_ms, "heartbeat");
        }
        Command::DetectionResult(dr) => {
            let len = match &dr.data {
                DetectionData::Text(s) => s.len(),
                DetectionData::Binary(b) => b.len(),
            };
            debug!(len, "detection echo received");
        }
        // Camera frames arrive on the binary path.
        Command::CameraFrame { .. } | Command::Noop => {}
    }
    ControlFlow::Continue(())
}

/// Dispatches a binary frame. `Break` ends the session.
fn dispatch_binary<C, E>(
    sender: &Sender,
    ctx: &SessionContext<C, E>,
    stats: &SessionStats,
    data: &[u8],
) -> ControlFlow<()>
where
    C: ImageCodec,
    E: InferenceEngine<Image = C::Image>,
{
    match Command::from_binary(data) {
        Ok(Command::CameraFrame { meta, data }) => handle_frame(sender, ctx, stats, meta, &data),
        Ok(Command::DetectionResult(dr)) => {
            let len = match &dr.data {
                DetectionData::Text(s) => s.len(),
                DetectionData::Binary(b) => b.len(),
            };
            debug!(len, "binary detection echo received");
            ControlFlow::Continue(())
        }
        Ok(_) => ControlFlow::Continue(()),
        Err(e) => {
            warn!("invalid binary frame, skipping: {e}");
            ControlFlow::Continue(())
        }
    }
}

/// Decode → infer → reply for one camera frame.
///
/// Decode and inference failures skip the frame; only a write failure ends
/// the session.
fn handle_frame<C, E>(
    sender: &Sender,
    ctx: &SessionContext<C, E>,
    stats: &SessionStats,
    meta: FrameMeta,
    data: &[u8],
) -> ControlFlow<()>
where
    C: ImageCodec,
    E: InferenceEngine<Image = C::Image>,
{
    let image = match ctx.codec.decode(data) {
        Ok(image) => image,
        Err(e) => {
            warn!(
                width = meta.width,
                height = meta.height,
                "frame decode failed, skipping: {e}"
            );
            return ControlFlow::Continue(());
        }
    };

    let started = Instant::now();
    let output = match ctx.engine.infer(&image, ctx.result_mode) {
        Ok(output) => output,
        Err(e) => {
            warn!("inference failed, skipping frame: {e}");
            return ControlFlow::Continue(());
        }
    };
    stats.record_frame(started.elapsed());

    match output {
        InferOutput::Detections(json) => {
            let payload = DetectionResultPayload {
                payload: json,
                camera_id: meta.camera_id,
                frame_timestamp_ms: meta.timestamp_ms,
            };
            let env = match Envelope::new(
                uuid::Uuid::new_v4().to_string(),
                MessageType::DetectionResult,
                Some(&payload),
            ) {
                Ok(env) => env,
                Err(e) => {
                    warn!("failed to build detection result: {e}");
                    return ControlFlow::Continue(());
                }
            };
            if sender.send_msg(env).is_err() {
                warn!("detection write failed, ending session");
                return ControlFlow::Break(());
            }
        }
        InferOutput::RawTensor(tensor) => {
            let frame =
                match binary::encode_detection_blob(meta.camera_id, meta.timestamp_ms, &tensor) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("tensor framing failed, skipping: {e}");
                        return ControlFlow::Continue(());
                    }
                };
            if sender.send_binary(frame).is_err() {
                warn!("tensor write failed, ending session");
                return ControlFlow::Break(());
            }
        }
        InferOutput::Enhanced(enhanced) => {
            let jpeg = match ctx.codec.encode(&enhanced, ctx.jpeg_quality) {
                Ok(jpeg) => jpeg,
                Err(e) => {
                    warn!("enhanced frame encode failed, skipping: {e}");
                    return ControlFlow::Continue(());
                }
            };
            let (width, height) = ctx.codec.dimensions(&enhanced);
            let out_meta = FrameMeta {
                width,
                height,
                format: "JPEG".into(),
                timestamp_ms: meta.timestamp_ms,
                camera_id: meta.camera_id,
            };
            let frame = match binary::encode_camera_frame(&out_meta, &jpeg) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("enhanced frame framing failed, skipping: {e}");
                    return ControlFlow::Continue(());
                }
            };
            if sender.send_binary(frame).is_err() {
                warn!("frame write failed, ending session");
                return ControlFlow::Break(());
            }
        }
    }

    ControlFlow::Continue(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_error_display() {
        let err = SendError;
        assert!(err.to_string().contains("buffer full"));
    }

    #[test]
    fn sender_reports_closed_channel() {
        let (tx, rx) = mpsc::channel::<WsMessage>(1);
        let sender = Sender { tx };
        assert!(sender.is_connected());
        drop(rx);
        assert!(!sender.is_connected());
        assert!(sender.send_binary(vec![1]).is_err());
    }
}
