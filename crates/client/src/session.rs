//! Client session: connection lifecycle, write path, reader task.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use edgesight_decode::{BBox, COCO_CLASS_COUNT, Detection};
use edgesight_media::ImageCodec;
use edgesight_protocol::binary;
use edgesight_protocol::constants::{
    CONNECT_TIMEOUT, STOP_TIMEOUT, WS_MAX_MESSAGE_SIZE, WS_PING_PERIOD, WS_PONG_WAIT,
};
use edgesight_protocol::envelope::{Envelope, unix_millis};
use edgesight_protocol::messages::{
    ControlActionRequest, ControlKind, DetectionData, DetectionResult, DetectionResultPayload,
    FrameMeta, HeartbeatRequest,
};
use edgesight_protocol::{MessageType, ServerMessage};

use crate::frame_buffer::{FRAME_BUFFER_CAPACITY, FrameBuffer};
use crate::{ClientError, SEND_BUFFER_SIZE};

/// Callback fired when the server acknowledges termination.
///
/// Must only signal (set a flag, fire a cancellation token): it runs on the
/// reader task, so calling [`Client::stop`] from inside it would deadlock.
pub type TerminateCallback = Box<dyn Fn() + Send + Sync>;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the device, e.g. `ws://device.local:50051`.
    pub url: String,
    /// Camera id stamped onto outgoing frames.
    pub camera_id: u32,
    /// JPEG quality for encoded frames (1..=100).
    pub jpeg_quality: u8,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            camera_id: 0,
            jpeg_quality: 85,
        }
    }
}

/// State shared with the reader task.
struct Shared<C: ImageCodec> {
    codec: C,
    running: AtomicBool,
    sent_frames: AtomicU64,
    received_results: AtomicU64,
    detections: std::sync::Mutex<Vec<Detection>>,
    detections_ready: tokio::sync::Notify,
    frames: FrameBuffer<C::Image>,
    terminate: std::sync::Mutex<Option<TerminateCallback>>,
}

/// Handles for one established connection.
struct Conn {
    cancel: CancellationToken,
    reader: JoinHandle<()>,
    write: JoinHandle<()>,
    ping: JoinHandle<()>,
}

/// Client session engine.
///
/// One outbound connection at a time. All writes go through a single
/// channel drained by one write pump, so sender interleaving cannot
/// corrupt the stream. A write or read failure marks the session
/// not-running; the host restarts it explicitly via [`start`](Self::start).
pub struct Client<C: ImageCodec> {
    config: ClientConfig,
    shared: Arc<Shared<C>>,
    write_tx: std::sync::Mutex<Option<mpsc::Sender<WsMessage>>>,
    conn: tokio::sync::Mutex<Option<Conn>>,
    /// Mirror of the active cancel token so `Drop` can fire it without
    /// locking the async mutex.
    cancel_guard: std::sync::Mutex<Option<CancellationToken>>,
}

impl<C: ImageCodec> Client<C> {
    /// Creates a client. No connection is made until [`start`](Self::start).
    pub fn new(config: ClientConfig, codec: C) -> Self {
        Self {
            config,
            shared: Arc::new(Shared {
                codec,
                running: AtomicBool::new(false),
                sent_frames: AtomicU64::new(0),
                received_results: AtomicU64::new(0),
                detections: std::sync::Mutex::new(Vec::new()),
                detections_ready: tokio::sync::Notify::new(),
                frames: FrameBuffer::new(FRAME_BUFFER_CAPACITY),
                terminate: std::sync::Mutex::new(None),
            }),
            write_tx: std::sync::Mutex::new(None),
            conn: tokio::sync::Mutex::new(None),
            cancel_guard: std::sync::Mutex::new(None),
        }
    }

    /// Sets the callback fired when the server acknowledges termination.
    pub fn set_terminate_callback(&self, cb: TerminateCallback) {
        *self.shared.terminate.lock().unwrap() = Some(cb);
    }

    /// Opens the stream and launches the reader task.
    ///
    /// Idempotent: calling while already running is a no-op success.
    /// Fails with [`ClientError::ConnectTimeout`] if the transport does not
    /// become ready within the deadline, leaving the session not-running.
    pub async fn start(&self) -> Result<(), ClientError> {
        let mut slot = self.conn.lock().await;

        if let Some(conn) = slot.take() {
            if self.shared.running.load(Ordering::SeqCst) {
                debug!("client already running");
                *slot = Some(conn);
                return Ok(());
            }
            // Dead session left behind by a failed write/read: clean it up
            // before reconnecting.
            teardown(conn, &self.cancel_guard).await;
        }

        debug!(url = %self.config.url, "waiting for connection readiness");
        let mut ws_config = tokio_tungstenite::tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);

        let connect = tokio_tungstenite::connect_async_with_config(
            self.config.url.as_str(),
            Some(ws_config),
            false,
        );
        let ws_stream = match tokio::time::timeout(CONNECT_TIMEOUT, connect).await {
            Ok(Ok((stream, _))) => stream,
            Ok(Err(e)) => {
                warn!(url = %self.config.url, "connection failed: {e}");
                return Err(ClientError::Ws(e));
            }
            Err(_) => {
                warn!(url = %self.config.url, "connection not ready within {CONNECT_TIMEOUT:?}");
                return Err(ClientError::ConnectTimeout);
            }
        };
        info!(url = %self.config.url, "stream established");

        let (sink, stream) = ws_stream.split();
        let (tx, rx) = mpsc::channel::<WsMessage>(SEND_BUFFER_SIZE);
        let cancel = CancellationToken::new();

        let write = tokio::spawn(write_pump(sink, rx, cancel.clone()));
        let ping = tokio::spawn(ping_pump(tx.clone(), cancel.clone()));
        let reader = {
            let shared = Arc::clone(&self.shared);
            let tx = tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(read_pump(stream, shared, tx, cancel))
        };

        *self.write_tx.lock().unwrap() = Some(tx);
        *self.cancel_guard.lock().unwrap() = Some(cancel.clone());
        self.shared.running.store(true, Ordering::SeqCst);
        *slot = Some(Conn {
            cancel,
            reader,
            write,
            ping,
        });
        Ok(())
    }

    /// Tears the session down.
    ///
    /// Idempotent and safe to call concurrently: teardown runs exactly once
    /// per established connection. Signals no-more-writes, cancels the
    /// token to unblock a pending read, then waits a bounded time for the
    /// reader before abandoning it.
    pub async fn stop(&self) {
        let conn = self.conn.lock().await.take();
        let Some(conn) = conn else {
            return;
        };

        self.shared.running.store(false, Ordering::SeqCst);
        // No more writes from this side; the write pump emits the close
        // frame when it winds down.
        *self.write_tx.lock().unwrap() = None;

        teardown(conn, &self.cancel_guard).await;
        info!("client session stopped");
    }

    /// Builds and sends a command from a symbolic request name.
    ///
    /// `start_streaming` / `stop_streaming` / `reboot` map to control
    /// actions, `heartbeat` (or an empty string) to a timestamped
    /// heartbeat, and anything else is forwarded verbatim as a detection
    /// payload. Returns `false` without writing when the session is not
    /// running; a failed write marks the session not-running.
    pub fn send_request(&self, request: &str) -> bool {
        if !self.shared.running.load(Ordering::SeqCst) {
            return false;
        }
        let id = uuid::Uuid::new_v4().to_string();
        let env = match request_envelope(&id, request, self.config.camera_id) {
            Ok(env) => env,
            Err(e) => {
                warn!("failed to build request: {e}");
                return false;
            }
        };
        self.send_envelope(env)
    }

    /// Encodes and sends one camera frame.
    ///
    /// An encode failure only skips this frame; a write failure marks the
    /// session not-running.
    pub fn send_frame(&self, image: &C::Image) -> bool {
        if !self.shared.running.load(Ordering::SeqCst) {
            return false;
        }
        let jpeg = match self.shared.codec.encode(image, self.config.jpeg_quality) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("frame encode failed, skipping: {e}");
                return false;
            }
        };
        let (width, height) = self.shared.codec.dimensions(image);
        let meta = FrameMeta {
            width,
            height,
            format: "JPEG".into(),
            timestamp_ms: unix_millis(),
            camera_id: self.config.camera_id,
        };
        let frame = match binary::encode_camera_frame(&meta, &jpeg) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("frame framing failed, skipping: {e}");
                return false;
            }
        };
        if self.send_ws(WsMessage::Binary(frame.into())) {
            self.shared.sent_frames.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Atomically drains and returns all queued detections (oldest first).
    pub fn pop_detections(&self) -> Vec<Detection> {
        std::mem::take(&mut *self.shared.detections.lock().unwrap())
    }

    /// Waits until at least one detection is queued, then drains the queue.
    pub async fn next_detections(&self) -> Vec<Detection> {
        loop {
            let notified = self.shared.detections_ready.notified();
            let drained = self.pop_detections();
            if !drained.is_empty() {
                return drained;
            }
            notified.await;
        }
    }

    /// Pops the oldest buffered remote frame, if any.
    pub fn pop_remote_frame(&self) -> Option<C::Image> {
        self.shared.frames.pop()
    }

    /// Frames successfully handed to the write pump.
    pub fn sent_frames(&self) -> u64 {
        self.shared.sent_frames.load(Ordering::Relaxed)
    }

    /// Detection results received, decodable or not.
    pub fn received_results(&self) -> u64 {
        self.shared.received_results.load(Ordering::Relaxed)
    }

    /// Whether the session is currently usable for sending.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    fn send_envelope(&self, env: Envelope) -> bool {
        let json = match serde_json::to_string(&env) {
            Ok(json) => json,
            Err(e) => {
                warn!("failed to serialize envelope: {e}");
                return false;
            }
        };
        self.send_ws(WsMessage::Text(json.into()))
    }

    fn send_ws(&self, msg: WsMessage) -> bool {
        let guard = self.write_tx.lock().unwrap();
        let Some(tx) = guard.as_ref() else {
            return false;
        };
        if tx.try_send(msg).is_err() {
            warn!("write failed, marking session not running");
            self.shared.running.store(false, Ordering::SeqCst);
            return false;
        }
        true
    }
}

impl<C: ImageCodec> Drop for Client<C> {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Ok(mut guard) = self.cancel_guard.lock() {
            if let Some(cancel) = guard.take() {
                cancel.cancel();
            }
        }
    }
}

/// Cancels a connection and waits a bounded time for its reader.
async fn teardown(conn: Conn, cancel_guard: &std::sync::Mutex<Option<CancellationToken>>) {
    // Cancel first so a blocked read wakes up before we wait on it.
    conn.cancel.cancel();
    if let Ok(mut guard) = cancel_guard.lock() {
        guard.take();
    }

    if tokio::time::timeout(STOP_TIMEOUT, conn.reader).await.is_err() {
        warn!("reader did not exit within {STOP_TIMEOUT:?}, abandoning it");
    }
    conn.write.abort();
    conn.ping.abort();
}

/// Maps a symbolic request name onto a wire envelope.
fn request_envelope(
    id: &str,
    request: &str,
    camera_id: u32,
) -> Result<Envelope, serde_json::Error> {
    match request {
        "start_streaming" => control_envelope(id, ControlKind::StartStreaming),
        "stop_streaming" => control_envelope(id, ControlKind::StopStreaming),
        "reboot" => control_envelope(id, ControlKind::Reboot),
        "" | "heartbeat" => Envelope::new(
            id,
            MessageType::Heartbeat,
            Some(&HeartbeatRequest {
                timestamp_ms: unix_millis(),
            }),
        ),
        payload => Envelope::new(
            id,
            MessageType::DetectionResult,
            Some(&DetectionResultPayload {
                payload: payload.into(),
                camera_id,
                frame_timestamp_ms: 0,
            }),
        ),
    }
}

fn control_envelope(id: &str, action: ControlKind) -> Result<Envelope, serde_json::Error> {
    Envelope::new(
        id,
        MessageType::ControlAction,
        Some(&ControlActionRequest { action }),
    )
}

/// Write pump: drains the send channel into the sink.
async fn write_pump<S>(mut sink: S, mut rx: mpsc::Receiver<WsMessage>, cancel: CancellationToken)
where
    S: SinkExt<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = rx.recv() => {
                match msg {
                    Some(m) => {
                        if let Err(e) = sink.send(m).await {
                            warn!("write pump error: {e}");
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    // Best-effort close frame.
    let _ = sink.send(WsMessage::Close(None)).await;
}

/// Ping pump: periodic keepalive pings.
async fn ping_pump(write_tx: mpsc::Sender<WsMessage>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(WS_PING_PERIOD);
    interval.tick().await; // Skip immediate first tick.

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let ping = WsMessage::Ping(vec![].into());
                if write_tx.send(ping).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Reader task: decodes inbound server messages until the stream ends.
async fn read_pump<S, C>(
    mut stream: S,
    shared: Arc<Shared<C>>,
    write_tx: mpsc::Sender<WsMessage>,
    cancel: CancellationToken,
) where
    S: StreamExt<
            Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>,
        > + Unpin,
    C: ImageCodec,
{
    debug!("reader task started");

    // Read deadline: any incoming frame resets it.
    let deadline = tokio::time::sleep(WS_PONG_WAIT);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            () = &mut deadline => {
                warn!("read deadline expired, closing connection");
                break;
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(msg)) => {
                        deadline.as_mut().reset(tokio::time::Instant::now() + WS_PONG_WAIT);
                        match msg {
                            WsMessage::Text(text) => {
                                if handle_text(&shared, &text) {
                                    break; // Terminate acknowledged.
                                }
                            }
                            WsMessage::Binary(data) => handle_binary(&shared, &data),
                            WsMessage::Ping(data) => {
                                let _ = write_tx.try_send(WsMessage::Pong(data));
                            }
                            WsMessage::Pong(_) => trace!("pong"),
                            WsMessage::Close(_) => {
                                info!("server closed the stream");
                                break;
                            }
                            WsMessage::Frame(_) => {}
                        }
                    }
                    Some(Err(e)) => {
                        warn!("read failed: {e}");
                        break;
                    }
                    None => {
                        debug!("stream ended");
                        break;
                    }
                }
            }
        }
    }

    shared.running.store(false, Ordering::SeqCst);
    debug!("reader task exiting");
}

/// Handles a text frame. Returns `true` when the reader should exit.
fn handle_text<C: ImageCodec>(shared: &Shared<C>, text: &str) -> bool {
    let msg = match ServerMessage::from_text(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("invalid server message, skipping: {e}");
            return false;
        }
    };

    match msg {
        ServerMessage::DetectionResult(dr) => queue_detection(shared, dr),
        ServerMessage::DeviceStatus(status) => {
            trace!(
                device = %status.device_id,
                fps = status.fps_estimate,
                "device status"
            );
        }
        ServerMessage::ConfigResponse(cr) => {
            if cr.is_terminate_ack() {
                info!("received terminate_ack, signaling termination");
                if let Ok(guard) = shared.terminate.lock() {
                    if let Some(cb) = guard.as_ref() {
                        cb();
                    }
                }
                return true;
            }
            debug!(success = cr.success, message = %cr.message, "config response");
        }
        ServerMessage::CameraFrame { .. } | ServerMessage::Noop => {}
    }
    false
}

/// Handles a binary frame: camera frames and raw detection tensors.
fn handle_binary<C: ImageCodec>(shared: &Shared<C>, data: &[u8]) {
    match ServerMessage::from_binary(data) {
        Ok(ServerMessage::CameraFrame { meta, data }) => {
            match shared.codec.decode(&data) {
                Ok(image) => shared.frames.push(image),
                Err(e) => warn!(
                    width = meta.width,
                    height = meta.height,
                    "remote frame decode failed, dropping: {e}"
                ),
            }
        }
        Ok(ServerMessage::DetectionResult(dr)) => queue_detection(shared, dr),
        Ok(_) => {}
        Err(e) => warn!("invalid binary frame, skipping: {e}"),
    }
}

/// Decodes a detection result and queues it when it yields any boxes.
fn queue_detection<C: ImageCodec>(shared: &Shared<C>, dr: DetectionResult) {
    shared.received_results.fetch_add(1, Ordering::Relaxed);

    let boxes: Vec<BBox> = match &dr.data {
        DetectionData::Text(payload) => edgesight_decode::extract_boxes(payload),
        DetectionData::Binary(tensor) => {
            edgesight_decode::parse_class_list(tensor, COCO_CLASS_COUNT)
                .into_iter()
                .map(|b| b.to_bbox())
                .collect()
        }
    };

    if boxes.is_empty() {
        debug!(camera_id = dr.camera_id, "no boxes decoded, dropping result");
        return;
    }

    let detection = Detection {
        boxes,
        timestamp_ms: unix_millis(),
    };
    shared.detections.lock().unwrap().push(detection);
    shared.detections_ready.notify_waiters();
}
