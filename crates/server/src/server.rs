//! Listener and connection lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tokio_tungstenite::accept_async_with_config;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use edgesight_media::ImageCodec;
use edgesight_protocol::constants::WS_MAX_MESSAGE_SIZE;

use crate::ServerError;
use crate::engine::{InferenceEngine, ResultMode, WakeHook};
use crate::session::{self, Session, SessionContext};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port to listen on (0 = OS-assigned).
    pub port: u16,
    /// Device id reported in status telemetry.
    pub device_id: String,
    /// What to write back for processed frames.
    pub result_mode: ResultMode,
    /// JPEG quality for annotated frames.
    pub jpeg_quality: u8,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            device_id: "device_001".into(),
            result_mode: ResultMode::Detections,
            jpeg_quality: 85,
        }
    }
}

/// The device-side session server.
///
/// Accepts one long-lived client connection at a time and dispatches its
/// commands through the session read loop. The codec and inference engine
/// are owned here and handed to each session by reference.
pub struct Server<C: ImageCodec, E: InferenceEngine<Image = C::Image>> {
    config: ServerConfig,
    codec: Arc<C>,
    engine: Arc<E>,
    wake_hook: Arc<std::sync::Mutex<Option<WakeHook>>>,
    session: Mutex<Option<Session>>,
    cancel: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
    shutting_down: AtomicBool,
}

impl<C, E> Server<C, E>
where
    C: ImageCodec,
    E: InferenceEngine<Image = C::Image>,
{
    /// Creates a new server owning the given collaborator handles.
    pub fn new(config: ServerConfig, codec: C, engine: E) -> Arc<Self> {
        Arc::new(Self {
            config,
            codec: Arc::new(codec),
            engine: Arc::new(engine),
            wake_hook: Arc::new(std::sync::Mutex::new(None)),
            session: Mutex::new(None),
            cancel: CancellationToken::new(),
            local_addr: Mutex::new(None),
            shutting_down: AtomicBool::new(false),
        })
    }

    /// Sets the hook fired when a client requests streaming to start.
    pub fn set_wake_hook(&self, hook: WakeHook) {
        if let Ok(mut guard) = self.wake_hook.lock() {
            *guard = Some(hook);
        }
    }

    /// Returns the bound address, once [`run`](Self::run) has bound it.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Returns the listening port (0 if not yet bound).
    pub async fn port(&self) -> u16 {
        self.local_addr.lock().await.map(|a| a.port()).unwrap_or(0)
    }

    /// Returns `true` if a client session is currently alive.
    pub async fn has_session(&self) -> bool {
        match self.session.lock().await.as_ref() {
            Some(session) => session.sender().is_connected(),
            None => false,
        }
    }

    /// Binds the listener and serves until shutdown.
    ///
    /// The bound address is reported through `ready` once listening; a
    /// bind failure is returned as an error (and drops `ready`, which the
    /// caller observes as a receive error).
    pub async fn run(
        self: &Arc<Self>,
        ready: Option<oneshot::Sender<SocketAddr>>,
    ) -> Result<(), ServerError> {
        let addr: SocketAddr = ([0, 0, 0, 0], self.config.port).into();
        let listener = TcpListener::bind(addr).await?;

        let local_addr = listener.local_addr()?;
        *self.local_addr.lock().await = Some(local_addr);
        if let Some(tx) = ready {
            let _ = tx.send(local_addr);
        }
        info!("server listening on {local_addr}");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("server loop exiting");
                    break Ok(());
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let server = Arc::clone(self);
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream, peer_addr).await {
                                    error!(%peer_addr, "connection error: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            error!("accept error: {e}");
                        }
                    }
                }
            }
        }
    }

    /// Gracefully shuts the server down.
    ///
    /// Idempotent: only the first call runs the teardown sequence; later
    /// calls return immediately. Never blocks indefinitely — session tasks
    /// that outlive the bounded wait are abandoned.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            debug!("shutdown already in progress, returning");
            return;
        }

        info!("shutting down");
        let started = Instant::now();

        // Stop accepting; session tokens are children of this one.
        self.cancel.cancel();

        if let Some(session) = self.session.lock().await.take() {
            session.close_and_wait().await;
        }

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "shutdown complete"
        );
    }

    /// Upgrades one TCP connection and installs it as the active session.
    async fn handle_connection(
        self: &Arc<Self>,
        stream: tokio::net::TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<(), ServerError> {
        // Take the old session (if any) and wait for its pumps to finish
        // before accepting the new one, so the old teardown cannot race
        // the new session's setup.
        {
            let old = self.session.lock().await.take();
            if let Some(session) = old {
                if session.sender().is_connected() {
                    info!(%peer_addr, "replacing active session");
                } else {
                    info!("clearing stale session");
                }
                session.close_and_wait().await;
            }
        }

        let mut ws_config = tokio_tungstenite::tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
        let ws_stream = accept_async_with_config(stream, Some(ws_config)).await?;
        info!(%peer_addr, "connection established");

        let ctx = SessionContext {
            codec: Arc::clone(&self.codec),
            engine: Arc::clone(&self.engine),
            device_id: self.config.device_id.clone(),
            result_mode: self.config.result_mode,
            jpeg_quality: self.config.jpeg_quality,
            wake_hook: Arc::clone(&self.wake_hook),
        };

        let session = session::spawn_session(ws_stream, peer_addr.to_string(), ctx, &self.cancel);

        *self.session.lock().await = Some(session);
        Ok(())
    }
}
