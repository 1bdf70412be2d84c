//! Daemon wiring: session server, optional loopback client, signals.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use edgesight_client::{Client, ClientConfig};
use edgesight_media::{ImageCodec, JpegCodec};
use edgesight_server::{
    InferError, InferOutput, InferenceEngine, ResultMode, Server, ServerConfig,
};

use crate::config::Config;

/// Placeholder engine used until an accelerator backend is wired in.
///
/// Every frame fails with `NotReady`, which the session treats as a
/// non-fatal skip, so the daemon is fully exercisable without hardware.
struct IdleEngine;

impl InferenceEngine for IdleEngine {
    type Image = <JpegCodec as ImageCodec>::Image;

    fn infer(
        &self,
        _image: &Self::Image,
        _mode: ResultMode,
    ) -> Result<InferOutput<Self::Image>, InferError> {
        Err(InferError::NotReady)
    }
}

/// Runs the daemon until SIGINT or a terminate acknowledgement.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let server_config = ServerConfig {
        port: config.port,
        device_id: config.device_id.clone(),
        result_mode: config.result_mode,
        jpeg_quality: config.jpeg_quality,
    };
    let server = Server::new(server_config, JpegCodec, IdleEngine);

    let (ready_tx, ready_rx) = oneshot::channel();
    let server_run = Arc::clone(&server);
    let server_task = tokio::spawn(async move { server_run.run(Some(ready_tx)).await });

    let addr = ready_rx
        .await
        .map_err(|_| anyhow::anyhow!("server failed to bind"))?;
    info!("session server ready on {addr}");

    let shutdown = CancellationToken::new();

    // Optional loopback client: streams a heartbeat to the target once per
    // second. A failed session stays down until the daemon restarts.
    let client = match &config.target {
        Some(target) => {
            let client = Arc::new(Client::new(ClientConfig::new(target.clone()), JpegCodec));
            match client.start().await {
                Ok(()) => {
                    let token = shutdown.clone();
                    client.set_terminate_callback(Box::new(move || token.cancel()));
                    spawn_heartbeat(Arc::clone(&client), shutdown.clone());
                    Some(client)
                }
                Err(e) => {
                    warn!(target = %target, "loopback client failed to start: {e}");
                    None
                }
            }
        }
        None => None,
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupt received"),
        _ = shutdown.cancelled() => info!("termination acknowledged by server"),
    }

    if let Some(client) = &client {
        client.stop().await;
    }
    server.shutdown().await;
    let _ = server_task.await;
    Ok(())
}

/// Sends a heartbeat every second until shutdown.
fn spawn_heartbeat(client: Arc<Client<JpegCodec>>, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.tick().await; // Skip the immediate first tick.

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if !client.send_request("heartbeat") {
                        warn!("heartbeat send failed; client session is down");
                    }
                }
            }
        }
    });
}
