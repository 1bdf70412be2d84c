//! Per-session status telemetry.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use edgesight_protocol::constants::STATUS_INTERVAL;
use edgesight_protocol::messages::{DeviceState, DeviceStatusEvent};
use edgesight_protocol::{Envelope, MessageType};

use crate::session::Sender;

/// Counters the read loop feeds and the status pump reports.
#[derive(Debug, Default)]
pub(crate) struct SessionStats {
    frames: AtomicU64,
    last_latency_ms: AtomicU32,
}

impl SessionStats {
    pub fn record_frame(&self, latency: Duration) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.last_latency_ms
            .store(latency.as_millis() as u32, Ordering::Relaxed);
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn last_latency_ms(&self) -> u32 {
        self.last_latency_ms.load(Ordering::Relaxed)
    }
}

/// Writes a `device_status` message once per interval until cancelled or
/// the write fails. Shares the session's write channel, so status messages
/// never interleave with response writes.
pub(crate) async fn status_pump(
    sender: Sender,
    device_id: String,
    stats: Arc<SessionStats>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(STATUS_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await; // Skip the immediate first tick.

    let mut last_frames = stats.frames();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let total = stats.frames();
                let fps = (total - last_frames) as f32 / STATUS_INTERVAL.as_secs_f32();
                last_frames = total;

                let state = if fps > 0.0 {
                    DeviceState::Streaming
                } else {
                    DeviceState::Ready
                };
                let status = DeviceStatusEvent {
                    device_id: device_id.clone(),
                    state,
                    fps_estimate: fps,
                    cpu_temp_c: read_cpu_temp(),
                    latency_ms: stats.last_latency_ms(),
                };

                let env = match Envelope::new(
                    uuid::Uuid::new_v4().to_string(),
                    MessageType::DeviceStatus,
                    Some(&status),
                ) {
                    Ok(env) => env,
                    Err(e) => {
                        warn!("failed to build device status: {e}");
                        continue;
                    }
                };
                if sender.send_msg(env).is_err() {
                    warn!("status write failed, stopping status pump");
                    break;
                }
            }
        }
    }

    debug!("status pump exiting");
}

/// CPU temperature in °C from sysfs, or -1.0 where unavailable.
#[cfg(target_os = "linux")]
fn read_cpu_temp() -> f32 {
    std::fs::read_to_string("/sys/class/thermal/thermal_zone0/temp")
        .ok()
        .and_then(|s| s.trim().parse::<f32>().ok())
        .map(|milli| milli / 1000.0)
        .unwrap_or(-1.0)
}

#[cfg(not(target_os = "linux"))]
fn read_cpu_temp() -> f32 {
    -1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_record_and_read() {
        let stats = SessionStats::default();
        assert_eq!(stats.frames(), 0);
        assert_eq!(stats.last_latency_ms(), 0);

        stats.record_frame(Duration::from_millis(12));
        stats.record_frame(Duration::from_millis(8));

        assert_eq!(stats.frames(), 2);
        assert_eq!(stats.last_latency_ms(), 8);
    }

    #[test]
    fn cpu_temp_is_finite() {
        let t = read_cpu_temp();
        assert!(t.is_finite());
    }
}
