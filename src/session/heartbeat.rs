//! Server-side ping sweep over the ctrl pool.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};

use super::channel::{ChannelPool, Outbound};

/// Spawn the sweep. Every `period` a channel that showed no activity since
/// the previous sweep is terminated; every other channel is pinged and
/// must answer before the next sweep.
#[must_use]
pub fn spawn_heartbeat(
    pool: ChannelPool,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(
        async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        info!("heartbeat shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        sweep(&pool);
                    }
                }
            }
        }
        .instrument(info_span!("heartbeat", period_ms = period.as_millis())),
    )
}

/// One pass over the pool. Returns the number of terminated channels.
pub fn sweep(pool: &ChannelPool) -> usize {
    let mut terminated = 0;
    for channel in pool.snapshot() {
        if channel.take_alive() {
            if let Err(err) = channel.send(Outbound::Ping) {
                debug!(channel = %channel.id(), %err, "ping not queued");
            }
        } else {
            info!(channel = %channel.id(), peer = ?channel.peer(), "connection ctrl cut");
            channel.terminate();
            terminated += 1;
        }
    }
    terminated
}
