//! # Push Bridge
//!
//! Bridges push-capable scalers to the controller. The bridge owns the
//! activity watch channel: the scaler's `run` is its sole writer, and the
//! bridge forwards observed transitions to the controller's event channel.
//! Forwarding failures drop the sample; they never block the metrics path.

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::scaler::{ScalerContext, SharedScaler};

/// Activity transition forwarded to the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEvent {
    /// Scaled object namespace
    pub namespace: String,
    /// Scaled object name
    pub name: String,
    /// Whether the workload should be scaled above zero
    pub active: bool,
}

/// Running bridge between one push scaler and the controller
#[derive(Debug)]
pub struct PushBridge {
    ctx: ScalerContext,
    run: JoinHandle<()>,
    forward: JoinHandle<()>,
}

impl PushBridge {
    /// Start the bridge for `scaler` if it has the push capability.
    /// Returns `None` for pull-only scalers.
    #[must_use]
    pub fn start(
        scaler: &SharedScaler,
        namespace: &str,
        name: &str,
        events: mpsc::Sender<ActivityEvent>,
    ) -> Option<Self> {
        let push = SharedScaler::clone(scaler).as_push()?;

        let ctx = ScalerContext::background();
        let (tx, mut rx) = watch::channel(false);

        let run_ctx = ctx.clone();
        let run = tokio::spawn(async move { push.run(run_ctx, tx).await });

        let namespace = namespace.to_string();
        let name = name.to_string();
        let forward = tokio::spawn(async move {
            // changed() errors once the scaler's run returns and drops the
            // sender; that closes the bridge.
            while rx.changed().await.is_ok() {
                let active = *rx.borrow_and_update();
                let event = ActivityEvent {
                    namespace: namespace.clone(),
                    name: name.clone(),
                    active,
                };
                match events.try_send(event) {
                    Ok(()) => debug!(%namespace, %name, active, "forwarded activity transition"),
                    Err(err) => warn!(%namespace, %name, %err, "dropping activity event"),
                }
            }
            debug!(%namespace, %name, "activity channel closed, bridge stopping");
        });

        Some(Self { ctx, run, forward })
    }

    /// Cancel the scaler's run loop and wait for both tasks to finish
    pub async fn stop(self) {
        self.ctx.cancel();
        let _ = self.run.await;
        let _ = self.forward.await;
    }
}
