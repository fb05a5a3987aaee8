use super::FailoverClient;
use std::time::Duration;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Bounded polling of node health checks
#[derive(Debug, Clone)]
pub struct ReadinessProber {
    interval: Duration,
    probe_timeout: Duration,
}

impl ReadinessProber {
    pub fn new(interval: Duration, probe_timeout: Duration) -> Self {
        // tokio intervals panic on a zero period
        Self {
            interval: interval.max(Duration::from_millis(1)),
            probe_timeout,
        }
    }

    /// Wait until at least one node answers.
    ///
    /// Returns false if `deadline` passes or `cancel` fires first.
    pub async fn await_ready(
        &self,
        client: &FailoverClient,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> bool {
        info!("Waiting up to {:?} for the cluster to become ready", deadline);
        self.poll(client, deadline, cancel, true).await
    }

    /// Wait until no node answers.
    pub async fn await_stopped(
        &self,
        client: &FailoverClient,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> bool {
        info!("Waiting up to {:?} for the cluster to stop", deadline);
        self.poll(client, deadline, cancel, false).await
    }

    async fn poll(
        &self,
        client: &FailoverClient,
        deadline: Duration,
        cancel: &CancellationToken,
        want_up: bool,
    ) -> bool {
        let rounds = async {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let up = self.any_node_up(client).await;
                debug!("Readiness round: any node up = {}", up);
                if up == want_up {
                    return true;
                }
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                warn!("Readiness polling cancelled");
                false
            }
            result = timeout(deadline, rounds) => match result {
                Ok(reached) => reached,
                Err(_) => {
                    warn!("Readiness polling timed out after {:?}", deadline);
                    false
                }
            },
        }
    }

    /// Probe nodes in order, stopping at the first healthy one
    async fn any_node_up(&self, client: &FailoverClient) -> bool {
        for node in client.clients().await.iter() {
            match timeout(self.probe_timeout, node.health_check()).await {
                Ok(Ok(())) => return true,
                Ok(Err(e)) => debug!("{} not healthy: {}", node.endpoint(), e),
                Err(_) => debug!("{} health check timed out", node.endpoint()),
            }
        }
        false
    }
}
