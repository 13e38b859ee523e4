use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::config::MembershipSettings;
use crate::heartbeat::LastPublish;

/// Fails the node fast once it has gone `sync_timeout` without a successful publish.
///
/// By then the node's lease may already have expired and the rest of the fleet considers it
/// gone, so the node must not keep serving. Firing cancels the process-wide `fatal` token; the
/// process owner is expected to stop the runtime and exit so a supervisor restarts it.
#[derive(Debug)]
pub struct LivenessWatchdog {
    last_publish: LastPublish,
    period: Duration,
    timeout: Duration,
    fatal: CancellationToken,
}

impl LivenessWatchdog {
    pub fn new(last_publish: LastPublish, settings: &MembershipSettings, fatal: CancellationToken) -> Self {
        Self {
            last_publish,
            period: settings.sync_member_time(),
            timeout: settings.sync_timeout(),
            fatal,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.last_publish.elapsed() >= self.timeout
    }

    /// Polls every `sync_member_time` and returns after firing, so it fires at most once.
    pub async fn run(self) -> Duration {
        loop {
            let stale = self.last_publish.elapsed();
            if stale >= self.timeout {
                error!("no successful publish for {:?}, exceeds sync timeout {:?}, stop the node", stale, self.timeout);
                self.fatal.cancel();
                return stale;
            }
            tokio::time::sleep(self.period).await;
        }
    }
}
