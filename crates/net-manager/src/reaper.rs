//! The Periodic Reaper (spec.md §4.7): on every tick, disassociates
//! FixedIPs on this host whose lease has sat stale past
//! `fixed_ip_disassociate_timeout`. The Flat variant disables this — its
//! leases are externally managed (spec.md §4.1, §4.4).

use std::time::Duration;

use net_db::error::DatabaseError;
use net_db::safe_pg_pool::SafePgPool;

pub struct Reaper {
    db: SafePgPool,
    host: String,
    timeout: Duration,
}

impl Reaper {
    pub fn new(db: SafePgPool, host: impl Into<String>, timeout: Duration) -> Self {
        Self {
            db,
            host: host.into(),
            timeout,
        }
    }

    /// Run one reaper pass: disassociate every stale FixedIP on this host
    /// and log the count reclaimed (spec.md §4.7, scenario S6).
    pub async fn run_once(&mut self) -> Result<u64, DatabaseError> {
        let cutoff = chrono::Utc::now()
            - chrono::Duration::from_std(self.timeout).unwrap_or(chrono::Duration::seconds(600));
        let host = self.host.clone();

        let reclaimed = self
            .db
            .with_txn(|txn| async move { net_db::address_pool::reap_stale(txn, &host, cutoff).await })
            .await?;

        if reclaimed > 0 {
            tracing::info!(host = %self.host, reclaimed, "reaper disassociated stale fixed ips");
        } else {
            tracing::debug!(host = %self.host, "reaper pass found nothing to reclaim");
        }

        Ok(reclaimed)
    }

    /// Drive `run_once` on a fixed interval until the process shuts down.
    /// Periodic tasks are serialized by this loop but may overlap with
    /// RPC-driven operations on the same manager (spec.md §5).
    pub async fn run_forever(mut self, tick: Duration) {
        let mut interval = tokio::time::interval(tick);
        loop {
            interval.tick().await;
            if let Err(error) = self.run_once().await {
                tracing::error!(%error, "reaper pass failed");
            }
        }
    }
}
