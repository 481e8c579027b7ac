//! The Floating IP Engine (spec.md §4.5): quota-gated pool allocation,
//! association/disassociation with stale-reference detection, and the
//! migration start/finish hand-off.

use std::net::IpAddr;

use net_core::error::{NetworkError, NetworkResult};
use net_core::model::FloatingIp;
use net_core::notify::FloatingIpEvent;
use net_db::error::DatabaseError;
use net_db::safe_pg_pool::SafePgPool;
use net_rpc::{NetworkRpcClient, RpcError};
use net_uuid::floating_ip::FloatingIpId;
use net_uuid::instance::InstanceId;
use net_uuid::project::ProjectId;

/// Acquires (or releases) quota for one floating IP. Non-goal: quota
/// accounting internals (spec.md §1) — this is the narrow interface the
/// engine reserves/commits/rolls back against.
#[async_trait::async_trait]
pub trait QuotaReservation: Send + Sync {
    async fn reserve(&self, project_id: ProjectId) -> NetworkResult<()>;
    async fn commit(&self, project_id: ProjectId) -> NetworkResult<()>;
    async fn rollback(&self, project_id: ProjectId) -> NetworkResult<()>;
}

#[derive(Clone)]
pub struct FloatingIpEngine {
    db: SafePgPool,
    rpc: std::sync::Arc<dyn NetworkRpcClient>,
    quota: std::sync::Arc<dyn QuotaReservation>,
}

impl FloatingIpEngine {
    pub fn new(
        db: SafePgPool,
        rpc: std::sync::Arc<dyn NetworkRpcClient>,
        quota: std::sync::Arc<dyn QuotaReservation>,
    ) -> Self {
        Self { db, rpc, quota }
    }

    /// Allocate one floating IP from `pool` for `project_id`. Auto-assigned
    /// IPs bypass quota (spec.md §4.5).
    pub async fn allocate_address(
        &mut self,
        pool: &str,
        project_id: ProjectId,
        auto_assigned: bool,
    ) -> Result<FloatingIp, DatabaseError> {
        if !auto_assigned {
            self.quota
                .reserve(project_id)
                .await
                .map_err(DatabaseError::Domain)?;
        }

        let result = self
            .db
            .with_txn(|txn| {
                let pool = pool.to_string();
                async move {
                    net_db::floating_ip::allocate_address(txn, &pool, project_id, auto_assigned)
                        .await
                }
            })
            .await;

        match result {
            Ok(floating) => {
                if !auto_assigned {
                    self.quota
                        .commit(project_id)
                        .await
                        .map_err(DatabaseError::Domain)?;
                }
                tracing::info!(address = %floating.address, pool, "allocated floating ip");
                let _event = FloatingIpEvent::Allocate {
                    project_id,
                    floating_ip: floating.address,
                };
                Ok(floating)
            }
            Err(e) => {
                if !auto_assigned {
                    let _ = self.quota.rollback(project_id).await;
                }
                Err(e)
            }
        }
    }

    /// Release a floating IP back to its pool. Rejected with
    /// `FloatingIpAssociated` while still linked to a fixed IP (spec.md §3,
    /// §8).
    pub async fn release_address(
        &mut self,
        id: FloatingIpId,
        project_id: ProjectId,
    ) -> Result<(), DatabaseError> {
        self.db
            .with_txn(|txn| async move {
                let floating = net_db::floating_ip::find_by_id(txn, id).await?;
                if floating.is_associated() {
                    return Err(DatabaseError::Domain(NetworkError::FloatingIpAssociated {
                        address: floating.address,
                    }));
                }
                net_db::floating_ip::release_address(txn, id).await?;
                Ok(floating.address)
            })
            .await
            .map(|address| {
                let _event = FloatingIpEvent::Deallocate {
                    project_id,
                    floating_ip: address,
                };
            })
    }

    /// Fetch a floating IP and verify the caller's project owns it. An
    /// auto-assigned floating IP is exempt from the owner check only when
    /// the caller opts in via `allow_auto_assigned` (spec.md §3, §4.5).
    async fn verify_ownership(
        &mut self,
        floating_id: FloatingIpId,
        project_id: ProjectId,
        allow_auto_assigned: bool,
    ) -> Result<FloatingIp, DatabaseError> {
        let floating = self
            .db
            .with_txn(|txn| async move { net_db::floating_ip::find_by_id(txn, floating_id).await })
            .await?;

        if floating.auto_assigned && allow_auto_assigned {
            return Ok(floating);
        }
        if floating.project_id != Some(project_id) {
            return Err(DatabaseError::Domain(NetworkError::NotAuthorized {
                project_id: project_id.to_string(),
            }));
        }
        Ok(floating)
    }

    /// Associate a floating IP with a fixed IP. Verifies ownership first; if
    /// already associated, disassociates first and returns the previous
    /// owning instance, then routes the link+driver call to the owning host
    /// (spec.md §4.5).
    pub async fn associate(
        &mut self,
        floating_id: FloatingIpId,
        fixed_ip_address: IpAddr,
        owning_host: &str,
        interface: &str,
        project_id: ProjectId,
        instance_id: InstanceId,
        allow_auto_assigned: bool,
    ) -> Result<Option<InstanceId>, DatabaseError> {
        self.verify_ownership(floating_id, project_id, allow_auto_assigned)
            .await?;
        let previous = self.disassociate_if_linked(floating_id, project_id).await?;

        let linked = self
            .db
            .with_txn(|txn| async move {
                net_db::floating_ip::link_to_fixed_ip(
                    txn,
                    floating_id,
                    fixed_ip_address,
                    owning_host,
                    interface,
                )
                .await
            })
            .await?;

        match self
            .rpc
            .associate_floating_ip(owning_host, floating_id, fixed_ip_address)
            .await
        {
            Ok(_) => {
                let _event = FloatingIpEvent::Associate {
                    project_id,
                    instance_id,
                    floating_ip: linked.address,
                };
                Ok(previous)
            }
            Err(RpcError::Domain(NetworkError::NoFloatingIpInterface { address })) => {
                self.db
                    .with_txn(|txn| async move { net_db::floating_ip::unlink(txn, floating_id).await })
                    .await?;
                Err(DatabaseError::Domain(NetworkError::NoFloatingIpInterface { address }))
            }
            Err(other) => Err(DatabaseError::Domain(NetworkError::ProcessExecutionError(
                other.to_string(),
            ))),
        }
    }

    /// Caller-facing disassociate (spec.md §4.5, §7): verifies ownership,
    /// rejects an auto-assigned floating IP unless the caller opts in
    /// (`CannotDisassociateAutoAssignedFloatingIp`), and rejects an
    /// already-unassociated floating IP (`FloatingIpNotAssociated`) rather
    /// than silently no-op'ing.
    pub async fn disassociate(
        &mut self,
        floating_id: FloatingIpId,
        project_id: ProjectId,
        allow_auto_assigned: bool,
    ) -> Result<Option<InstanceId>, DatabaseError> {
        let floating = self
            .verify_ownership(floating_id, project_id, allow_auto_assigned)
            .await?;

        if floating.auto_assigned && !allow_auto_assigned {
            return Err(DatabaseError::Domain(
                NetworkError::CannotDisassociateAutoAssignedFloatingIp {
                    address: floating.address,
                },
            ));
        }
        if !floating.is_associated() {
            return Err(DatabaseError::Domain(NetworkError::FloatingIpNotAssociated {
                address: floating.address,
            }));
        }

        self.disassociate_if_linked(floating_id, project_id).await
    }

    /// Disassociate a floating IP if currently linked; returns the previous
    /// owning instance (looked up via the fixed IP it was pointed at) so a
    /// subsequent re-associate can notify the caller. No ownership or
    /// auto-assigned check — used internally by [`Self::associate`] (which
    /// verifies ownership itself) and by migration hand-off.
    pub async fn disassociate_if_linked(
        &mut self,
        floating_id: FloatingIpId,
        project_id: ProjectId,
    ) -> Result<Option<InstanceId>, DatabaseError> {
        let floating = self
            .db
            .with_txn(|txn| async move { net_db::floating_ip::find_by_id(txn, floating_id).await })
            .await?;

        if !floating.is_associated() {
            return Ok(None);
        }

        let previous_instance = match floating.fixed_ip_address {
            Some(address) => {
                self.db
                    .with_txn(|txn| async move { net_db::fixed_ip::find_by_address(txn, address).await })
                    .await?
                    .and_then(|fixed| fixed.instance_id)
            }
            None => None,
        };

        let owning_host = floating.host.clone();
        if let Some(host) = &owning_host {
            self.rpc
                .disassociate_floating_ip(host, floating_id)
                .await
                .map_err(|e| DatabaseError::Domain(NetworkError::ProcessExecutionError(e.to_string())))?;
        }

        self.db
            .with_txn(|txn| async move { net_db::floating_ip::unlink(txn, floating_id).await })
            .await?;

        if let Some(instance_id) = previous_instance {
            let _event = FloatingIpEvent::Disassociate {
                project_id,
                instance_id,
                floating_ip: floating.address,
            };
        }

        Ok(previous_instance)
    }

    /// `migrate_instance_start` (spec.md §4.5): remove plumbing on the
    /// source host and null the floating IP's `host`. Stale references
    /// (floating no longer belongs to the instance) are skipped, not
    /// errored.
    pub async fn migrate_instance_start(
        &mut self,
        floating_ids: &[FloatingIpId],
        fixed_ip_address: IpAddr,
    ) -> Result<(), DatabaseError> {
        for &id in floating_ids {
            let floating = match self
                .db
                .with_txn(|txn| async move { net_db::floating_ip::find_by_id(txn, id).await })
                .await
            {
                Ok(f) => f,
                Err(_) => {
                    tracing::warn!(floating_ip_id = %id, "stale floating ip reference during migrate start, skipping");
                    continue;
                }
            };
            if Self::is_stale(&floating, fixed_ip_address) {
                tracing::warn!(floating_ip_id = %id, "stale floating ip during migrate start, skipping");
                continue;
            }
            let host = floating.host.clone().unwrap_or_default();
            let _ = self.rpc.disassociate_floating_ip(&host, id).await;
            self.db
                .with_txn(|txn| async move { net_db::floating_ip::unlink(txn, id).await })
                .await?;
        }
        Ok(())
    }

    /// `migrate_instance_finish`: re-add plumbing on `dest` and set `host`.
    pub async fn migrate_instance_finish(
        &mut self,
        floating_ids: &[FloatingIpId],
        fixed_ip_address: IpAddr,
        dest_host: &str,
        interface: &str,
    ) -> Result<(), DatabaseError> {
        for &id in floating_ids {
            let linked = match self
                .db
                .with_txn(|txn| async move {
                    net_db::floating_ip::link_to_fixed_ip(txn, id, fixed_ip_address, dest_host, interface)
                        .await
                })
                .await
            {
                Ok(f) => f,
                Err(_) => {
                    tracing::warn!(floating_ip_id = %id, "stale floating ip reference during migrate finish, skipping");
                    continue;
                }
            };
            let _ = self
                .rpc
                .associate_floating_ip(dest_host, id, linked.address)
                .await;
        }
        Ok(())
    }

    /// A floating IP is stale for migration purposes iff its ownership
    /// check fails (it no longer points at the fixed IP being migrated) or
    /// no fixed IP is associated at all (spec.md §4.5).
    fn is_stale(floating: &FloatingIp, fixed_ip_address: IpAddr) -> bool {
        match floating.fixed_ip_address {
            Some(addr) => addr != fixed_ip_address,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use net_uuid::project::ProjectId;

    fn floating(fixed_ip_address: Option<IpAddr>) -> FloatingIp {
        FloatingIp {
            id: FloatingIpId::new_v4(),
            address: "192.0.2.5".parse().unwrap(),
            fixed_ip_address,
            project_id: Some(ProjectId::new_v4()),
            pool: "nova".to_string(),
            auto_assigned: false,
            host: Some("host-a".to_string()),
            interface: Some("eth0".to_string()),
        }
    }

    #[test]
    fn stale_when_pointed_at_a_different_fixed_ip() {
        let other: IpAddr = "10.0.0.9".parse().unwrap();
        let target: IpAddr = "10.0.0.2".parse().unwrap();
        assert!(FloatingIpEngine::is_stale(&floating(Some(other)), target));
    }

    #[test]
    fn not_stale_when_pointed_at_the_migrating_fixed_ip() {
        let target: IpAddr = "10.0.0.2".parse().unwrap();
        assert!(!FloatingIpEngine::is_stale(&floating(Some(target)), target));
    }

    #[test]
    fn stale_when_no_fixed_ip_associated() {
        let target: IpAddr = "10.0.0.2".parse().unwrap();
        assert!(FloatingIpEngine::is_stale(&floating(None), target));
    }
}
