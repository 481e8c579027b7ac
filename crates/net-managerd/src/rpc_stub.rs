//! Default implementations of the seams the Network Ownership Router and
//! `NetworkManager` depend on. The RPC transport's wire format and the
//! service-group heartbeat mechanism are both Non-goals (spec.md §1); these
//! stand in until a concrete transport/heartbeat is wired into a real
//! deployment, the way `net_manager::manager::AllowAllPolicy` stands in for
//! a real policy engine.

use std::net::IpAddr;

use async_trait::async_trait;
use net_core::error::NetworkResult;
use net_core::model::FloatingIp;
use net_core::netinfo::NetworkInfo;
use net_manager::QuotaReservation;
use net_rpc::{HeartbeatOracle, NetworkRpcClient, RpcError};
use net_uuid::floating_ip::FloatingIpId;
use net_uuid::instance::InstanceId;
use net_uuid::network::NetworkId;
use net_uuid::project::ProjectId;

/// No transport is wired up: every forward fails with `NoClientForHost`
/// rather than silently succeeding, so a single-host deployment that never
/// needs to forward still behaves correctly, and a multi-host deployment
/// fails loudly until a real client is plugged in.
pub struct UnconfiguredRpcClient;

#[async_trait]
impl NetworkRpcClient for UnconfiguredRpcClient {
    async fn allocate_fixed_ip(
        &self,
        host: &str,
        _instance_id: InstanceId,
        _network_id: NetworkId,
        _address: Option<IpAddr>,
    ) -> Result<IpAddr, RpcError> {
        Err(RpcError::NoClientForHost { host: host.to_string() })
    }

    async fn deallocate_fixed_ip(&self, host: &str, _address: IpAddr, _teardown: bool) -> Result<(), RpcError> {
        Err(RpcError::NoClientForHost { host: host.to_string() })
    }

    async fn associate_floating_ip(
        &self,
        host: &str,
        _floating_ip_id: FloatingIpId,
        _fixed_ip_address: IpAddr,
    ) -> Result<FloatingIp, RpcError> {
        Err(RpcError::NoClientForHost { host: host.to_string() })
    }

    async fn disassociate_floating_ip(&self, host: &str, _floating_ip_id: FloatingIpId) -> Result<(), RpcError> {
        Err(RpcError::NoClientForHost { host: host.to_string() })
    }

    async fn get_instance_nw_info(&self, host: &str, _instance_id: InstanceId) -> Result<NetworkInfo, RpcError> {
        Err(RpcError::NoClientForHost { host: host.to_string() })
    }
}

/// No service-group heartbeat feed is wired up, so no host is ever treated
/// as stale: a teardown against an unconfigured remote host forwards
/// (and fails via [`UnconfiguredRpcClient`]) rather than silently
/// degrading to a local-only mutation.
pub struct NeverStaleHeartbeat;

#[async_trait]
impl HeartbeatOracle for NeverStaleHeartbeat {
    async fn is_stale(&self, _host: &str) -> bool {
        false
    }
}

/// No quota service is wired up (spec.md §1 Non-goal: quota accounting
/// integration), so every reservation is granted unconditionally — the
/// quota bracket still runs (reserve/commit/rollback, spec.md §5) but
/// always succeeds until a real accounting backend is plugged in.
pub struct UnlimitedQuota;

#[async_trait]
impl QuotaReservation for UnlimitedQuota {
    async fn reserve(&self, _project_id: ProjectId) -> NetworkResult<()> {
        Ok(())
    }

    async fn commit(&self, _project_id: ProjectId) -> NetworkResult<()> {
        Ok(())
    }

    async fn rollback(&self, _project_id: ProjectId) -> NetworkResult<()> {
        Ok(())
    }
}
