//! Abstracts the transport a forwarded call travels over. The wire format
//! itself is a Non-goal (spec.md §1); this trait is the seam a concrete
//! gRPC/HTTP implementation plugs into without the router needing to know
//! about it.

use std::net::IpAddr;

use async_trait::async_trait;
use net_core::model::FloatingIp;
use net_core::netinfo::NetworkInfo;
use net_uuid::floating_ip::FloatingIpId;
use net_uuid::instance::InstanceId;
use net_uuid::network::NetworkId;

use crate::errors::RpcError;

/// The subset of the RPC surface (spec.md §6) that can be *forwarded* to a
/// remote host by the Network Ownership Router: `allocate_fixed_ip`,
/// `deallocate_fixed_ip`, `associate_floating_ip`, `disassociate_floating_ip`.
#[async_trait]
pub trait NetworkRpcClient: Send + Sync {
    async fn allocate_fixed_ip(
        &self,
        host: &str,
        instance_id: InstanceId,
        network_id: NetworkId,
        address: Option<IpAddr>,
    ) -> Result<IpAddr, RpcError>;

    async fn deallocate_fixed_ip(
        &self,
        host: &str,
        address: IpAddr,
        teardown: bool,
    ) -> Result<(), RpcError>;

    async fn associate_floating_ip(
        &self,
        host: &str,
        floating_ip_id: FloatingIpId,
        fixed_ip_address: IpAddr,
    ) -> Result<FloatingIp, RpcError>;

    async fn disassociate_floating_ip(
        &self,
        host: &str,
        floating_ip_id: FloatingIpId,
    ) -> Result<(), RpcError>;

    async fn get_instance_nw_info(
        &self,
        host: &str,
        instance_id: InstanceId,
    ) -> Result<NetworkInfo, RpcError>;
}
