//! The error taxonomy from spec.md §7, expressed as one `thiserror` enum.
//! Layers above this (`net-db`, `net-rpc`) wrap or convert `NetworkError`
//! rather than redefining these variants.

use std::net::IpAddr;

use net_uuid::instance::InstanceId;
use net_uuid::network::NetworkId;

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("quota exceeded for floating IP allocation in pool {pool}")]
    QuotaExceeded { pool: String },

    #[error("no more fixed IPs available in network {network_id}")]
    NoMoreFixedIps { network_id: NetworkId },

    #[error("fixed IP {address} is already in use by another instance")]
    FixedIpAlreadyInUse { address: IpAddr },

    #[error("fixed IP {address} not found in network {network_id}")]
    FixedIpNotFoundForNetwork {
        address: IpAddr,
        network_id: NetworkId,
    },

    #[error("fixed IP {address} is invalid: {reason}")]
    FixedIpInvalid { address: IpAddr, reason: String },

    #[error(
        "could not assign a unique MAC address to instance {instance_id} after {attempts} attempts"
    )]
    VirtualInterfaceMacAddressException {
        instance_id: InstanceId,
        attempts: u32,
    },

    #[error("driver reports no interface to attach floating IP {address} to")]
    NoFloatingIpInterface { address: IpAddr },

    #[error("floating IP {address} is already associated")]
    FloatingIpAssociated { address: IpAddr },

    #[error("floating IP {address} is not associated")]
    FloatingIpNotAssociated { address: IpAddr },

    #[error("floating IP {address} was auto-assigned and cannot be disassociated directly")]
    CannotDisassociateAutoAssignedFloatingIp { address: IpAddr },

    #[error("caller is not authorized to act on project {project_id}")]
    NotAuthorized { project_id: String },

    #[error("scheduler found no valid host for this request")]
    NoValidHost,

    #[error("network {label} could not be created: {reason}")]
    NetworkNotCreated { label: String, reason: String },

    #[error("driver process execution failed: {0}")]
    ProcessExecutionError(String),

    #[error("requested VLAN tag {requested} exceeds the configured maximum {max}")]
    VlanRangeExceeded { requested: u32, max: u32 },

    #[error("network {network_id} not found")]
    NetworkNotFound { network_id: NetworkId },

    #[error("instance {instance_id} not found")]
    InstanceNotFound { instance_id: InstanceId },

    #[error("requested subnet overlaps an existing network's supernet")]
    OverlapsExistingSupernet,

    #[error("requested subnet is overlapped by an existing network's subnet")]
    OverlapsExistingSubnet,

    #[error("no host is reachable to execute this mutation")]
    HostUnreachable { host: String },
}

pub type NetworkResult<T> = Result<T, NetworkError>;
