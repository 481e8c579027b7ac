//! The `NetworkInfo` model returned to compute (spec.md §6): an ordered
//! sequence of VIFs, each carrying its network and the network's subnets.

use std::net::IpAddr;

use net_uuid::network::NetworkId;
use net_uuid::vif::VifId;
use serde::{Deserialize, Serialize};

use crate::model::MacAddressDef;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub vifs: Vec<VifInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VifInfo {
    pub id: VifId,
    pub address: MacAddressDef,
    pub network: Option<NetworkModel>,
    pub rxtx_cap: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkModel {
    pub id: NetworkId,
    pub bridge: String,
    pub label: String,
    pub tenant_id: Option<String>,
    pub injected: Option<bool>,
    pub subnets: Vec<Subnet>,
    pub should_create_bridge: Option<bool>,
    pub should_create_vlan: Option<bool>,
    pub vlan: Option<u16>,
    pub bridge_interface: Option<String>,
    pub multi_host: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subnet {
    pub cidr: String,
    pub gateway: IpAddr,
    pub dhcp_server: Option<IpAddr>,
    pub dns: Vec<IpAddr>,
    pub routes: Vec<Route>,
    pub ips: Vec<SubnetFixedIp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub cidr: String,
    pub gateway: IpAddr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubnetFixedIp {
    pub address: IpAddr,
    pub version: u8,
    pub floating_ips: Vec<FloatingIpRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloatingIpRef {
    pub address: IpAddr,
    #[serde(rename = "type")]
    pub kind: String,
}

impl SubnetFixedIp {
    pub fn version_of(address: &IpAddr) -> u8 {
        match address {
            IpAddr::V4(_) => 4,
            IpAddr::V6(_) => 6,
        }
    }
}
