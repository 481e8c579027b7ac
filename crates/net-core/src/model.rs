//! Entities owned by the network control plane: [`Network`], [`FixedIp`],
//! [`Vif`], [`FloatingIp`], [`DnsDomain`], and the scheduler-facing
//! [`HostState`]. These are plain records; persistence lives in `net-db`.

use std::net::IpAddr;
use std::time::SystemTime;

use mac_address::MacAddress;
use net_uuid::dns::DnsDomainId;
use net_uuid::floating_ip::FloatingIpId;
use net_uuid::instance::InstanceId;
use net_uuid::network::NetworkId;
use net_uuid::project::ProjectId;
use net_uuid::vif::VifId;
use serde::{Deserialize, Serialize};

use crate::ip::prefix::IpNetwork;

/// The three manager variants sharing one policy (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text", rename_all = "lowercase"))]
pub enum Topology {
    Flat,
    FlatDhcp,
    Vlan,
}

impl Topology {
    /// Whether this variant runs a DHCP server on the managed bridge.
    pub fn runs_dhcp(&self) -> bool {
        matches!(self, Topology::FlatDhcp | Topology::Vlan)
    }

    /// Whether this variant supports floating IPs at all, or stubs the
    /// operation out with an empty result (Flat).
    pub fn supports_floating_ips(&self) -> bool {
        !matches!(self, Topology::Flat)
    }

    /// Whether the periodic reaper (§4.7) runs for networks of this
    /// variant. Flat leases are externally managed.
    pub fn reaps_fixed_ips(&self) -> bool {
        !matches!(self, Topology::Flat)
    }
}

/// A managed L2/L3 network (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Network {
    pub id: NetworkId,
    pub topology: Topology,
    pub label: String,
    /// Always an `IpNetwork::V4` when present; sqlx only binds the ipnetwork
    /// enum type directly, not its per-family variants, so the address
    /// family is asserted at construction rather than the type level.
    pub cidr_v4: Option<IpNetwork>,
    pub cidr_v6: Option<IpNetwork>,
    pub gateway_v4: Option<IpAddr>,
    pub gateway_v6: Option<IpAddr>,
    pub bridge: String,
    pub bridge_interface: Option<String>,
    pub dns: Vec<IpAddr>,
    pub vlan: Option<u16>,
    pub vpn_public_address: Option<IpAddr>,
    pub vpn_private_address: Option<IpAddr>,
    pub multi_host: bool,
    pub host: Option<String>,
    pub project_id: Option<ProjectId>,
    pub injected: bool,
}

impl Network {
    /// Label length is bounded at 255 characters per spec.md §3.
    pub const MAX_LABEL_LEN: usize = 255;

    /// At least one of `cidr_v4` / `cidr_v6` must be set at creation time.
    pub fn has_cidr(&self) -> bool {
        self.cidr_v4.is_some() || self.cidr_v6.is_some()
    }
}

/// A single address drawn from a [`Network`]'s CIDR (spec.md §3, §4.1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct FixedIp {
    pub address: IpAddr,
    pub network_id: NetworkId,
    pub reserved: bool,
    pub allocated: bool,
    pub leased: bool,
    pub instance_id: Option<InstanceId>,
    pub vif_id: Option<VifId>,
    pub updated_at: SystemTime,
}

impl FixedIp {
    /// `leased=true` implies `allocated=true`; callers should warn, not
    /// fail, if this invariant is violated (spec.md §3).
    pub fn is_invariant_violated(&self) -> bool {
        self.leased && !self.allocated
    }
}

/// The (MAC, instance, network) tuple recorded for a virtual interface
/// (spec.md §3, GLOSSARY).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Vif {
    pub id: VifId,
    pub address: MacAddressDef,
    pub instance_id: InstanceId,
    pub network_id: NetworkId,
}

/// `mac_address::MacAddress` doesn't implement `Serialize`/`Deserialize`, so
/// this wraps it the way the rest of the workspace wraps foreign types that
/// need to cross a serde boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddressDef(pub MacAddress);

impl Serialize for MacAddressDef {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for MacAddressDef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<MacAddress>()
            .map(MacAddressDef)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(feature = "sqlx")]
impl sqlx::Type<sqlx::Postgres> for MacAddressDef {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <MacAddress as sqlx::Type<sqlx::Postgres>>::type_info()
    }
}

#[cfg(feature = "sqlx")]
impl sqlx::Decode<'_, sqlx::Postgres> for MacAddressDef {
    fn decode(
        value: sqlx::postgres::PgValueRef<'_>,
    ) -> Result<Self, sqlx::error::BoxDynError> {
        <MacAddress as sqlx::Decode<sqlx::Postgres>>::decode(value).map(MacAddressDef)
    }
}

#[cfg(feature = "sqlx")]
impl sqlx::Encode<'_, sqlx::Postgres> for MacAddressDef {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <MacAddress as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

/// A publicly routable address dynamically associated with a [`FixedIp`]
/// (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct FloatingIp {
    pub id: FloatingIpId,
    pub address: IpAddr,
    pub fixed_ip_address: Option<IpAddr>,
    pub project_id: Option<ProjectId>,
    pub pool: String,
    pub auto_assigned: bool,
    pub host: Option<String>,
    pub interface: Option<String>,
}

impl FloatingIp {
    pub fn is_associated(&self) -> bool {
        self.fixed_ip_address.is_some()
    }
}

/// DNS domain scope (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text", rename_all = "lowercase"))]
pub enum DnsScope {
    Private,
    Public,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct DnsDomain {
    pub id: DnsDomainId,
    pub domain: String,
    pub scope: DnsScope,
    pub availability_zone: Option<String>,
    pub project_id: Option<ProjectId>,
}

/// A resource snapshot for one scheduling candidate (spec.md §3, §4.6).
/// Built once per scheduling pass and mutated in place by
/// `consume_from_instance`; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostState {
    pub host: String,
    pub node: String,
    pub free_ram_mb: i64,
    pub free_disk_gb: i64,
    pub vcpus_total: i32,
    pub vcpus_used: i32,
    pub limits: HostLimits,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostLimits {
    pub memory_mb: Option<i64>,
    pub disk_gb: Option<i64>,
    pub vcpus: Option<i32>,
}

impl HostState {
    pub fn vcpus_free(&self) -> i32 {
        self.vcpus_total - self.vcpus_used
    }

    /// Virtually consume one instance's worth of resources from this
    /// snapshot (spec.md §4.6 step 4, GLOSSARY "Virtual consumption").
    /// Mutates in place so the next filter/weigh iteration in the same
    /// scheduling pass sees reduced capacity; never persisted.
    pub fn consume_from_instance(
        &mut self,
        memory_mb: i64,
        disk_gb: i64,
        vcpus: i32,
    ) {
        self.free_ram_mb -= memory_mb;
        self.free_disk_gb -= disk_gb;
        self.vcpus_used += vcpus;
    }
}
