//! The three topology variants (spec.md §4.4) expressed as small strategy
//! objects rather than the mixin inheritance nova uses (spec.md §9 design
//! notes): each implements [`TopologyPolicy`], and `NetworkManager` holds
//! one behind a trait object chosen by a factory at construction time.

use std::net::{IpAddr, Ipv4Addr};

use net_core::error::{NetworkError, NetworkResult};
use net_core::ip::prefix::IpNetwork;
use net_core::model::{Network, Topology};

/// Reserved bottom/top slot counts, handed to [`net_db::address_pool::bulk_create`]
/// at network-creation time (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservedSlots {
    pub bottom: u64,
    pub top: u64,
}

pub trait TopologyPolicy: Send + Sync {
    fn kind(&self) -> Topology;

    fn reserved_slots(&self, cnt_vpn_clients: u32) -> ReservedSlots;

    fn runs_dhcp(&self) -> bool {
        self.kind().runs_dhcp()
    }

    fn supports_floating_ips(&self) -> bool {
        self.kind().supports_floating_ips()
    }

    fn reaps_fixed_ips(&self) -> bool {
        self.kind().reaps_fixed_ips()
    }

    fn creates_bridge(&self) -> bool;
    fn creates_vlan(&self) -> bool;
    fn requires_bridge_interface(&self) -> bool;
    fn requires_bridge_at_create(&self) -> bool;

    /// Whether networks of this variant are scoped globally or per-project
    /// (spec.md §4.4 "Project scoping" row).
    fn is_project_scoped(&self) -> bool;

    /// Re-assert bridge/VLAN/DHCP driver state for `network` on this host.
    /// Driver subprocess internals are a Non-goal (spec.md §1); this is the
    /// seam a concrete implementation plugs into. Called after DB commits
    /// so a crash mid-allocation leaves a reconcilable state (spec.md §5).
    fn setup_network_on_host(&self, network: &Network) {
        tracing::debug!(
            network_id = %network.id,
            bridge = %network.bridge,
            variant = ?self.kind(),
            "setup_network_on_host"
        );
    }

    fn teardown_network_on_host(&self, network: &Network) {
        tracing::debug!(
            network_id = %network.id,
            bridge = %network.bridge,
            variant = ?self.kind(),
            "teardown_network_on_host"
        );
    }
}

pub struct FlatPolicy;

impl TopologyPolicy for FlatPolicy {
    fn kind(&self) -> Topology {
        Topology::Flat
    }

    fn reserved_slots(&self, _cnt_vpn_clients: u32) -> ReservedSlots {
        ReservedSlots { bottom: 2, top: 1 }
    }

    fn creates_bridge(&self) -> bool {
        false
    }

    fn creates_vlan(&self) -> bool {
        false
    }

    fn requires_bridge_interface(&self) -> bool {
        false
    }

    fn requires_bridge_at_create(&self) -> bool {
        true
    }

    fn is_project_scoped(&self) -> bool {
        false
    }
}

pub struct FlatDhcpPolicy;

impl TopologyPolicy for FlatDhcpPolicy {
    fn kind(&self) -> Topology {
        Topology::FlatDhcp
    }

    fn reserved_slots(&self, _cnt_vpn_clients: u32) -> ReservedSlots {
        ReservedSlots { bottom: 2, top: 1 }
    }

    fn creates_bridge(&self) -> bool {
        true
    }

    fn creates_vlan(&self) -> bool {
        false
    }

    fn requires_bridge_interface(&self) -> bool {
        false
    }

    fn requires_bridge_at_create(&self) -> bool {
        true
    }

    fn is_project_scoped(&self) -> bool {
        false
    }
}

pub struct VlanPolicy;

impl TopologyPolicy for VlanPolicy {
    fn kind(&self) -> Topology {
        Topology::Vlan
    }

    fn reserved_slots(&self, cnt_vpn_clients: u32) -> ReservedSlots {
        ReservedSlots {
            bottom: 3,
            top: 1 + cnt_vpn_clients as u64,
        }
    }

    fn creates_bridge(&self) -> bool {
        true
    }

    fn creates_vlan(&self) -> bool {
        true
    }

    fn requires_bridge_interface(&self) -> bool {
        true
    }

    fn requires_bridge_at_create(&self) -> bool {
        false
    }

    fn is_project_scoped(&self) -> bool {
        true
    }
}

pub fn policy_for(topology: Topology) -> Box<dyn TopologyPolicy> {
    match topology {
        Topology::Flat => Box::new(FlatPolicy),
        Topology::FlatDhcp => Box::new(FlatDhcpPolicy),
        Topology::Vlan => Box::new(VlanPolicy),
    }
}

/// One subnet carved out of a VLAN create-time CIDR (spec.md §4.4).
#[derive(Debug, Clone, PartialEq)]
pub struct VlanSubnet {
    pub cidr: IpNetwork,
    pub vlan: u16,
    pub vpn_public_port: u16,
    pub bridge: String,
    pub vpn_private_address: IpAddr,
    pub dhcp_start: IpAddr,
}

/// Carve `cidr` into `num_networks` subnets sized from the configured
/// `network_size` hint (nova's `subnet_bits = ceil(log2(network_size))`,
/// `nova/network/manager.py:1607-1619`) and assign each a VLAN tag, VPN
/// port, bridge name, VPN private address, and DHCP start address (spec.md
/// §4.4 VLAN create-time algorithm). Rejects when `cidr` is too small to
/// hold `num_networks` subnets of that size (spec.md §4.4: "validate
/// `len(cidr) ≥ num_networks × network_size`").
pub fn carve_vlan_subnets(
    cidr: ipnetwork::Ipv4Network,
    num_networks: u32,
    vlan_start: u16,
    vpn_start: u16,
    network_size: u32,
) -> NetworkResult<Vec<VlanSubnet>> {
    let max_tag = vlan_start as u32 + num_networks;
    if max_tag > 4094 {
        return Err(NetworkError::VlanRangeExceeded {
            requested: max_tag,
            max: 4094,
        });
    }

    let subnet_bits = (network_size.max(1) as f64).log2().ceil() as u32;
    let subnet_prefix_len = 32u32.saturating_sub(subnet_bits);
    if subnet_prefix_len < cidr.prefix() as u32 {
        return Err(NetworkError::NetworkNotCreated {
            label: String::new(),
            reason: "network_size is larger than the fixed range".to_string(),
        });
    }
    let subnet_size = 1u128 << (32 - subnet_prefix_len);

    if (num_networks as u128) * subnet_size > cidr.size() as u128 {
        return Err(NetworkError::NetworkNotCreated {
            label: String::new(),
            reason: format!(
                "fixed range holds {} addresses, but num_networks={num_networks} at network_size={network_size} needs {}",
                cidr.size(),
                num_networks as u128 * subnet_size
            ),
        });
    }

    let base = u32::from(cidr.ip());
    let mut subnets = Vec::with_capacity(num_networks as usize);
    for i in 0..num_networks {
        let subnet_base = base + (i as u128 * subnet_size) as u32;
        let subnet_addr = Ipv4Addr::from(subnet_base);
        let subnet =
            ipnetwork::Ipv4Network::new(subnet_addr, subnet_prefix_len as u8).map_err(|_| {
                NetworkError::NetworkNotCreated {
                    label: String::new(),
                    reason: "failed to construct carved VLAN subnet".to_string(),
                }
            })?;

        let vlan = vlan_start + i as u16;
        subnets.push(VlanSubnet {
            cidr: IpNetwork::V4(subnet),
            vlan,
            vpn_public_port: vpn_start + i as u16,
            bridge: format!("br{vlan}"),
            vpn_private_address: IpAddr::V4(Ipv4Addr::from(subnet_base + 2)),
            dhcp_start: IpAddr::V4(Ipv4Addr::from(subnet_base + 3)),
        });
    }

    Ok(subnets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carves_equal_subnets_with_expected_fields() {
        // S2 from spec.md §8: 10.0.0.0/24, num_networks=1, network_size=16,
        // vlan_start=100 => a single /28 subnet, not the whole /24.
        let cidr = "10.0.0.0/24".parse().unwrap();
        let subnets = carve_vlan_subnets(cidr, 1, 100, 1000, 16).unwrap();
        assert_eq!(subnets.len(), 1);
        let subnet = &subnets[0];
        assert_eq!(subnet.vlan, 100);
        assert_eq!(subnet.bridge, "br100");
        assert_eq!(subnet.vpn_public_port, 1000);
        assert_eq!(subnet.cidr, IpNetwork::V4("10.0.0.0/28".parse().unwrap()));
        assert_eq!(subnet.vpn_private_address, "10.0.0.2".parse::<IpAddr>().unwrap());
        assert_eq!(subnet.dhcp_start, "10.0.0.3".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn carves_sequential_subnets_of_the_configured_size() {
        let cidr = "10.0.0.0/24".parse().unwrap();
        let subnets = carve_vlan_subnets(cidr, 2, 100, 1000, 16).unwrap();
        assert_eq!(subnets.len(), 2);
        assert_eq!(subnets[0].cidr, IpNetwork::V4("10.0.0.0/28".parse().unwrap()));
        assert_eq!(subnets[1].cidr, IpNetwork::V4("10.0.0.16/28".parse().unwrap()));
        assert_eq!(subnets[1].vlan, 101);
    }

    #[test]
    fn rejects_vlan_range_overflow() {
        // num_networks + vlan_start = 4095 is rejected (spec.md §8).
        let cidr = "10.0.0.0/16".parse().unwrap();
        let result = carve_vlan_subnets(cidr, 1, 4094, 1000, 256);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_when_range_too_small_for_num_networks_times_network_size() {
        // 10.0.0.0/28 has 16 addresses; 2 networks at network_size=16 need 32.
        let cidr = "10.0.0.0/28".parse().unwrap();
        let result = carve_vlan_subnets(cidr, 2, 100, 1000, 16);
        assert!(result.is_err());
    }

    #[test]
    fn flat_and_flat_dhcp_reserve_two_and_one() {
        let flat = FlatPolicy;
        assert_eq!(flat.reserved_slots(0), ReservedSlots { bottom: 2, top: 1 });
        let flat_dhcp = FlatDhcpPolicy;
        assert_eq!(
            flat_dhcp.reserved_slots(0),
            ReservedSlots { bottom: 2, top: 1 }
        );
    }

    #[test]
    fn vlan_reserves_three_plus_vpn_clients() {
        let vlan = VlanPolicy;
        assert_eq!(vlan.reserved_slots(0), ReservedSlots { bottom: 3, top: 1 });
        assert_eq!(vlan.reserved_slots(4), ReservedSlots { bottom: 3, top: 5 });
    }
}
