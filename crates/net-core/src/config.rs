//! The option registry nova carried as mutable global state is replaced here
//! with an immutable record threaded through every constructor (spec.md
//! §9 design notes). `net-managerd` builds one of these from a
//! `clap::Parser` struct at startup; everything downstream only ever sees
//! `&Config`.

use std::net::IpAddr;
use std::time::Duration;

/// All tunables named in spec.md §6.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Low-level bridging driver identifier (Non-goal: its internals).
    pub network_driver: String,

    // Flat-mode plumbing.
    pub flat_network_bridge: Option<String>,
    pub flat_interface: Option<String>,
    pub flat_injected: bool,
    pub flat_network_dns: Vec<IpAddr>,

    // VLAN carve-up.
    pub vlan_start: u16,
    pub vlan_interface: Option<String>,
    pub num_networks: u32,

    // VPN reservation.
    pub vpn_ip: Option<IpAddr>,
    pub vpn_start: u16,
    pub cnt_vpn_clients: u32,

    /// Per-subnet size hint used by the non-VLAN carve-up.
    pub network_size: u32,

    // Address blocks.
    pub floating_range: Option<String>,
    pub default_floating_pool: String,
    pub fixed_range: Option<String>,
    pub fixed_range_v6: Option<String>,

    // Default gateways.
    pub gateway: Option<IpAddr>,
    pub gateway_v6: Option<IpAddr>,

    /// Default `multi_host` value for newly created networks.
    pub multi_host: bool,

    pub fixed_ip_disassociate_timeout: Duration,
    pub create_unique_mac_address_attempts: u32,
    pub auto_assign_floating_ip: bool,
    pub force_dhcp_release: bool,
    pub share_dhcp_address: bool,
    pub update_dns_entries: bool,
    pub dhcp_domain: String,

    /// Retry cap for the filter scheduler; must be `>= 1`. A value of `1`
    /// disables retry tracking entirely (spec.md §4.6 step 1).
    pub scheduler_max_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network_driver: "linux_net".to_string(),
            flat_network_bridge: None,
            flat_interface: None,
            flat_injected: false,
            flat_network_dns: Vec::new(),
            vlan_start: 100,
            vlan_interface: None,
            num_networks: 1,
            vpn_ip: None,
            vpn_start: 1000,
            cnt_vpn_clients: 0,
            network_size: 256,
            floating_range: None,
            default_floating_pool: "nova".to_string(),
            fixed_range: None,
            fixed_range_v6: None,
            gateway: None,
            gateway_v6: None,
            multi_host: false,
            fixed_ip_disassociate_timeout: Duration::from_secs(600),
            create_unique_mac_address_attempts: 5,
            auto_assign_floating_ip: false,
            force_dhcp_release: false,
            share_dhcp_address: false,
            update_dns_entries: false,
            dhcp_domain: "novalocal".to_string(),
            scheduler_max_attempts: 3,
        }
    }
}

impl Config {
    /// The last-resort highest VLAN tag a network may be assigned
    /// (spec.md §4.4: `vlan ∈ [vlan_start, 4094]`).
    pub const MAX_VLAN_TAG: u16 = 4094;

    pub fn validate(&self) -> Result<(), String> {
        if self.scheduler_max_attempts < 1 {
            return Err("scheduler_max_attempts must be >= 1".to_string());
        }
        Ok(())
    }
}
