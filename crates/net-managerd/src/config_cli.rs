//! CLI flags with `env` fallbacks, one per `net_core::Config` option named
//! in spec.md §6 — following the teacher's `ssh-console` `main.rs`
//! convention of a flat `clap::Parser` struct whose fields feed an
//! immutable config record.

use std::net::IpAddr;
use std::time::Duration;

use clap::Parser;
use net_core::Config;

#[derive(Parser, Debug)]
#[command(name = "net-managerd", about = "Network Manager + Filter Scheduler daemon")]
pub struct Cli {
    #[arg(long, env = "NET_MANAGERD_DATABASE_URL")]
    pub database_url: String,

    /// This process's host identity, used by the Network Ownership Router
    /// (spec.md §4.2) and the Periodic Reaper (spec.md §4.7).
    #[arg(long, env = "NET_MANAGERD_HOST")]
    pub host: String,

    #[arg(long, env = "NET_MANAGERD_NETWORK_DRIVER", default_value = "linux_net")]
    pub network_driver: String,

    #[arg(long, env = "NET_MANAGERD_FLAT_NETWORK_BRIDGE")]
    pub flat_network_bridge: Option<String>,
    #[arg(long, env = "NET_MANAGERD_FLAT_INTERFACE")]
    pub flat_interface: Option<String>,
    #[arg(long, env = "NET_MANAGERD_FLAT_INJECTED")]
    pub flat_injected: bool,
    #[arg(long, env = "NET_MANAGERD_FLAT_NETWORK_DNS", value_delimiter = ',')]
    pub flat_network_dns: Vec<IpAddr>,

    #[arg(long, env = "NET_MANAGERD_VLAN_START", default_value_t = 100)]
    pub vlan_start: u16,
    #[arg(long, env = "NET_MANAGERD_VLAN_INTERFACE")]
    pub vlan_interface: Option<String>,
    #[arg(long, env = "NET_MANAGERD_NUM_NETWORKS", default_value_t = 1)]
    pub num_networks: u32,

    #[arg(long, env = "NET_MANAGERD_VPN_IP")]
    pub vpn_ip: Option<IpAddr>,
    #[arg(long, env = "NET_MANAGERD_VPN_START", default_value_t = 1000)]
    pub vpn_start: u16,
    #[arg(long, env = "NET_MANAGERD_CNT_VPN_CLIENTS", default_value_t = 0)]
    pub cnt_vpn_clients: u32,

    #[arg(long, env = "NET_MANAGERD_NETWORK_SIZE", default_value_t = 256)]
    pub network_size: u32,

    #[arg(long, env = "NET_MANAGERD_FLOATING_RANGE")]
    pub floating_range: Option<String>,
    #[arg(long, env = "NET_MANAGERD_DEFAULT_FLOATING_POOL", default_value = "nova")]
    pub default_floating_pool: String,
    #[arg(long, env = "NET_MANAGERD_FIXED_RANGE")]
    pub fixed_range: Option<String>,
    #[arg(long, env = "NET_MANAGERD_FIXED_RANGE_V6")]
    pub fixed_range_v6: Option<String>,

    #[arg(long, env = "NET_MANAGERD_GATEWAY")]
    pub gateway: Option<IpAddr>,
    #[arg(long, env = "NET_MANAGERD_GATEWAY_V6")]
    pub gateway_v6: Option<IpAddr>,

    #[arg(long, env = "NET_MANAGERD_MULTI_HOST")]
    pub multi_host: bool,

    #[arg(long, env = "NET_MANAGERD_FIXED_IP_DISASSOCIATE_TIMEOUT", default_value = "600s")]
    pub fixed_ip_disassociate_timeout: humantime::Duration,
    #[arg(long, env = "NET_MANAGERD_CREATE_UNIQUE_MAC_ADDRESS_ATTEMPTS", default_value_t = 5)]
    pub create_unique_mac_address_attempts: u32,
    #[arg(long, env = "NET_MANAGERD_AUTO_ASSIGN_FLOATING_IP")]
    pub auto_assign_floating_ip: bool,
    #[arg(long, env = "NET_MANAGERD_FORCE_DHCP_RELEASE")]
    pub force_dhcp_release: bool,
    #[arg(long, env = "NET_MANAGERD_SHARE_DHCP_ADDRESS")]
    pub share_dhcp_address: bool,
    #[arg(long, env = "NET_MANAGERD_UPDATE_DNS_ENTRIES")]
    pub update_dns_entries: bool,
    #[arg(long, env = "NET_MANAGERD_DHCP_DOMAIN", default_value = "novalocal")]
    pub dhcp_domain: String,

    #[arg(long, env = "NET_MANAGERD_SCHEDULER_MAX_ATTEMPTS", default_value_t = 3)]
    pub scheduler_max_attempts: u32,

    #[arg(long, env = "NET_MANAGERD_REAPER_INTERVAL", default_value = "60s")]
    pub reaper_interval: humantime::Duration,
}

impl Cli {
    pub fn into_config(self) -> Config {
        Config {
            network_driver: self.network_driver,
            flat_network_bridge: self.flat_network_bridge,
            flat_interface: self.flat_interface,
            flat_injected: self.flat_injected,
            flat_network_dns: self.flat_network_dns,
            vlan_start: self.vlan_start,
            vlan_interface: self.vlan_interface,
            num_networks: self.num_networks,
            vpn_ip: self.vpn_ip,
            vpn_start: self.vpn_start,
            cnt_vpn_clients: self.cnt_vpn_clients,
            network_size: self.network_size,
            floating_range: self.floating_range,
            default_floating_pool: self.default_floating_pool,
            fixed_range: self.fixed_range,
            fixed_range_v6: self.fixed_range_v6,
            gateway: self.gateway,
            gateway_v6: self.gateway_v6,
            multi_host: self.multi_host,
            fixed_ip_disassociate_timeout: self.fixed_ip_disassociate_timeout.into(),
            create_unique_mac_address_attempts: self.create_unique_mac_address_attempts,
            auto_assign_floating_ip: self.auto_assign_floating_ip,
            force_dhcp_release: self.force_dhcp_release,
            share_dhcp_address: self.share_dhcp_address,
            update_dns_entries: self.update_dns_entries,
            dhcp_domain: self.dhcp_domain,
            scheduler_max_attempts: self.scheduler_max_attempts,
        }
    }

    pub fn reaper_interval(&self) -> Duration {
        self.reaper_interval.into()
    }
}
