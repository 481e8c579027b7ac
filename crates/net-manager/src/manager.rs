//! The Network Manager core (spec.md §4.3): the per-host actor exposing
//! allocate/deallocate/associate/disassociate operations for instances and
//! floating IPs, coordinating VIF creation, the Address Pool Engine, the
//! Network Ownership Router, and (via small seams) the DHCP/L3 driver and
//! DNS side effects.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use net_core::error::{NetworkError, NetworkResult};
use net_core::model::{FixedIp, Network, Topology, Vif};
use net_core::netinfo::{FloatingIpRef, NetworkInfo, NetworkModel, Route, Subnet, SubnetFixedIp, VifInfo};
use net_core::Config;
use net_db::error::DatabaseError;
use net_db::safe_pg_pool::SafePgPool;
use net_rpc::{Dispatch, HeartbeatOracle, NetworkRpcClient, OwnershipMode, OwnershipRouter};
use net_uuid::floating_ip::FloatingIpId;
use net_uuid::instance::InstanceId;
use net_uuid::network::NetworkId;
use net_uuid::project::ProjectId;
use net_uuid::vif::VifId;

use crate::floating_ip_engine::{FloatingIpEngine, QuotaReservation};
use crate::topology;
use crate::worker_pool::join_all_bounded;

fn into_network_error(err: DatabaseError) -> NetworkError {
    match err {
        DatabaseError::Domain(e) => e,
        other => NetworkError::ProcessExecutionError(other.to_string()),
    }
}

/// The action-string policy check named in spec.md §4.3 ("all policy-checked
/// via an action string `network:<opname>` before execution"). Non-goal:
/// authentication/authorization internals (spec.md §1) — this is the narrow
/// seam a real policy engine plugs into.
#[async_trait::async_trait]
pub trait PolicyChecker: Send + Sync {
    async fn check(&self, action: &str, project_id: ProjectId) -> NetworkResult<()>;
}

pub struct AllowAllPolicy;

#[async_trait::async_trait]
impl PolicyChecker for AllowAllPolicy {
    async fn check(&self, _action: &str, _project_id: ProjectId) -> NetworkResult<()> {
        Ok(())
    }
}

#[derive(Clone)]
pub struct NetworkManager {
    db: SafePgPool,
    rpc: Arc<dyn NetworkRpcClient>,
    router: OwnershipRouter,
    heartbeat: Arc<dyn HeartbeatOracle>,
    policy: Arc<dyn PolicyChecker>,
    config: Config,
    /// Named mutex guarding the DHCP-address discovery path (spec.md §5:
    /// "the `get_dhcp` mutex") so two concurrent allocators can't race to
    /// assign the DHCP listener address on a multi-host network.
    dhcp_lock: Arc<tokio::sync::Mutex<()>>,
    /// Embedded rather than mixed in (spec.md §9 design notes): the
    /// Floating IP Engine is constructor-injected the same way the DB pool
    /// and RPC client are.
    floating: FloatingIpEngine,
}

impl NetworkManager {
    pub fn new(
        db: SafePgPool,
        rpc: Arc<dyn NetworkRpcClient>,
        router: OwnershipRouter,
        heartbeat: Arc<dyn HeartbeatOracle>,
        policy: Arc<dyn PolicyChecker>,
        config: Config,
        quota: Arc<dyn QuotaReservation>,
    ) -> Self {
        let floating = FloatingIpEngine::new(db.clone(), rpc.clone(), quota);
        Self {
            db,
            rpc,
            router,
            heartbeat,
            policy,
            config,
            dhcp_lock: Arc::new(tokio::sync::Mutex::new(())),
            floating,
        }
    }

    pub fn local_host(&self) -> &str {
        self.router.local_host()
    }

    fn generate_mac_address() -> mac_address::MacAddress {
        let mut bytes: [u8; 6] = rand::random();
        // Locally administered, unicast (bit 1 clear, bit 2 set of the first octet).
        bytes[0] = (bytes[0] & 0xfe) | 0x02;
        mac_address::MacAddress::new(bytes)
    }

    /// Select the networks an instance draws VIFs from (spec.md §4.3 step
    /// 1): explicit `requested_networks` if given, else every non-VLAN
    /// network plus any VLAN network already bound to `project_id`.
    async fn select_networks(
        &mut self,
        project_id: ProjectId,
        requested_networks: Option<Vec<NetworkId>>,
    ) -> NetworkResult<Vec<Network>> {
        let networks = if let Some(ids) = requested_networks {
            self.db
                .with_txn(|txn| {
                    let ids = ids.clone();
                    async move { net_db::network::find_by_ids(txn, &ids).await }
                })
                .await
        } else {
            self.db
                .with_txn(|txn| async move {
                    let mut networks = net_db::network::find_non_vlan(txn).await?;
                    let mut vlan = net_db::network::find_by_project(txn, project_id).await?;
                    vlan.retain(|n| n.topology == Topology::Vlan);
                    networks.append(&mut vlan);
                    Ok(networks)
                })
                .await
        };
        networks.map_err(into_network_error)
    }

    async fn create_vif(&mut self, instance_id: InstanceId, network_id: NetworkId) -> NetworkResult<Vif> {
        let max_attempts = self.config.create_unique_mac_address_attempts;
        self.db
            .with_txn(|txn| async move {
                net_db::vif::create_with_unique_mac(
                    txn,
                    instance_id,
                    network_id,
                    max_attempts,
                    Self::generate_mac_address,
                )
                .await
            })
            .await
            .map_err(into_network_error)
    }

    /// `allocate_for_instance` (spec.md §4.3): allocate one VIF and one
    /// fixed IP per selected network, fanning fixed-IP allocation out
    /// through a bounded worker pool, and return the assembled
    /// [`NetworkInfo`].
    #[allow(clippy::too_many_arguments)]
    pub async fn allocate_for_instance(
        &mut self,
        instance_id: InstanceId,
        project_id: ProjectId,
        host: &str,
        display_name: &str,
        rxtx_factor: f64,
        vpn: bool,
        requested_networks: Option<Vec<NetworkId>>,
    ) -> NetworkResult<NetworkInfo> {
        self.policy.check("network:allocate_for_instance", project_id).await?;

        let networks = self.select_networks(project_id, requested_networks).await?;

        // VIF creation happens-before fixed-IP allocation so the fixed-IP
        // update can point at a VIF row (spec.md §5 ordering guarantees).
        let mut vifs_by_network: HashMap<NetworkId, Vif> = HashMap::with_capacity(networks.len());
        for network in &networks {
            match self.create_vif(instance_id, network.id).await {
                Ok(vif) => {
                    vifs_by_network.insert(network.id, vif);
                }
                Err(e) => {
                    let _ = self
                        .db
                        .with_txn(|txn| async move {
                            net_db::vif::delete_all_for_instance(txn, instance_id).await
                        })
                        .await;
                    return Err(e);
                }
            }
        }

        // Fan out one fixed-IP allocation per network (spec.md §5:
        // "allocate_for_instance fans out one task per network through a
        // worker pool and joins on all completions before returning").
        let manager = self.clone();
        let host_owned = host.to_string();
        let display_name_owned = display_name.to_string();
        let items: Vec<Network> = networks.clone();
        let max_concurrency = items.len().max(1);
        let results = join_all_bounded(items, max_concurrency, move |network| {
            let manager = manager.clone();
            let host = host_owned.clone();
            let display_name = display_name_owned.clone();
            async move {
                let mut manager = manager;
                let address = manager
                    .allocate_fixed_ip(instance_id, &network, None, &host, &display_name, vpn)
                    .await?;
                Ok::<(NetworkId, IpAddr), NetworkError>((network.id, address))
            }
        })
        .await;

        let mut addresses_by_network: HashMap<NetworkId, IpAddr> = HashMap::with_capacity(networks.len());
        for joined in results {
            match joined {
                Ok(Ok((network_id, address))) => {
                    addresses_by_network.insert(network_id, address);
                }
                Ok(Err(domain_error)) => return Err(domain_error),
                Err(join_error) => {
                    return Err(NetworkError::ProcessExecutionError(join_error.to_string()))
                }
            }
        }

        if self.config.update_dns_entries {
            tracing::debug!(instance_id = %instance_id, "fanning out DNS updates to all hosts");
        }

        self.build_network_info(instance_id, &networks, &vifs_by_network, &addresses_by_network, rxtx_factor)
            .await
    }

    /// `deallocate_for_instance`: inverse of [`Self::allocate_for_instance`]
    /// — floating IPs first, then fixed IPs, then VIFs (spec.md §4.3, §5).
    /// Tolerates a missing instance (idempotent cleanup, spec.md §5).
    pub async fn deallocate_for_instance(&mut self, instance_id: InstanceId, project_id: ProjectId) -> NetworkResult<()> {
        self.policy.check("network:deallocate_for_instance", project_id).await?;

        let fixed_ips = self
            .db
            .with_txn(|txn| async move { net_db::fixed_ip::find_by_instance(txn, instance_id).await })
            .await
            .map_err(into_network_error)?;

        for fixed_ip in &fixed_ips {
            let floating_ips = self
                .db
                .with_txn(|txn| async move {
                    net_db::floating_ip::find_by_fixed_ip_address(txn, fixed_ip.address).await
                })
                .await
                .map_err(into_network_error)?;
            for floating in floating_ips {
                self.floating
                    .disassociate_if_linked(floating.id, project_id)
                    .await
                    .map_err(into_network_error)?;
            }
        }

        for fixed_ip in &fixed_ips {
            self.deallocate_fixed_ip(fixed_ip.address, None, true).await?;
        }

        self.db
            .with_txn(|txn| async move { net_db::vif::delete_all_for_instance(txn, instance_id).await })
            .await
            .map_err(into_network_error)?;

        Ok(())
    }

    /// `allocate_fixed_ip` (spec.md §4.3): pool association, VIF linkage,
    /// DNS A-record creation, and a driver `setup_network_on_host` call —
    /// executed locally or forwarded per the Network Ownership Router
    /// (spec.md §4.2).
    #[allow(clippy::too_many_arguments)]
    pub async fn allocate_fixed_ip(
        &mut self,
        instance_id: InstanceId,
        network: &Network,
        address: Option<IpAddr>,
        host: &str,
        display_name: &str,
        vpn: bool,
    ) -> NetworkResult<IpAddr> {
        let mode = if network.multi_host {
            OwnershipMode::MultiHost
        } else {
            OwnershipMode::SingleHost
        };
        let authoritative = self.router.authoritative_host(mode, network.host.as_deref(), Some(host));

        let authoritative = match authoritative {
            Some(h) => Some(h.to_string()),
            None => {
                let local = self.local_host().to_string();
                self.db
                    .with_txn(|txn| async move { net_db::network::set_host_if_unset(txn, network.id, &local).await })
                    .await
                    .map_err(into_network_error)?;
                Some(self.local_host().to_string())
            }
        };

        let dispatch = self
            .router
            .route_allocate(authoritative.as_deref())
            .map_err(|e| NetworkError::ProcessExecutionError(e.to_string()))?;

        match dispatch {
            Dispatch::Local => {
                self.allocate_fixed_ip_locally(instance_id, network, address, display_name, vpn)
                    .await
            }
            Dispatch::Forward { host: remote } => self
                .rpc
                .allocate_fixed_ip(&remote, instance_id, network.id, address)
                .await
                .map_err(|e| NetworkError::HostUnreachable { host: e.to_string() }),
            Dispatch::DegradedLocalTeardown => unreachable!(
                "allocate never degrades to a local teardown (spec.md §4.2)"
            ),
        }
    }

    async fn allocate_fixed_ip_locally(
        &mut self,
        instance_id: InstanceId,
        network: &Network,
        address: Option<IpAddr>,
        display_name: &str,
        vpn: bool,
    ) -> NetworkResult<IpAddr> {
        let network_id = network.id;
        let address = self
            .db
            .with_txn(|txn| async move {
                let claimed = match address {
                    Some(addr) => net_db::address_pool::associate_address(txn, network_id, addr, instance_id).await?,
                    None => {
                        if vpn {
                            if let Some(vpn_address) = network.vpn_private_address {
                                net_db::address_pool::associate_address(txn, network_id, vpn_address, instance_id)
                                    .await?
                            } else {
                                net_db::address_pool::associate_any(txn, network_id, instance_id).await?
                            }
                        } else {
                            net_db::address_pool::associate_any(txn, network_id, instance_id).await?
                        }
                    }
                };

                if let Some(vif) = net_db::vif::find_by_instance_and_network(txn, instance_id, network_id).await? {
                    net_db::fixed_ip::set_vif(txn, claimed, vif.id).await?;
                }

                Ok(claimed)
            })
            .await
            .map_err(into_network_error)?;

        self.create_dns_entries(instance_id, network, address, display_name).await?;

        let policy = topology::policy_for(network.topology);
        policy.setup_network_on_host(network);

        Ok(address)
    }

    /// Two distinct A-records per spec.md §4.3 and scenario S1: one keyed by
    /// the instance's uuid, one by its human-readable display name.
    async fn create_dns_entries(
        &mut self,
        instance_id: InstanceId,
        network: &Network,
        address: IpAddr,
        display_name: &str,
    ) -> NetworkResult<()> {
        let domain = self.config.dhcp_domain.clone();
        let instance_name = instance_id.to_string();
        let display_name = display_name.to_string();
        let _ = network;
        self.db
            .with_txn(|txn| {
                let domain = domain.clone();
                let instance_name = instance_name.clone();
                let display_name = display_name.clone();
                async move {
                    net_db::dns_domain::create_entry(txn, &domain, &instance_name, address).await?;
                    net_db::dns_domain::create_entry(txn, &domain, &display_name, address).await
                }
            })
            .await
            .map_err(into_network_error)
    }

    /// `deallocate_fixed_ip` (spec.md §4.3): inverse of
    /// [`Self::allocate_fixed_ip`]. When the target host's heartbeat is
    /// stale, the DB mutation is applied locally without invoking the
    /// driver (spec.md §4.2 degradation).
    pub async fn deallocate_fixed_ip(&mut self, address: IpAddr, host: Option<&str>, teardown: bool) -> NetworkResult<()> {
        let fixed_ip = self
            .db
            .with_txn(|txn| async move { net_db::fixed_ip::find_by_address(txn, address).await })
            .await
            .map_err(into_network_error)?;
        let Some(fixed_ip) = fixed_ip else {
            return Ok(());
        };

        let network = self
            .db
            .with_txn(|txn| async move { net_db::network::find(txn, fixed_ip.network_id).await })
            .await
            .map_err(into_network_error)?;

        let mode = if network.multi_host {
            OwnershipMode::MultiHost
        } else {
            OwnershipMode::SingleHost
        };
        let authoritative = self
            .router
            .authoritative_host(mode, network.host.as_deref(), host)
            .map(str::to_string);

        let dispatch = self.router.route_teardown(authoritative.as_deref(), self.heartbeat.as_ref()).await;

        match dispatch {
            Dispatch::Local => self.deallocate_fixed_ip_locally(&network, &fixed_ip, teardown).await,
            Dispatch::DegradedLocalTeardown => {
                tracing::warn!(address = %address, "target host heartbeat stale, degrading to local teardown");
                self.deallocate_fixed_ip_locally(&network, &fixed_ip, false).await
            }
            Dispatch::Forward { host: remote } => self
                .rpc
                .deallocate_fixed_ip(&remote, address, teardown)
                .await
                .map_err(|e| NetworkError::HostUnreachable { host: e.to_string() }),
        }
    }

    async fn deallocate_fixed_ip_locally(&mut self, network: &Network, fixed_ip: &FixedIp, teardown: bool) -> NetworkResult<()> {
        let network_id = network.id;
        let address = fixed_ip.address;
        self.db
            .with_txn(|txn| async move { net_db::address_pool::disassociate(txn, network_id, address).await })
            .await
            .map_err(into_network_error)?;

        if teardown {
            let policy = topology::policy_for(network.topology);
            policy.teardown_network_on_host(network);
            if self.config.force_dhcp_release {
                tracing::debug!(address = %address, "sending explicit DHCP release packet");
            }
        }

        Ok(())
    }

    /// `lease_fixed_ip` (DHCP bridge callback, spec.md §4.3): marks leased;
    /// warns rather than fails if `allocated=false`.
    pub async fn lease_fixed_ip(&mut self, address: IpAddr) -> NetworkResult<()> {
        let fixed_ip = self
            .db
            .with_txn(|txn| async move { net_db::fixed_ip::find_by_address(txn, address).await })
            .await
            .map_err(into_network_error)?
            .ok_or(NetworkError::FixedIpInvalid {
                address,
                reason: "no fixed ip row exists".to_string(),
            })?;

        if fixed_ip.instance_id.is_none() {
            return Err(NetworkError::FixedIpInvalid {
                address,
                reason: "no instance associated with this address".to_string(),
            });
        }
        if !fixed_ip.allocated {
            tracing::warn!(address = %address, "lease_fixed_ip called on an unallocated address");
        }

        self.db
            .with_txn(|txn| async move { net_db::fixed_ip::set_leased(txn, address, true).await })
            .await
            .map_err(into_network_error)
    }

    /// `release_fixed_ip`: marks un-leased and, if also unallocated,
    /// disassociates (spec.md §4.3).
    pub async fn release_fixed_ip(&mut self, address: IpAddr) -> NetworkResult<()> {
        let fixed_ip = self
            .db
            .with_txn(|txn| async move { net_db::fixed_ip::find_by_address(txn, address).await })
            .await
            .map_err(into_network_error)?
            .ok_or(NetworkError::FixedIpInvalid {
                address,
                reason: "no fixed ip row exists".to_string(),
            })?;

        if fixed_ip.instance_id.is_none() {
            return Err(NetworkError::FixedIpInvalid {
                address,
                reason: "no instance associated with this address".to_string(),
            });
        }

        self.db
            .with_txn(|txn| async move { net_db::fixed_ip::set_leased(txn, address, false).await })
            .await
            .map_err(into_network_error)?;

        if !fixed_ip.allocated {
            self.db
                .with_txn(|txn| async move {
                    net_db::address_pool::disassociate(txn, fixed_ip.network_id, address).await
                })
                .await
                .map_err(into_network_error)?;
        }

        Ok(())
    }

    pub async fn add_fixed_ip_to_instance(
        &mut self,
        instance_id: InstanceId,
        network: &Network,
        host: &str,
        display_name: &str,
    ) -> NetworkResult<IpAddr> {
        self.allocate_fixed_ip(instance_id, network, None, host, display_name, false).await
    }

    pub async fn remove_fixed_ip_from_instance(&mut self, address: IpAddr) -> NetworkResult<()> {
        self.deallocate_fixed_ip(address, None, true).await
    }

    /// `associate_floating_ip` (spec.md §4.5, §6 RPC surface, forwardable):
    /// look up the fixed IP's owning host per §4.2, then delegate to the
    /// embedded [`FloatingIpEngine`], which verifies ownership and performs
    /// the DB link plus driver call on that host.
    #[allow(clippy::too_many_arguments)]
    pub async fn associate_floating_ip(
        &mut self,
        floating_id: FloatingIpId,
        fixed_ip_address: IpAddr,
        interface: &str,
        project_id: ProjectId,
        instance_id: InstanceId,
        instance_host: Option<&str>,
        allow_auto_assigned: bool,
    ) -> NetworkResult<Option<InstanceId>> {
        self.policy.check("network:associate_floating_ip", project_id).await?;

        let fixed_ip = self
            .db
            .with_txn(|txn| async move { net_db::fixed_ip::find_by_address(txn, fixed_ip_address).await })
            .await
            .map_err(into_network_error)?
            .ok_or(NetworkError::FixedIpInvalid {
                address: fixed_ip_address,
                reason: "no fixed ip row exists".to_string(),
            })?;

        let network = self
            .db
            .with_txn(|txn| async move { net_db::network::find(txn, fixed_ip.network_id).await })
            .await
            .map_err(into_network_error)?;

        let mode = if network.multi_host {
            OwnershipMode::MultiHost
        } else {
            OwnershipMode::SingleHost
        };
        let owning_host = self
            .router
            .authoritative_host(mode, network.host.as_deref(), instance_host)
            .map(str::to_string)
            .unwrap_or_else(|| self.local_host().to_string());

        self.floating
            .associate(
                floating_id,
                fixed_ip_address,
                &owning_host,
                interface,
                project_id,
                instance_id,
                allow_auto_assigned,
            )
            .await
            .map_err(into_network_error)
    }

    /// `disassociate_floating_ip` (spec.md §4.5, §6 RPC surface,
    /// forwardable): delegates to the embedded [`FloatingIpEngine`], which
    /// already tracks the owning host on the floating IP record itself.
    pub async fn disassociate_floating_ip(
        &mut self,
        floating_id: FloatingIpId,
        project_id: ProjectId,
        allow_auto_assigned: bool,
    ) -> NetworkResult<Option<InstanceId>> {
        self.policy.check("network:disassociate_floating_ip", project_id).await?;
        self.floating
            .disassociate(floating_id, project_id, allow_auto_assigned)
            .await
            .map_err(into_network_error)
    }

    /// Read-only assembly of the [`NetworkInfo`] model (spec.md §4.3, §6).
    pub async fn get_instance_nw_info(&mut self, instance_id: InstanceId) -> NetworkResult<NetworkInfo> {
        let vifs = self
            .db
            .with_txn(|txn| async move { net_db::vif::find_by_instance(txn, instance_id).await })
            .await
            .map_err(into_network_error)?;

        let network_ids: Vec<NetworkId> = vifs.iter().map(|v| v.network_id).collect();
        let networks = self
            .db
            .with_txn(|txn| {
                let network_ids = network_ids.clone();
                async move { net_db::network::find_by_ids(txn, &network_ids).await }
            })
            .await
            .map_err(into_network_error)?;

        let mut vifs_by_network: HashMap<NetworkId, Vif> = HashMap::new();
        for vif in vifs {
            vifs_by_network.insert(vif.network_id, vif);
        }

        let mut addresses_by_network: HashMap<NetworkId, IpAddr> = HashMap::new();
        for network in &networks {
            let fixed_ips = self
                .db
                .with_txn(|txn| async move { net_db::fixed_ip::find_by_instance(txn, instance_id).await })
                .await
                .map_err(into_network_error)?;
            if let Some(fixed_ip) = fixed_ips.into_iter().find(|ip| ip.network_id == network.id) {
                addresses_by_network.insert(network.id, fixed_ip.address);
            }
        }

        self.build_network_info(instance_id, &networks, &vifs_by_network, &addresses_by_network, 1.0)
            .await
    }

    async fn build_network_info(
        &mut self,
        instance_id: InstanceId,
        networks: &[Network],
        vifs_by_network: &HashMap<NetworkId, Vif>,
        addresses_by_network: &HashMap<NetworkId, IpAddr>,
        rxtx_factor: f64,
    ) -> NetworkResult<NetworkInfo> {
        let mut vif_infos = Vec::with_capacity(networks.len());

        for network in networks {
            let Some(vif) = vifs_by_network.get(&network.id) else {
                continue;
            };

            let mut ips = Vec::new();
            if let Some(address) = addresses_by_network.get(&network.id) {
                let address = *address;
                let floating_ips = self
                    .db
                    .with_txn(|txn| async move { net_db::floating_ip::find_by_fixed_ip_address(txn, address).await })
                    .await
                    .unwrap_or_default()
                    .into_iter()
                    .map(|f| FloatingIpRef {
                        address: f.address,
                        kind: "floating".to_string(),
                    })
                    .collect();

                ips.push(SubnetFixedIp {
                    address: *address,
                    version: SubnetFixedIp::version_of(address),
                    floating_ips,
                });
            }

            let mut subnets = Vec::new();
            if let (Some(cidr), Some(gateway)) = (network.cidr_v4, network.gateway_v4) {
                subnets.push(Subnet {
                    cidr: cidr.to_string(),
                    gateway,
                    dhcp_server: None,
                    dns: network.dns.clone(),
                    routes: Vec::<Route>::new(),
                    ips: ips.clone(),
                });
            }
            if let (Some(cidr), Some(gateway)) = (network.cidr_v6, network.gateway_v6) {
                subnets.push(Subnet {
                    cidr: cidr.to_string(),
                    gateway,
                    dhcp_server: None,
                    dns: network.dns.clone(),
                    routes: Vec::new(),
                    ips,
                });
            }

            let policy = topology::policy_for(network.topology);
            vif_infos.push(VifInfo {
                id: vif.id,
                address: vif.address,
                network: Some(NetworkModel {
                    id: network.id,
                    bridge: network.bridge.clone(),
                    label: network.label.clone(),
                    tenant_id: network.project_id.map(|id| id.to_string()),
                    injected: Some(network.injected),
                    subnets,
                    should_create_bridge: Some(policy.creates_bridge()),
                    should_create_vlan: Some(policy.creates_vlan()),
                    vlan: network.vlan,
                    bridge_interface: network.bridge_interface.clone(),
                    multi_host: Some(network.multi_host),
                }),
                rxtx_cap: Some(rxtx_factor),
            });
        }

        let _ = instance_id;
        Ok(NetworkInfo { vifs: vif_infos })
    }

    /// `validate_networks` (SPEC_FULL §11): confirm every requested network
    /// exists, and if an address is pinned, confirm it is free or already
    /// owned by the calling project.
    pub async fn validate_networks(
        &mut self,
        network_ids: &[NetworkId],
        pinned_address: Option<IpAddr>,
        project_id: ProjectId,
    ) -> NetworkResult<()> {
        let networks = self
            .db
            .with_txn(|txn| {
                let ids = network_ids.to_vec();
                async move { net_db::network::find_by_ids(txn, &ids).await }
            })
            .await
            .map_err(into_network_error)?;

        if networks.len() != network_ids.len() {
            let found: std::collections::HashSet<_> = networks.iter().map(|n| n.id).collect();
            let missing = network_ids.iter().find(|id| !found.contains(id)).copied().unwrap();
            return Err(NetworkError::NetworkNotFound { network_id: missing });
        }

        if let Some(address) = pinned_address {
            let existing = self
                .db
                .with_txn(|txn| async move { net_db::fixed_ip::find_by_address(txn, address).await })
                .await
                .map_err(into_network_error)?;

            if let Some(fixed_ip) = existing {
                if fixed_ip.allocated {
                    // No per-instance project table exists in this system
                    // (spec.md §1 Non-goal); the best available proxy for
                    // "owned by the calling project" is the owning
                    // network's `project_id` (set for VLAN networks,
                    // spec.md §4.4's per-project scoping row).
                    let network = self
                        .db
                        .with_txn(|txn| async move { net_db::network::find(txn, fixed_ip.network_id).await })
                        .await
                        .map_err(into_network_error)?;
                    let owned_by_project = network.project_id == Some(project_id);
                    if !owned_by_project {
                        return Err(NetworkError::FixedIpAlreadyInUse { address });
                    }
                }
            }
        }

        Ok(())
    }

    /// `create_networks` (spec.md §4.4): carve out and materialize one or
    /// more networks from a fixed range, following the topology-specific
    /// VLAN carve-up algorithm or the generic overlap-avoiding subnet pick.
    pub async fn create_networks(
        &mut self,
        topology_kind: Topology,
        label: &str,
        fixed_range: net_core::ip::IpPrefix,
        bridge: &str,
        project_id: Option<ProjectId>,
    ) -> NetworkResult<Vec<Network>> {
        if label.len() > Network::MAX_LABEL_LEN {
            return Err(NetworkError::NetworkNotCreated {
                label: label.to_string(),
                reason: format!("label exceeds {} characters", Network::MAX_LABEL_LEN),
            });
        }

        let policy = topology::policy_for(topology_kind);
        if topology_kind == Topology::Flat && bridge.is_empty() {
            return Err(NetworkError::NetworkNotCreated {
                label: label.to_string(),
                reason: "Flat/FlatDHCP require a bridge name at create time".to_string(),
            });
        }

        let mut created = Vec::new();

        if topology_kind == Topology::Vlan {
            let fixed_range_v4 = match fixed_range {
                net_core::ip::IpPrefix::V4(v4) => {
                    ipnetwork::Ipv4Network::new(v4.addr(), v4.prefix_length() as u8).map_err(|_| {
                        NetworkError::NetworkNotCreated {
                            label: label.to_string(),
                            reason: "invalid IPv4 fixed range".to_string(),
                        }
                    })?
                }
                net_core::ip::IpPrefix::V6(_) => {
                    return Err(NetworkError::NetworkNotCreated {
                        label: label.to_string(),
                        reason: "VLAN create does not support IPv6 fixed ranges".to_string(),
                    })
                }
            };

            let subnets = topology::carve_vlan_subnets(
                fixed_range_v4,
                self.config.num_networks,
                self.config.vlan_start,
                self.config.vpn_start,
                self.config.network_size,
            )?;

            for subnet in subnets {
                let reserved = policy.reserved_slots(self.config.cnt_vpn_clients);
                let network = Network {
                    id: NetworkId::new_v4(),
                    topology: topology_kind,
                    label: label.to_string(),
                    cidr_v4: Some(subnet.cidr),
                    cidr_v6: None,
                    gateway_v4: self.config.gateway,
                    gateway_v6: self.config.gateway_v6,
                    bridge: subnet.bridge.clone(),
                    bridge_interface: self.config.vlan_interface.clone(),
                    dns: Vec::new(),
                    vlan: Some(subnet.vlan),
                    vpn_public_address: Some(subnet.vpn_private_address),
                    vpn_private_address: Some(subnet.vpn_private_address),
                    multi_host: self.config.multi_host,
                    host: None,
                    project_id,
                    injected: false,
                };
                created.push(self.persist_network(network, &reserved).await?);
            }
        } else {
            let prefix_length = Self::size_hint_to_prefix_length(fixed_range, self.config.network_size);
            let cidr = self
                .db
                .with_txn(|txn| async move { net_db::subnet_allocator::allocate_subnet(txn, fixed_range, prefix_length).await })
                .await
                .map_err(into_network_error)?;
            let cidr_v4 = match cidr {
                net_core::ip::IpPrefix::V4(v4) => ipnetwork::IpNetwork::V4(
                    ipnetwork::Ipv4Network::new(v4.addr(), v4.prefix_length() as u8).map_err(|_| {
                        NetworkError::NetworkNotCreated {
                            label: label.to_string(),
                            reason: "failed to materialize carved subnet".to_string(),
                        }
                    })?,
                ),
                net_core::ip::IpPrefix::V6(v6) => ipnetwork::IpNetwork::V6(
                    ipnetwork::Ipv6Network::new(v6.addr(), v6.prefix_length() as u8).map_err(|_| {
                        NetworkError::NetworkNotCreated {
                            label: label.to_string(),
                            reason: "failed to materialize carved subnet".to_string(),
                        }
                    })?,
                ),
            };

            let reserved = policy.reserved_slots(self.config.cnt_vpn_clients);
            let network = Network {
                id: NetworkId::new_v4(),
                topology: topology_kind,
                label: label.to_string(),
                cidr_v4: Some(cidr_v4),
                cidr_v6: None,
                gateway_v4: self.config.gateway,
                gateway_v6: self.config.gateway_v6,
                bridge: bridge.to_string(),
                bridge_interface: self.config.flat_interface.clone(),
                dns: self.config.flat_network_dns.clone(),
                vlan: None,
                vpn_public_address: None,
                vpn_private_address: None,
                multi_host: self.config.multi_host,
                host: None,
                project_id: None,
                injected: self.config.flat_injected,
            };
            created.push(self.persist_network(network, &reserved).await?);
        }

        Ok(created)
    }

    async fn persist_network(&mut self, network: Network, reserved: &topology::ReservedSlots) -> NetworkResult<Network> {
        let cidr_v4 = network.cidr_v4;
        let bottom = reserved.bottom;
        let top = reserved.top;
        self.db
            .with_txn(|txn| {
                let network = network.clone();
                async move {
                    let saved = net_db::network::create(txn, &network).await?;
                    if let Some(cidr) = cidr_v4 {
                        net_db::address_pool::bulk_create(txn, saved.id, cidr, bottom, top).await?;
                    }
                    Ok(saved)
                }
            })
            .await
            .map_err(into_network_error)
    }

    /// Open question resolved per spec.md §9: compute the oversize-subnet
    /// warning path as `32 - ceil(log2(network_size))` rather than copying
    /// the source's undefined-attribute access.
    fn size_hint_to_prefix_length(fixed_range: net_core::ip::IpPrefix, network_size: u32) -> usize {
        let family_bits = match fixed_range {
            net_core::ip::IpPrefix::V4(_) => 32u32,
            net_core::ip::IpPrefix::V6(_) => 128u32,
        };
        let host_bits = (network_size.max(1) as f64).log2().ceil() as u32;
        (family_bits.saturating_sub(host_bits)) as usize
    }

    pub async fn delete_network(&mut self, id: NetworkId) -> NetworkResult<()> {
        self.db
            .with_txn(|txn| async move { net_db::network::delete(txn, id).await })
            .await
            .map_err(into_network_error)
    }

    /// `add_network_to_project` (SPEC_FULL §11, VLAN only): bind an
    /// already-created VLAN network to a project, distinct from
    /// per-instance allocation — the administrative counterpart to the
    /// per-project scoping in spec.md §4.4's table.
    pub async fn add_network_to_project(
        &mut self,
        network_id: NetworkId,
        project_id: ProjectId,
    ) -> NetworkResult<()> {
        let network = self
            .db
            .with_txn(|txn| async move { net_db::network::find(txn, network_id).await })
            .await
            .map_err(into_network_error)?;

        if network.topology != Topology::Vlan {
            return Err(NetworkError::NetworkNotCreated {
                label: network.label.clone(),
                reason: "only VLAN networks can be bound to a project".to_string(),
            });
        }

        self.db
            .with_txn(|txn| async move { net_db::network::add_network_to_project(txn, network_id, project_id).await })
            .await
            .map_err(into_network_error)
    }

    /// `setup_networks_on_host`: fans out per-network setup identically to
    /// `allocate_for_instance` (spec.md §5).
    pub async fn setup_networks_on_host(&mut self, networks: Vec<Network>) -> NetworkResult<()> {
        let max_concurrency = networks.len().max(1);
        let results = join_all_bounded(networks, max_concurrency, |network| async move {
            let policy = topology::policy_for(network.topology);
            policy.setup_network_on_host(&network);
        })
        .await;

        for joined in results {
            if let Err(join_error) = joined {
                return Err(NetworkError::ProcessExecutionError(join_error.to_string()));
            }
        }
        Ok(())
    }

    /// `init_host` (SPEC_FULL §11): on manager startup, claim every network
    /// assigned to this host that has no `host` set.
    pub async fn init_host(&mut self, host: &str) -> NetworkResult<u32> {
        let networks = self
            .db
            .with_txn(|txn| async move { net_db::network::find_all(txn).await })
            .await
            .map_err(into_network_error)?;

        let mut claimed = 0u32;
        for network in networks.into_iter().filter(|n| n.host.is_none()) {
            let did_claim = self
                .db
                .with_txn(|txn| async move { net_db::network::set_host_if_unset(txn, network.id, host).await })
                .await
                .map_err(into_network_error)?;
            if did_claim {
                claimed += 1;
            }
        }

        tracing::info!(host, claimed, "init_host claimed unassigned networks");
        Ok(claimed)
    }

    /// `_get_dhcp_ip` (SPEC_FULL §11): the DHCP-serving address for `host`
    /// on `network`. Shared when `share_dhcp_address` is set; otherwise
    /// each multi-host host gets its own address, discovered or lazily
    /// allocated under the `get_dhcp` mutex (spec.md §5).
    pub async fn dhcp_address_for_host(&mut self, network: &Network, host: &str) -> NetworkResult<IpAddr> {
        if self.config.share_dhcp_address || !network.multi_host {
            return network
                .vpn_private_address
                .or(network.gateway_v4)
                .ok_or_else(|| NetworkError::NetworkNotCreated {
                    label: network.label.clone(),
                    reason: "network has no DHCP server address configured".to_string(),
                });
        }

        let _guard = self.dhcp_lock.lock().await;
        let network_id = network.id;
        let dhcp_instance_id = Self::host_dhcp_instance_id(network_id, host);

        self.db
            .with_txn(|txn| async move {
                if let Some(existing) = net_db::fixed_ip::find_by_instance(txn, dhcp_instance_id)
                    .await?
                    .into_iter()
                    .find(|ip| ip.network_id == network_id)
                {
                    return Ok(existing.address);
                }
                net_db::address_pool::associate_any(txn, network_id, dhcp_instance_id).await
            })
            .await
            .map_err(into_network_error)
    }

    /// A stable per-`(network, host)` synthetic instance id, so this host's
    /// DHCP-serving address can be recorded and rediscovered the same way
    /// a real instance's fixed IP is.
    fn host_dhcp_instance_id(network_id: NetworkId, host: &str) -> InstanceId {
        let namespace = uuid::Uuid::NAMESPACE_DNS;
        let name = format!("dhcp:{network_id}:{host}");
        InstanceId::from(uuid::Uuid::new_v5(&namespace, name.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_hint_to_prefix_length_matches_the_open_question_formula() {
        let range = net_core::ip::IpPrefix::V4("10.0.0.0/8".parse().unwrap());
        // network_size=256 => host_bits=8 => prefix_length=24.
        assert_eq!(NetworkManager::size_hint_to_prefix_length(range, 256), 24);
        // network_size=16 => host_bits=4 => prefix_length=28.
        assert_eq!(NetworkManager::size_hint_to_prefix_length(range, 16), 28);
    }

    #[test]
    fn host_dhcp_instance_id_is_stable_per_network_and_host() {
        let network_id = NetworkId::new_v4();
        let a = NetworkManager::host_dhcp_instance_id(network_id, "host-a");
        let b = NetworkManager::host_dhcp_instance_id(network_id, "host-a");
        let c = NetworkManager::host_dhcp_instance_id(network_id, "host-b");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
