//! The Network Ownership Router (spec.md §4.2): decides, for any operation
//! mutating a network-bound resource, which host is authoritative and
//! whether this process can execute the mutation locally.

use async_trait::async_trait;

use crate::errors::RpcError;

/// Whether a network is owned per-network (by `network.host`) or sharded
/// per-instance (by the instance's own host), mirroring
/// `net_core::model::Network::multi_host`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipMode {
    SingleHost,
    MultiHost,
}

/// Reports whether a host's service-group heartbeat is stale, so a forward
/// can degrade to a local teardown instead of failing outright
/// (spec.md §4.2).
#[async_trait]
pub trait HeartbeatOracle: Send + Sync {
    async fn is_stale(&self, host: &str) -> bool;
}

/// The outcome of routing one mutation: execute it here, forward it, or —
/// only for teardown-shaped calls against a host with a stale heartbeat —
/// apply the database mutation locally without invoking the driver
/// (spec.md §4.2: "recorded with `teardown=false` semantics").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Local,
    Forward { host: String },
    DegradedLocalTeardown,
}

#[derive(Clone)]
pub struct OwnershipRouter {
    local_host: String,
}

impl OwnershipRouter {
    pub fn new(local_host: impl Into<String>) -> Self {
        Self {
            local_host: local_host.into(),
        }
    }

    pub fn local_host(&self) -> &str {
        &self.local_host
    }

    /// The authoritative host for a resource: `instance_host` under
    /// multi-host sharding, `network_host` otherwise (spec.md §4.2).
    pub fn authoritative_host<'a>(
        &self,
        mode: OwnershipMode,
        network_host: Option<&'a str>,
        instance_host: Option<&'a str>,
    ) -> Option<&'a str> {
        match mode {
            OwnershipMode::MultiHost => instance_host,
            OwnershipMode::SingleHost => network_host,
        }
    }

    /// Route a non-teardown mutation. Allocation to an unreachable host is
    /// a hard failure (spec.md §4.2: "Allocation to an unreachable host
    /// fails."), so this never degrades.
    pub fn route_allocate(&self, authoritative_host: Option<&str>) -> Result<Dispatch, RpcError> {
        match authoritative_host {
            None => Ok(Dispatch::Local),
            Some(host) if host == self.local_host => Ok(Dispatch::Local),
            Some(host) => Ok(Dispatch::Forward {
                host: host.to_string(),
            }),
        }
    }

    /// Route a teardown-shaped mutation (deallocate, disassociate). If the
    /// target host's heartbeat is stale, degrade to a local DB-only
    /// mutation rather than fail.
    pub async fn route_teardown(
        &self,
        authoritative_host: Option<&str>,
        heartbeat: &dyn HeartbeatOracle,
    ) -> Dispatch {
        match authoritative_host {
            None => Dispatch::Local,
            Some(host) if host == self.local_host => Dispatch::Local,
            Some(host) => {
                if heartbeat.is_stale(host).await {
                    Dispatch::DegradedLocalTeardown
                } else {
                    Dispatch::Forward {
                        host: host.to_string(),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysStale;

    #[async_trait]
    impl HeartbeatOracle for AlwaysStale {
        async fn is_stale(&self, _host: &str) -> bool {
            true
        }
    }

    struct NeverStale;

    #[async_trait]
    impl HeartbeatOracle for NeverStale {
        async fn is_stale(&self, _host: &str) -> bool {
            false
        }
    }

    #[test]
    fn single_host_network_routes_by_network_host() {
        let router = OwnershipRouter::new("host-a");
        let host = router.authoritative_host(OwnershipMode::SingleHost, Some("host-b"), Some("host-c"));
        assert_eq!(host, Some("host-b"));
    }

    #[test]
    fn multi_host_network_routes_by_instance_host() {
        let router = OwnershipRouter::new("host-a");
        let host = router.authoritative_host(OwnershipMode::MultiHost, Some("host-b"), Some("host-c"));
        assert_eq!(host, Some("host-c"));
    }

    #[test]
    fn allocate_to_local_host_executes_locally() {
        let router = OwnershipRouter::new("host-a");
        assert_eq!(router.route_allocate(Some("host-a")).unwrap(), Dispatch::Local);
    }

    #[test]
    fn allocate_to_remote_host_forwards() {
        let router = OwnershipRouter::new("host-a");
        assert_eq!(
            router.route_allocate(Some("host-b")).unwrap(),
            Dispatch::Forward {
                host: "host-b".to_string()
            }
        );
    }

    #[tokio::test]
    async fn teardown_against_stale_host_degrades_to_local() {
        let router = OwnershipRouter::new("host-a");
        let dispatch = router.route_teardown(Some("host-b"), &AlwaysStale).await;
        assert_eq!(dispatch, Dispatch::DegradedLocalTeardown);
    }

    #[tokio::test]
    async fn teardown_against_healthy_host_forwards() {
        let router = OwnershipRouter::new("host-a");
        let dispatch = router.route_teardown(Some("host-b"), &NeverStale).await;
        assert_eq!(
            dispatch,
            Dispatch::Forward {
                host: "host-b".to_string()
            }
        );
    }
}
