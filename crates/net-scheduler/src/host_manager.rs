//! Stands in for nova's `HostManager`: the source of the per-pass
//! [`HostState`] snapshot (spec.md §4.6 step 3). Sourcing that snapshot
//! from a live fleet (capacity service, RPC fanout, …) is left to the
//! caller — a Non-goal of this core (spec.md §1) — so this trait is the
//! narrow seam a concrete deployment plugs into.

use async_trait::async_trait;
use net_core::model::HostState;

#[async_trait]
pub trait HostSource: Send + Sync {
    /// Snapshot every known host's resource state for one scheduling pass
    /// (spec.md §4.6 step 3: "`hosts = HostManager.get_all_host_states
    /// (elevated)`"). Built fresh per pass and discarded at pass end
    /// (spec.md §3 "HostState" lifecycle).
    async fn get_all_host_states(&self) -> Vec<HostState>;
}

/// A fixed in-memory host list, useful for tests and for deployments that
/// push host states in rather than pulling them from a live source.
pub struct StaticHostSource {
    hosts: Vec<HostState>,
}

impl StaticHostSource {
    pub fn new(hosts: Vec<HostState>) -> Self {
        Self { hosts }
    }
}

#[async_trait]
impl HostSource for StaticHostSource {
    async fn get_all_host_states(&self) -> Vec<HostState> {
        self.hosts.clone()
    }
}
