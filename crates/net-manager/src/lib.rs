//! The Network Manager core (spec.md §4.3): the per-host actor exposing
//! allocate/deallocate/associate/disassociate operations for instances and
//! floating IPs, the three Topology Variants (spec.md §4.4) expressed as
//! strategy objects, the Floating IP Engine (spec.md §4.5), and the
//! Periodic Reaper (spec.md §4.7).

pub mod floating_ip_engine;
pub mod manager;
pub mod reaper;
pub mod topology;
pub mod worker_pool;

pub use floating_ip_engine::{FloatingIpEngine, QuotaReservation};
pub use manager::{AllowAllPolicy, NetworkManager, PolicyChecker};
pub use reaper::Reaper;
pub use topology::{policy_for, ReservedSlots, TopologyPolicy};
