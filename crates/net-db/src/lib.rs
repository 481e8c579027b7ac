//! Postgres persistence for the network control plane: the `SafePgPool`
//! transaction wrapper, the Address Pool Engine, the create-time subnet
//! carve-out, and per-entity query modules.

pub mod address_pool;
pub mod dns_domain;
pub mod error;
pub mod fixed_ip;
pub mod floating_ip;
pub mod network;
pub mod safe_pg_pool;
pub mod subnet_allocator;
pub mod vif;

pub use error::{DatabaseError, DatabaseResult};
pub use safe_pg_pool::{SafePgPool, SafeTransaction, Transaction};
