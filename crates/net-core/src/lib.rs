//! Data model and addressing primitives shared by every layer of the
//! network control plane: the entity types, the `NetworkInfo` model handed
//! back to compute, CIDR/prefix arithmetic, configuration, the domain error
//! taxonomy, and notification payloads.

pub mod config;
pub mod error;
pub mod ip;
pub mod model;
pub mod netinfo;
pub mod notify;

pub use config::Config;
pub use error::{NetworkError, NetworkResult};
pub use model::{
    DnsDomain, DnsScope, FixedIp, FloatingIp, HostLimits, HostState, MacAddressDef, Network,
    Topology, Vif,
};
pub use netinfo::NetworkInfo;
