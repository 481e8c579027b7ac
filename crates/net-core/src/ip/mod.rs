pub mod address_family;
pub mod ipset;
pub mod prefix;

pub use address_family::{IdentifyAddressFamily, IpAddressFamily};
pub use ipset::IpSet;
pub use prefix::{IpNet, IpNetwork, IpPrefix, Ipv4Prefix, Ipv6Prefix, Prefix, ToPrefix};
