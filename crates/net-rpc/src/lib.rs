//! The Network Ownership Router and the RPC-facing error conversions
//! (spec.md §4.2). The wire format of the transport itself is a Non-goal;
//! [`client::NetworkRpcClient`] is the seam a concrete implementation
//! plugs into.

pub mod client;
pub mod errors;
pub mod router;

pub use client::NetworkRpcClient;
pub use errors::RpcError;
pub use router::{Dispatch, HeartbeatOracle, OwnershipMode, OwnershipRouter};
