//! Converts [`NetworkError`] into a wire-level [`tonic::Status`]. Grounded
//! on the teacher's `RpcDataConversionError` → `tonic::Status` conversion:
//! log the full error server-side via `tracing::error!`, then downgrade to
//! a coarser status the caller can act on. The wire format of the
//! surrounding RPC transport itself is out of scope (spec.md §1 Non-goals).

use net_core::error::NetworkError;

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error(transparent)]
    Domain(#[from] NetworkError),

    #[error("forwarded call to host {host} timed out")]
    ForwardTimeout { host: String },

    #[error("forwarded call to host {host} failed: {reason}")]
    ForwardFailed { host: String, reason: String },

    #[error("no RPC client configured to reach host {host}")]
    NoClientForHost { host: String },
}

impl From<RpcError> for tonic::Status {
    fn from(err: RpcError) -> Self {
        tracing::error!(error = %err, "network RPC call failed");

        match err {
            RpcError::Domain(domain) => domain_status(domain),
            RpcError::ForwardTimeout { host } => {
                tonic::Status::deadline_exceeded(format!("forward to {host} timed out"))
            }
            RpcError::ForwardFailed { host, reason } => {
                tonic::Status::unavailable(format!("forward to {host} failed: {reason}"))
            }
            RpcError::NoClientForHost { host } => {
                tonic::Status::unavailable(format!("no client configured for host {host}"))
            }
        }
    }
}

fn domain_status(err: NetworkError) -> tonic::Status {
    use tonic::Code;

    let code = match &err {
        NetworkError::QuotaExceeded { .. } => Code::ResourceExhausted,
        NetworkError::NoMoreFixedIps { .. } => Code::ResourceExhausted,
        NetworkError::FixedIpAlreadyInUse { .. }
        | NetworkError::FixedIpNotFoundForNetwork { .. }
        | NetworkError::FixedIpInvalid { .. }
        | NetworkError::FloatingIpAssociated { .. }
        | NetworkError::FloatingIpNotAssociated { .. }
        | NetworkError::CannotDisassociateAutoAssignedFloatingIp { .. }
        | NetworkError::VlanRangeExceeded { .. } => Code::InvalidArgument,
        NetworkError::NotAuthorized { .. } => Code::PermissionDenied,
        NetworkError::NetworkNotFound { .. } | NetworkError::InstanceNotFound { .. } => {
            Code::NotFound
        }
        NetworkError::NoValidHost => Code::ResourceExhausted,
        NetworkError::NetworkNotCreated { .. }
        | NetworkError::OverlapsExistingSupernet
        | NetworkError::OverlapsExistingSubnet => Code::FailedPrecondition,
        NetworkError::VirtualInterfaceMacAddressException { .. } => Code::Aborted,
        NetworkError::NoFloatingIpInterface { .. } => Code::FailedPrecondition,
        NetworkError::ProcessExecutionError(_) => Code::Internal,
        NetworkError::HostUnreachable { .. } => Code::Unavailable,
    };

    tonic::Status::new(code, err.to_string())
}
