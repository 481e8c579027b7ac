//! The Address Pool Engine (spec.md §4.1): hands out and reclaims individual
//! [`FixedIp`] rows from an already-created [`Network`]'s CIDR, with all
//! state transitions inside one transaction so concurrent allocators cannot
//! double-allocate a row.
//!
//! Grounded on the single-query "find the next free address" idiom from
//! `next_machine_interface_v4_ip` in the teacher's `ip_allocator.rs`: rather
//! than loading every row and scanning in Rust, the free address is located
//! with one conditional `UPDATE ... WHERE address = (SELECT ...)` so the
//! pick-and-claim is atomic under Postgres's row locking.

use std::net::IpAddr;

use net_core::error::{NetworkError, NetworkResult};
use net_core::model::FixedIp;
use net_uuid::instance::InstanceId;
use net_uuid::network::NetworkId;

use crate::error::{DatabaseError, DatabaseResult};
use crate::safe_pg_pool::Transaction;

/// Claim any unreserved, unallocated [`FixedIp`] in `network_id` for
/// `instance_id`. Fails with [`NetworkError::NoMoreFixedIps`] when the pool
/// is exhausted.
pub async fn associate_any(
    txn: &mut Transaction<'_>,
    network_id: NetworkId,
    instance_id: InstanceId,
) -> DatabaseResult<IpAddr> {
    let query = r#"
        UPDATE fixed_ips
        SET allocated = true, instance_id = $2, updated_at = now()
        WHERE address = (
            SELECT address FROM fixed_ips
            WHERE network_id = $1 AND allocated = false AND reserved = false
            ORDER BY address
            FOR UPDATE SKIP LOCKED
            LIMIT 1
        )
        RETURNING address
    "#;
    let row: Option<(IpAddr,)> = sqlx::query_as(query)
        .bind(network_id.as_uuid())
        .bind(instance_id.as_uuid())
        .fetch_optional(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;

    row.map(|(address,)| address).ok_or_else(|| {
        DatabaseError::Domain(NetworkError::NoMoreFixedIps { network_id })
    })
}

/// Claim a caller-specified address. Fails with
/// [`NetworkError::FixedIpAlreadyInUse`] if it is already allocated to a
/// different instance.
pub async fn associate_address(
    txn: &mut Transaction<'_>,
    network_id: NetworkId,
    address: IpAddr,
    instance_id: InstanceId,
) -> DatabaseResult<IpAddr> {
    let select = "SELECT * FROM fixed_ips WHERE network_id = $1 AND address = $2 FOR UPDATE";
    let existing: Option<FixedIp> = sqlx::query_as(select)
        .bind(network_id.as_uuid())
        .bind(address)
        .fetch_optional(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(select, e))?;

    let existing = existing.ok_or(DatabaseError::Domain(NetworkError::FixedIpNotFoundForNetwork {
        address,
        network_id,
    }))?;

    if existing.allocated {
        return Err(DatabaseError::Domain(NetworkError::FixedIpAlreadyInUse { address }));
    }

    let update = r#"
        UPDATE fixed_ips SET allocated = true, instance_id = $3, updated_at = now()
        WHERE network_id = $1 AND address = $2
    "#;
    sqlx::query(update)
        .bind(network_id.as_uuid())
        .bind(address)
        .bind(instance_id.as_uuid())
        .execute(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(update, e))?;

    Ok(address)
}

/// Clear instance and VIF linkage and mark the address free again. Leaves
/// `reserved` untouched (spec.md §4.1).
pub async fn disassociate(
    txn: &mut Transaction<'_>,
    network_id: NetworkId,
    address: IpAddr,
) -> DatabaseResult<()> {
    let query = r#"
        UPDATE fixed_ips
        SET allocated = false, leased = false, instance_id = NULL, vif_id = NULL, updated_at = now()
        WHERE network_id = $1 AND address = $2
    "#;
    sqlx::query(query)
        .bind(network_id.as_uuid())
        .bind(address)
        .execute(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;
    Ok(())
}

/// Materialize one [`FixedIp`] row per address in `cidr`, marking the
/// `bottom_reserved` lowest and `top_reserved` highest addresses as
/// reserved. Reserved-slot counts are a topology policy decision
/// (spec.md §4.1, §4.4) supplied by the caller rather than computed here.
pub async fn bulk_create(
    txn: &mut Transaction<'_>,
    network_id: NetworkId,
    cidr: ipnetwork::IpNetwork,
    bottom_reserved: u64,
    top_reserved: u64,
) -> DatabaseResult<u64> {
    let addresses: Vec<IpAddr> = match cidr {
        ipnetwork::IpNetwork::V4(v4) => v4.iter().map(IpAddr::V4).collect(),
        ipnetwork::IpNetwork::V6(v6) => v6.iter().map(IpAddr::V6).collect(),
    };
    let count = addresses.len() as u64;

    let query = r#"
        INSERT INTO fixed_ips (network_id, address, reserved, allocated, leased, updated_at)
        VALUES ($1, $2, $3, false, false, now())
    "#;
    for (index, address) in addresses.into_iter().enumerate() {
        let index = index as u64;
        let reserved = index < bottom_reserved || (count - index) <= top_reserved;
        sqlx::query(query)
            .bind(network_id.as_uuid())
            .bind(address)
            .bind(reserved)
            .execute(&mut **txn)
            .await
            .map_err(|e| DatabaseError::query(query, e))?;
    }

    Ok(count)
}

/// Disassociate every [`FixedIp`] on `host` whose `updated_at` predates
/// `cutoff` and which is not currently allocated (the periodic reaper,
/// spec.md §4.7). Returns the number of rows reclaimed.
pub async fn reap_stale(
    txn: &mut Transaction<'_>,
    host: &str,
    cutoff: chrono::DateTime<chrono::Utc>,
) -> DatabaseResult<u64> {
    // Flat leases are externally managed (spec.md §4.1, §4.4) and must
    // never be reaped here; `Topology::reaps_fixed_ips()` names the same
    // exclusion for the in-process callers of this function.
    let query = r#"
        UPDATE fixed_ips
        SET instance_id = NULL, vif_id = NULL, leased = false
        WHERE network_id IN (SELECT id FROM networks WHERE host = $1 AND topology != 'flat')
          AND allocated = false
          AND updated_at < $2
    "#;
    let result = sqlx::query(query)
        .bind(host)
        .bind(cutoff)
        .execute(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulk_create_reserves_bottom_and_top_slots() {
        // A /29 has 8 addresses; Flat/FlatDHCP reserve bottom=2, top=1
        // (network address, gateway, broadcast — spec.md §4.1).
        let count = 8u64;
        let bottom_reserved = 2u64;
        let top_reserved = 1u64;
        let reserved: Vec<bool> = (0..count)
            .map(|index| index < bottom_reserved || (count - index) <= top_reserved)
            .collect();
        assert_eq!(
            reserved,
            vec![true, true, false, false, false, false, false, true]
        );
    }
}
