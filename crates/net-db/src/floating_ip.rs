//! Query functions for the [`FloatingIp`] entity (spec.md §4.5).

use std::net::IpAddr;

use net_core::error::NetworkError;
use net_core::model::FloatingIp;
use net_uuid::floating_ip::FloatingIpId;
use net_uuid::project::ProjectId;

use crate::error::{DatabaseError, DatabaseResult};
use crate::safe_pg_pool::Transaction;

pub async fn find(
    txn: &mut Transaction<'_>,
    address: IpAddr,
) -> DatabaseResult<FloatingIp> {
    let query = "SELECT * FROM floating_ips WHERE address = $1";
    sqlx::query_as(query)
        .bind(address)
        .fetch_one(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn find_by_id(
    txn: &mut Transaction<'_>,
    id: FloatingIpId,
) -> DatabaseResult<FloatingIp> {
    let query = "SELECT * FROM floating_ips WHERE id = $1";
    sqlx::query_as(query)
        .bind(id.as_uuid())
        .fetch_one(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

/// Every floating IP currently linked to `address`, used to assemble the
/// `floating_ips` list on a [`crate::fixed_ip`]'s info view (spec.md §6).
pub async fn find_by_fixed_ip_address(
    txn: &mut Transaction<'_>,
    address: IpAddr,
) -> DatabaseResult<Vec<FloatingIp>> {
    let query = "SELECT * FROM floating_ips WHERE fixed_ip_address = $1";
    sqlx::query_as(query)
        .bind(address)
        .fetch_all(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn find_by_host(
    txn: &mut Transaction<'_>,
    host: &str,
) -> DatabaseResult<Vec<FloatingIp>> {
    let query = "SELECT * FROM floating_ips WHERE host = $1";
    sqlx::query_as(query)
        .bind(host)
        .fetch_all(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

/// Allocate the next free address in `pool`, marking it owned by
/// `project_id`. Quota reservation brackets this call at a higher layer
/// (spec.md §4.5) — this only performs the pool pick-and-claim.
pub async fn allocate_address(
    txn: &mut Transaction<'_>,
    pool: &str,
    project_id: ProjectId,
    auto_assigned: bool,
) -> DatabaseResult<FloatingIp> {
    let query = r#"
        UPDATE floating_ips
        SET project_id = $2, auto_assigned = $3
        WHERE address = (
            SELECT address FROM floating_ips
            WHERE pool = $1 AND project_id IS NULL
            ORDER BY address
            FOR UPDATE SKIP LOCKED
            LIMIT 1
        )
        RETURNING *
    "#;
    sqlx::query_as(query)
        .bind(pool)
        .bind(project_id.as_uuid())
        .bind(auto_assigned)
        .fetch_optional(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))?
        .ok_or(DatabaseError::Domain(NetworkError::QuotaExceeded {
            pool: pool.to_string(),
        }))
}

pub async fn release_address(
    txn: &mut Transaction<'_>,
    id: FloatingIpId,
) -> DatabaseResult<()> {
    let query = r#"
        UPDATE floating_ips
        SET project_id = NULL, auto_assigned = false
        WHERE id = $1
    "#;
    sqlx::query(query)
        .bind(id.as_uuid())
        .execute(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;
    Ok(())
}

/// Link a floating IP to a fixed IP on `host`, the write side of
/// `associate_floating_ip` once the owning host has been resolved via the
/// Network Ownership Router (spec.md §4.2, §4.5).
pub async fn link_to_fixed_ip(
    txn: &mut Transaction<'_>,
    id: FloatingIpId,
    fixed_ip_address: IpAddr,
    host: &str,
    interface: &str,
) -> DatabaseResult<FloatingIp> {
    let query = r#"
        UPDATE floating_ips
        SET fixed_ip_address = $2, host = $3, interface = $4
        WHERE id = $1
        RETURNING *
    "#;
    sqlx::query_as(query)
        .bind(id.as_uuid())
        .bind(fixed_ip_address)
        .bind(host)
        .bind(interface)
        .fetch_one(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn unlink(txn: &mut Transaction<'_>, id: FloatingIpId) -> DatabaseResult<()> {
    let query = r#"
        UPDATE floating_ips
        SET fixed_ip_address = NULL, host = NULL, interface = NULL
        WHERE id = $1
    "#;
    sqlx::query(query)
        .bind(id.as_uuid())
        .execute(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;
    Ok(())
}
