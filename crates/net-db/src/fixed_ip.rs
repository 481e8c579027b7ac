//! Read-only [`FixedIp`] lookups nova exposes alongside the mutating RPCs
//! (SPEC_FULL §11): `get_fixed_ip_by_address`,
//! `get_instance_uuids_by_ip_filter`. Mutating operations live in
//! [`crate::address_pool`].

use std::net::IpAddr;

use net_core::model::FixedIp;
use net_uuid::instance::InstanceId;
use net_uuid::network::NetworkId;
use net_uuid::vif::VifId;

use crate::error::{DatabaseError, DatabaseResult};
use crate::safe_pg_pool::Transaction;

pub async fn find_by_address(
    txn: &mut Transaction<'_>,
    address: IpAddr,
) -> DatabaseResult<Option<FixedIp>> {
    let query = "SELECT * FROM fixed_ips WHERE address = $1";
    sqlx::query_as(query)
        .bind(address)
        .fetch_optional(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn find_by_network(
    txn: &mut Transaction<'_>,
    network_id: NetworkId,
) -> DatabaseResult<Vec<FixedIp>> {
    let query = "SELECT * FROM fixed_ips WHERE network_id = $1 ORDER BY address";
    sqlx::query_as(query)
        .bind(network_id.as_uuid())
        .fetch_all(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn find_by_instance(
    txn: &mut Transaction<'_>,
    instance_id: InstanceId,
) -> DatabaseResult<Vec<FixedIp>> {
    let query = "SELECT * FROM fixed_ips WHERE instance_id = $1 ORDER BY address";
    sqlx::query_as(query)
        .bind(instance_id.as_uuid())
        .fetch_all(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

/// Instance uuids whose fixed IPs match a SQL `LIKE`-style filter, e.g.
/// `"10.0.0.%"` — nova's `get_instance_uuids_by_ip_filter`.
pub async fn instance_ids_matching(
    txn: &mut Transaction<'_>,
    address_filter: &str,
) -> DatabaseResult<Vec<InstanceId>> {
    let query = r#"
        SELECT DISTINCT instance_id FROM fixed_ips
        WHERE instance_id IS NOT NULL AND host(address) LIKE $1
    "#;
    let rows: Vec<(uuid::Uuid,)> = sqlx::query_as(query)
        .bind(address_filter)
        .fetch_all(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;
    Ok(rows.into_iter().map(|(id,)| InstanceId::from(id)).collect())
}

pub async fn set_vif(
    txn: &mut Transaction<'_>,
    address: IpAddr,
    vif_id: VifId,
) -> DatabaseResult<()> {
    let query = "UPDATE fixed_ips SET vif_id = $2 WHERE address = $1";
    sqlx::query(query)
        .bind(address)
        .bind(vif_id.as_uuid())
        .execute(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;
    Ok(())
}

pub async fn set_leased(
    txn: &mut Transaction<'_>,
    address: IpAddr,
    leased: bool,
) -> DatabaseResult<()> {
    let query = "UPDATE fixed_ips SET leased = $2, updated_at = now() WHERE address = $1";
    sqlx::query(query)
        .bind(address)
        .bind(leased)
        .execute(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;
    Ok(())
}
