//! Query functions for the [`Network`] entity, following the
//! `sqlx::query_as(query).bind(...).fetch_one(txn).await.map_err(...)`
//! idiom used throughout the teacher's per-entity query modules
//! (`network_prefix.rs`).

use net_core::model::Network;
use net_uuid::network::NetworkId;
use net_uuid::project::ProjectId;

use crate::error::{DatabaseError, DatabaseResult};
use crate::safe_pg_pool::Transaction;

pub async fn find(txn: &mut Transaction<'_>, id: NetworkId) -> DatabaseResult<Network> {
    let query = "SELECT * FROM networks WHERE id = $1";
    sqlx::query_as(query)
        .bind(id.as_uuid())
        .fetch_one(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn find_all(txn: &mut Transaction<'_>) -> DatabaseResult<Vec<Network>> {
    let query = "SELECT * FROM networks ORDER BY id";
    sqlx::query_as(query)
        .fetch_all(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

/// Non-VLAN networks: the pool every non-project-scoped instance draws
/// from (spec.md §4.3 step 1).
pub async fn find_non_vlan(txn: &mut Transaction<'_>) -> DatabaseResult<Vec<Network>> {
    let query = "SELECT * FROM networks WHERE topology != 'vlan' ORDER BY id";
    sqlx::query_as(query)
        .fetch_all(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

/// VLAN networks bound to `project_id` (spec.md §4.3 step 1, §4.4
/// "per-project" scoping row).
pub async fn find_by_project(
    txn: &mut Transaction<'_>,
    project_id: ProjectId,
) -> DatabaseResult<Vec<Network>> {
    let query = "SELECT * FROM networks WHERE project_id = $1 ORDER BY id";
    sqlx::query_as(query)
        .bind(project_id.as_uuid())
        .fetch_all(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn find_by_ids(
    txn: &mut Transaction<'_>,
    ids: &[NetworkId],
) -> DatabaseResult<Vec<Network>> {
    let uuids: Vec<uuid::Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
    let query = "SELECT * FROM networks WHERE id = ANY($1) ORDER BY id";
    sqlx::query_as(query)
        .bind(&uuids)
        .fetch_all(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn create(txn: &mut Transaction<'_>, network: &Network) -> DatabaseResult<Network> {
    let query = r#"
        INSERT INTO networks (
            id, topology, label, cidr_v4, cidr_v6, gateway_v4, gateway_v6, bridge,
            bridge_interface, dns, vlan, vpn_public_address, vpn_private_address,
            multi_host, host, project_id, injected
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        RETURNING *
    "#;
    sqlx::query_as(query)
        .bind(network.id.as_uuid())
        .bind(network.topology)
        .bind(&network.label)
        .bind(network.cidr_v4)
        .bind(network.cidr_v6)
        .bind(network.gateway_v4)
        .bind(network.gateway_v6)
        .bind(&network.bridge)
        .bind(&network.bridge_interface)
        .bind(&network.dns)
        .bind(network.vlan.map(i32::from))
        .bind(network.vpn_public_address)
        .bind(network.vpn_private_address)
        .bind(network.multi_host)
        .bind(&network.host)
        .bind(network.project_id.map(|id| id.as_uuid()))
        .bind(network.injected)
        .fetch_one(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn delete(txn: &mut Transaction<'_>, id: NetworkId) -> DatabaseResult<()> {
    let query = "DELETE FROM networks WHERE id = $1";
    sqlx::query(query)
        .bind(id.as_uuid())
        .execute(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;
    Ok(())
}

/// Atomically claim `host` as the owner of `id` only if unset — the
/// Network Ownership Router's lazy-assignment path (spec.md §4.2).
pub async fn set_host_if_unset(
    txn: &mut Transaction<'_>,
    id: NetworkId,
    host: &str,
) -> DatabaseResult<bool> {
    let query = "UPDATE networks SET host = $2 WHERE id = $1 AND host IS NULL";
    let result = sqlx::query(query)
        .bind(id.as_uuid())
        .bind(host)
        .execute(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;
    Ok(result.rows_affected() == 1)
}

/// Administrative VLAN-only operation binding an already-created network to
/// a project (spec.md SPEC_FULL §11).
pub async fn add_network_to_project(
    txn: &mut Transaction<'_>,
    id: NetworkId,
    project_id: ProjectId,
) -> DatabaseResult<()> {
    let query = "UPDATE networks SET project_id = $2 WHERE id = $1 AND topology = 'vlan'";
    let result = sqlx::query(query)
        .bind(id.as_uuid())
        .bind(project_id.as_uuid())
        .execute(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;
    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound);
    }
    Ok(())
}
