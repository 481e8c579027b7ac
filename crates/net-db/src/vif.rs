//! Query functions for the [`Vif`] entity, plus the MAC-uniqueness retry
//! loop named in spec.md §3/§5 (`create_unique_mac_address_attempts`).

use net_core::error::NetworkError;
use net_core::model::{MacAddressDef, Vif};
use net_uuid::instance::InstanceId;
use net_uuid::network::NetworkId;
use net_uuid::vif::VifId;

use crate::error::{DatabaseError, DatabaseResult};
use crate::safe_pg_pool::Transaction;

pub async fn find_by_mac_address(
    txn: &mut Transaction<'_>,
    address: mac_address::MacAddress,
) -> DatabaseResult<Option<Vif>> {
    let query = "SELECT * FROM virtual_interfaces WHERE address = $1";
    sqlx::query_as(query)
        .bind(MacAddressDef(address))
        .fetch_optional(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn find_by_instance(
    txn: &mut Transaction<'_>,
    instance_id: InstanceId,
) -> DatabaseResult<Vec<Vif>> {
    let query = "SELECT * FROM virtual_interfaces WHERE instance_id = $1 ORDER BY network_id";
    sqlx::query_as(query)
        .bind(instance_id.as_uuid())
        .fetch_all(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn find_by_instance_and_network(
    txn: &mut Transaction<'_>,
    instance_id: InstanceId,
    network_id: NetworkId,
) -> DatabaseResult<Option<Vif>> {
    let query =
        "SELECT * FROM virtual_interfaces WHERE instance_id = $1 AND network_id = $2";
    sqlx::query_as(query)
        .bind(instance_id.as_uuid())
        .bind(network_id.as_uuid())
        .fetch_optional(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

async fn try_insert(
    txn: &mut Transaction<'_>,
    id: VifId,
    address: mac_address::MacAddress,
    instance_id: InstanceId,
    network_id: NetworkId,
) -> DatabaseResult<Vif> {
    let query = r#"
        INSERT INTO virtual_interfaces (id, address, instance_id, network_id)
        VALUES ($1, $2, $3, $4)
        RETURNING *
    "#;
    sqlx::query_as(query)
        .bind(id.as_uuid())
        .bind(MacAddressDef(address))
        .bind(instance_id.as_uuid())
        .bind(network_id.as_uuid())
        .fetch_one(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

/// Create a VIF row, retrying with a freshly generated MAC on a
/// unique-constraint violation up to `max_attempts` times. Exhaustion is
/// fatal to the whole allocation (spec.md §3, §5) — callers must roll back
/// every VIF already created for this instance.
pub async fn create_with_unique_mac<F>(
    txn: &mut Transaction<'_>,
    instance_id: InstanceId,
    network_id: NetworkId,
    max_attempts: u32,
    mut generate_mac: F,
) -> DatabaseResult<Vif>
where
    F: FnMut() -> mac_address::MacAddress,
{
    for _ in 0..max_attempts {
        let id = VifId::new_v4();
        let address = generate_mac();
        match try_insert(txn, id, address, instance_id, network_id).await {
            Ok(vif) => return Ok(vif),
            Err(DatabaseError::Query { source, .. }) if is_unique_violation(&source) => continue,
            Err(other) => return Err(other),
        }
    }

    Err(DatabaseError::Domain(
        NetworkError::VirtualInterfaceMacAddressException {
            instance_id,
            attempts: max_attempts,
        },
    ))
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error.as_database_error().map(|e| e.is_unique_violation()), Some(true))
}

pub async fn delete(txn: &mut Transaction<'_>, id: VifId) -> DatabaseResult<()> {
    let query = "DELETE FROM virtual_interfaces WHERE id = $1";
    sqlx::query(query)
        .bind(id.as_uuid())
        .execute(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;
    Ok(())
}

pub async fn delete_all_for_instance(
    txn: &mut Transaction<'_>,
    instance_id: InstanceId,
) -> DatabaseResult<u64> {
    let query = "DELETE FROM virtual_interfaces WHERE instance_id = $1";
    let result = sqlx::query(query)
        .bind(instance_id.as_uuid())
        .execute(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;
    Ok(result.rows_affected())
}
