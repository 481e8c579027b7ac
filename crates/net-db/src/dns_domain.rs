//! Minimal DNS domain CRUD nova performs around the otherwise-inert
//! `DNSDomain` entity (SPEC_FULL §11): `create_private_dns_domain`,
//! `create_public_dns_domain`, `delete_dns_domain`, and the
//! name/address lookups `allocate_fixed_ip`'s DNS side effect needs.

use std::net::IpAddr;

use net_core::model::DnsDomain;
use net_uuid::dns::DnsDomainId;
use net_uuid::project::ProjectId;

use crate::error::{DatabaseError, DatabaseResult};
use crate::safe_pg_pool::Transaction;

pub async fn create_private(
    txn: &mut Transaction<'_>,
    domain: &str,
    availability_zone: &str,
) -> DatabaseResult<DnsDomain> {
    let query = r#"
        INSERT INTO dns_domains (id, domain, scope, availability_zone, project_id)
        VALUES ($1, $2, 'private', $3, NULL)
        RETURNING *
    "#;
    sqlx::query_as(query)
        .bind(DnsDomainId::new_v4().as_uuid())
        .bind(domain)
        .bind(availability_zone)
        .fetch_one(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn create_public(
    txn: &mut Transaction<'_>,
    domain: &str,
    project_id: ProjectId,
) -> DatabaseResult<DnsDomain> {
    let query = r#"
        INSERT INTO dns_domains (id, domain, scope, availability_zone, project_id)
        VALUES ($1, $2, 'public', NULL, $3)
        RETURNING *
    "#;
    sqlx::query_as(query)
        .bind(DnsDomainId::new_v4().as_uuid())
        .bind(domain)
        .bind(project_id.as_uuid())
        .fetch_one(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn delete(txn: &mut Transaction<'_>, domain: &str) -> DatabaseResult<()> {
    let query = "DELETE FROM dns_domains WHERE domain = $1";
    sqlx::query(query)
        .bind(domain)
        .execute(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;
    Ok(())
}

pub async fn find_all(txn: &mut Transaction<'_>) -> DatabaseResult<Vec<DnsDomain>> {
    let query = "SELECT * FROM dns_domains ORDER BY domain";
    sqlx::query_as(query)
        .fetch_all(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

/// A-record entries nova records alongside fixed-IP allocation: this crate
/// doesn't model a full DNS RR store, so entries are kept in a narrow
/// `dns_entries (domain, name, address)` table and looked up by either key.
pub async fn entries_by_address(
    txn: &mut Transaction<'_>,
    address: IpAddr,
) -> DatabaseResult<Vec<(String, String)>> {
    let query = "SELECT domain, name FROM dns_entries WHERE address = $1";
    sqlx::query_as(query)
        .bind(address)
        .fetch_all(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn entries_by_name(
    txn: &mut Transaction<'_>,
    domain: &str,
    name: &str,
) -> DatabaseResult<Vec<IpAddr>> {
    let query = "SELECT address FROM dns_entries WHERE domain = $1 AND name = $2";
    let rows: Vec<(IpAddr,)> = sqlx::query_as(query)
        .bind(domain)
        .bind(name)
        .fetch_all(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;
    Ok(rows.into_iter().map(|(a,)| a).collect())
}

pub async fn create_entry(
    txn: &mut Transaction<'_>,
    domain: &str,
    name: &str,
    address: IpAddr,
) -> DatabaseResult<()> {
    let query = r#"
        INSERT INTO dns_entries (domain, name, address)
        VALUES ($1, $2, $3)
        ON CONFLICT (domain, name, address) DO NOTHING
    "#;
    sqlx::query(query)
        .bind(domain)
        .bind(name)
        .bind(address)
        .execute(&mut **txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;
    Ok(())
}
