//! Carves a free subnet for `create_networks` (spec.md §4.4) out of a
//! configured fixed range, rejecting any candidate that overlaps an
//! existing network's CIDR in either direction.
//!
//! Grounded on `next_available_prefix`/`build_candidate_subnet` in the
//! teacher's `ip_allocator.rs`: step through fixed-size candidate subnets
//! of the requested range and reject the first one found to either contain,
//! or be contained by, an already-allocated prefix.

use net_core::error::{NetworkError, NetworkResult};
use net_core::ip::{IdentifyAddressFamily, IpAddressFamily, IpPrefix, IpSet};

use crate::error::DatabaseResult;
use crate::safe_pg_pool::Transaction;

/// All network CIDRs of the given address family currently recorded,
/// regardless of which host owns them — used to avoid overlap when carving
/// a new subnet out of a shared fixed range.
async fn used_prefixes(
    txn: &mut Transaction<'_>,
    family: IpAddressFamily,
) -> DatabaseResult<Vec<IpPrefix>> {
    let column = match family {
        IpAddressFamily::Ipv4 => "cidr_v4",
        IpAddressFamily::Ipv6 => "cidr_v6",
    };
    let query = format!("SELECT {column} FROM networks WHERE {column} IS NOT NULL");
    let rows: Vec<(ipnetwork::IpNetwork,)> = sqlx::query_as(&query)
        .fetch_all(&mut **txn)
        .await
        .map_err(|e| crate::error::DatabaseError::query(query.clone(), e))?;

    rows.into_iter()
        .map(|(net,)| IpPrefix::try_from(net).map_err(|_| crate::error::DatabaseError::Domain(
            NetworkError::NetworkNotCreated {
                label: String::new(),
                reason: "existing network CIDR is not a canonical prefix".to_string(),
            },
        )))
        .collect()
}

/// Find the next subnet of `prefix_length` bits inside `fixed_range` that
/// overlaps none of the already-used prefixes, stepping by subnet size.
pub fn next_available_prefix(
    fixed_range: IpPrefix,
    prefix_length: usize,
    used: &[IpPrefix],
) -> NetworkResult<IpPrefix> {
    if prefix_length < fixed_range.prefix_length() {
        return Err(NetworkError::NetworkNotCreated {
            label: String::new(),
            reason: "requested subnet is larger than the fixed range".to_string(),
        });
    }

    let mut used_set = IpSet::new_empty();
    for prefix in used {
        used_set.add(*prefix);
    }

    let step = 1u128 << (fixed_range_bits(fixed_range.address_family()) - prefix_length as u32);
    let range_size = fixed_range.size();
    let family = fixed_range.address_family();

    let mut saw_subnet_conflict = false;
    let mut offset = 0u128;
    while offset < range_size {
        if let Some(candidate) = candidate_at_offset(fixed_range, prefix_length, offset, family) {
            // The candidate sits inside an already-used supernet: this is a
            // hard conflict, not a "try the next slot" situation (spec.md
            // §4.4: "both rejected with distinct errors").
            if used_set.contains(candidate) {
                return Err(NetworkError::OverlapsExistingSupernet);
            }
            // An existing (smaller) used prefix sits inside the candidate:
            // step past it and keep looking.
            let contains_used_subnet = used_set.get_prefixes().iter().any(|p| candidate.contains(*p));
            if !contains_used_subnet {
                return Ok(candidate);
            }
            saw_subnet_conflict = true;
        }
        offset += step;
    }

    if saw_subnet_conflict {
        Err(NetworkError::OverlapsExistingSubnet)
    } else {
        Err(NetworkError::NetworkNotCreated {
            label: String::new(),
            reason: "no free subnet of the requested size remains in the fixed range".to_string(),
        })
    }
}

fn fixed_range_bits(family: IpAddressFamily) -> u32 {
    match family {
        IpAddressFamily::Ipv4 => 32,
        IpAddressFamily::Ipv6 => 128,
    }
}

fn candidate_at_offset(
    base: IpPrefix,
    prefix_length: usize,
    offset: u128,
    family: IpAddressFamily,
) -> Option<IpPrefix> {
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
    match (base, family) {
        (IpPrefix::V4(v4), IpAddressFamily::Ipv4) => {
            let base_bits = v4.addr().to_bits() as u128;
            let addr = Ipv4Addr::from((base_bits + offset) as u32);
            IpPrefix::try_from((IpAddr::V4(addr), prefix_length as u8)).ok()
        }
        (IpPrefix::V6(v6), IpAddressFamily::Ipv6) => {
            let base_bits = v6.addr().to_bits();
            let addr = Ipv6Addr::from(base_bits + offset);
            IpPrefix::try_from((IpAddr::V6(addr), prefix_length as u8)).ok()
        }
        _ => None,
    }
}

/// Used by `create_networks` to both load the overlap set and pick a
/// subnet in one transaction.
pub async fn allocate_subnet(
    txn: &mut Transaction<'_>,
    fixed_range: IpPrefix,
    prefix_length: usize,
) -> DatabaseResult<IpPrefix> {
    let used = used_prefixes(txn, fixed_range.address_family()).await?;
    next_available_prefix(fixed_range, prefix_length, &used)
        .map_err(crate::error::DatabaseError::Domain)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn finds_first_free_subnet() {
        let fixed_range = IpPrefix::from_str("10.0.0.0/16").unwrap();
        let used = vec![IpPrefix::from_str("10.0.0.0/24").unwrap()];
        let next = next_available_prefix(fixed_range, 24, &used).unwrap();
        assert_eq!(next, IpPrefix::from_str("10.0.1.0/24").unwrap());
    }

    #[test]
    fn rejects_when_range_exhausted() {
        let fixed_range = IpPrefix::from_str("10.0.0.0/24").unwrap();
        let used = vec![IpPrefix::from_str("10.0.0.0/24").unwrap()];
        assert!(next_available_prefix(fixed_range, 24, &used).is_err());
    }

    #[test]
    fn rejects_subnet_larger_than_range() {
        let fixed_range = IpPrefix::from_str("10.0.0.0/24").unwrap();
        assert!(next_available_prefix(fixed_range, 16, &[]).is_err());
    }

    #[test]
    fn candidate_inside_existing_supernet_fails_immediately() {
        let fixed_range = IpPrefix::from_str("10.0.0.0/16").unwrap();
        let used = vec![IpPrefix::from_str("10.0.0.0/8").unwrap()];
        let err = next_available_prefix(fixed_range, 24, &used).unwrap_err();
        assert!(matches!(err, NetworkError::OverlapsExistingSupernet));
    }

    #[test]
    fn existing_subnet_inside_candidate_fails_distinctly_once_exhausted() {
        // The candidate is the entire fixed range (no room to step past it),
        // and a smaller used prefix sits inside it.
        let fixed_range = IpPrefix::from_str("10.0.0.0/16").unwrap();
        let used = vec![IpPrefix::from_str("10.0.0.0/24").unwrap()];
        let err = next_available_prefix(fixed_range, 16, &used).unwrap_err();
        assert!(matches!(err, NetworkError::OverlapsExistingSubnet));
    }
}
