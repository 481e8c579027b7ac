//! Host filters (spec.md §4.6 step 4 "Filter"): predicates over a
//! [`HostState`] run in sequence to narrow the candidate set before
//! weighing. Nova ships these as independently loadable plugins; here
//! they're a small trait object list assembled by the caller, following
//! the strategy-object pattern `net_manager::topology` uses for topology
//! variants.

use net_core::model::HostState;

use crate::request::{FilterProperties, InstanceProperties};

/// A single placement predicate: does `host` have room for `instance`?
pub trait HostFilter: Send + Sync {
    fn name(&self) -> &'static str;

    fn host_passes(
        &self,
        host: &HostState,
        instance: &InstanceProperties,
        filter_properties: &FilterProperties,
    ) -> bool;
}

/// Rejects hosts with insufficient free RAM for the requested instance.
pub struct RamFilter;

impl HostFilter for RamFilter {
    fn name(&self) -> &'static str {
        "RamFilter"
    }

    fn host_passes(
        &self,
        host: &HostState,
        instance: &InstanceProperties,
        _filter_properties: &FilterProperties,
    ) -> bool {
        host.free_ram_mb >= instance.memory_mb
    }
}

/// Rejects hosts with insufficient free vCPUs.
pub struct CoreFilter;

impl HostFilter for CoreFilter {
    fn name(&self) -> &'static str {
        "CoreFilter"
    }

    fn host_passes(
        &self,
        host: &HostState,
        instance: &InstanceProperties,
        _filter_properties: &FilterProperties,
    ) -> bool {
        host.vcpus_free() >= instance.vcpus
    }
}

/// Rejects hosts with insufficient free disk.
pub struct DiskFilter;

impl HostFilter for DiskFilter {
    fn name(&self) -> &'static str {
        "DiskFilter"
    }

    fn host_passes(
        &self,
        host: &HostState,
        instance: &InstanceProperties,
        _filter_properties: &FilterProperties,
    ) -> bool {
        host.free_disk_gb >= instance.disk_gb
    }
}

/// Excludes `(host, node)` pairs already recorded in the retry ledger, so a
/// re-scheduled instance doesn't land back on a host it already failed on.
pub struct RetryFilter;

impl HostFilter for RetryFilter {
    fn name(&self) -> &'static str {
        "RetryFilter"
    }

    fn host_passes(
        &self,
        host: &HostState,
        _instance: &InstanceProperties,
        filter_properties: &FilterProperties,
    ) -> bool {
        match filter_properties.retry.as_ref() {
            Some(retry) => !retry
                .hosts
                .iter()
                .any(|(h, n)| h == &host.host && n == &host.node),
            None => true,
        }
    }
}

/// Run every filter in sequence against every host; a host must pass all of
/// them to remain a candidate (spec.md §4.6 step 4: "Filter:
/// `hosts = HostManager.get_filtered_hosts(hosts, filter_properties)`").
pub fn get_filtered_hosts(
    hosts: Vec<HostState>,
    instance: &InstanceProperties,
    filter_properties: &FilterProperties,
    filters: &[Box<dyn HostFilter>],
) -> Vec<HostState> {
    hosts
        .into_iter()
        .filter(|host| {
            filters.iter().all(|f| {
                let passed = f.host_passes(host, instance, filter_properties);
                if !passed {
                    tracing::debug!(host = %host.host, node = %host.node, filter = f.name(), "host filtered out");
                }
                passed
            })
        })
        .collect()
}

/// The default filter chain: resource-fit checks plus the retry exclusion.
pub fn default_filters() -> Vec<Box<dyn HostFilter>> {
    vec![
        Box::new(RetryFilter),
        Box::new(RamFilter),
        Box::new(CoreFilter),
        Box::new(DiskFilter),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use net_uuid::project::ProjectId;

    fn host(name: &str, ram: i64, disk: i64, vcpus_total: i32) -> HostState {
        HostState {
            host: name.to_string(),
            node: format!("{name}-node"),
            free_ram_mb: ram,
            free_disk_gb: disk,
            vcpus_total,
            vcpus_used: 0,
            limits: Default::default(),
        }
    }

    fn instance(memory_mb: i64, disk_gb: i64, vcpus: i32) -> InstanceProperties {
        InstanceProperties {
            uuid: None,
            project_id: ProjectId::new_v4(),
            os_type: None,
            memory_mb,
            disk_gb,
            vcpus,
        }
    }

    #[test]
    fn ram_filter_rejects_undersized_hosts() {
        let filter = RamFilter;
        let fp = FilterProperties::default();
        assert!(filter.host_passes(&host("a", 2048, 100, 4), &instance(1024, 10, 1), &fp));
        assert!(!filter.host_passes(&host("a", 512, 100, 4), &instance(1024, 10, 1), &fp));
    }

    #[test]
    fn retry_filter_excludes_previously_tried_hosts() {
        let filter = RetryFilter;
        let mut fp = FilterProperties::default();
        fp.retry = Some(crate::request::RetryLedger {
            num_attempts: 1,
            hosts: vec![("a".to_string(), "a-node".to_string())],
        });
        let inst = instance(1024, 10, 1);
        assert!(!filter.host_passes(&host("a", 4096, 200, 8), &inst, &fp));
        assert!(filter.host_passes(&host("b", 4096, 200, 8), &inst, &fp));
    }

    #[test]
    fn get_filtered_hosts_applies_full_chain() {
        let hosts = vec![
            host("a", 4096, 200, 8),
            host("b", 256, 200, 8),
            host("c", 4096, 5, 8),
        ];
        let inst = instance(1024, 10, 2);
        let fp = FilterProperties::default();
        let filtered = get_filtered_hosts(hosts, &inst, &fp, &default_filters());
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].host, "a");
    }
}
