//! Host weighers (spec.md §4.6 step 4 "Weigh"): rank the filtered
//! candidates and hand back the best one. Nova's default is a RAM weigher
//! that spreads load across hosts with the most free memory; this mirrors
//! that as the single built-in weigher, generalized behind a trait so
//! others can be added without touching the scheduler loop.

use net_core::model::HostState;

use crate::request::{FilterProperties, InstanceProperties};

/// Produces a relative desirability score for one host; higher wins.
pub trait HostWeigher: Send + Sync {
    fn name(&self) -> &'static str;

    fn weigh(
        &self,
        host: &HostState,
        instance: &InstanceProperties,
        filter_properties: &FilterProperties,
    ) -> f64;
}

/// Prefers hosts with more free RAM, spreading a batch across the fleet
/// instead of packing it onto one host (spec.md §8 scenario S4).
pub struct RamWeigher;

impl HostWeigher for RamWeigher {
    fn name(&self) -> &'static str {
        "RamWeigher"
    }

    fn weigh(
        &self,
        host: &HostState,
        _instance: &InstanceProperties,
        _filter_properties: &FilterProperties,
    ) -> f64 {
        host.free_ram_mb as f64
    }
}

/// One host with its aggregate weight, sorted descending by
/// [`get_weighed_hosts`] — nova's `WeighedHost`.
#[derive(Debug, Clone, PartialEq)]
pub struct WeighedHost {
    pub obj: HostState,
    pub weight: f64,
}

/// Weigh every host by summing every weigher's score, and sort descending
/// so index 0 is the best host (spec.md §4.6 step 4: "`weighed =
/// HostManager.get_weighed_hosts(hosts, filter_properties)`, take index 0
/// as `best_host`").
pub fn get_weighed_hosts(
    hosts: Vec<HostState>,
    instance: &InstanceProperties,
    filter_properties: &FilterProperties,
    weighers: &[Box<dyn HostWeigher>],
) -> Vec<WeighedHost> {
    let mut weighed: Vec<WeighedHost> = hosts
        .into_iter()
        .map(|host| {
            let weight = weighers
                .iter()
                .map(|w| w.weigh(&host, instance, filter_properties))
                .sum();
            WeighedHost { obj: host, weight }
        })
        .collect();
    weighed.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal));
    weighed
}

pub fn default_weighers() -> Vec<Box<dyn HostWeigher>> {
    vec![Box::new(RamWeigher)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use net_uuid::project::ProjectId;

    fn host(name: &str, ram: i64) -> HostState {
        HostState {
            host: name.to_string(),
            node: format!("{name}-node"),
            free_ram_mb: ram,
            free_disk_gb: 500,
            vcpus_total: 16,
            vcpus_used: 0,
            limits: Default::default(),
        }
    }

    fn instance() -> InstanceProperties {
        InstanceProperties {
            uuid: None,
            project_id: ProjectId::new_v4(),
            os_type: None,
            memory_mb: 1024,
            disk_gb: 10,
            vcpus: 1,
        }
    }

    #[test]
    fn weighs_highest_ram_first() {
        let hosts = vec![host("a", 2048), host("b", 8192), host("c", 4096)];
        let fp = FilterProperties::default();
        let weighed = get_weighed_hosts(hosts, &instance(), &fp, &default_weighers());
        assert_eq!(weighed[0].obj.host, "b");
        assert_eq!(weighed[1].obj.host, "c");
        assert_eq!(weighed[2].obj.host, "a");
    }
}
