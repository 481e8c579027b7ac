//! The Filter Scheduler (spec.md §4.6): a stateless placement engine that
//! repeatedly filters and weighs a host snapshot, virtually consuming
//! resources between picks so a batch doesn't land entirely on one host.

use std::sync::Arc;

use net_core::notify::SchedulerEvent;
use net_uuid::instance::InstanceId;

use crate::error::{SchedulerError, SchedulerResult};
use crate::filters::{self, HostFilter};
use crate::host_manager::HostSource;
use crate::request::{FilterProperties, RequestSpec};
use crate::weighers::{self, HostWeigher, WeighedHost};

pub struct FilterScheduler {
    host_source: Arc<dyn HostSource>,
    filters: Vec<Box<dyn HostFilter>>,
    weighers: Vec<Box<dyn HostWeigher>>,
    scheduler_max_attempts: u32,
}

impl FilterScheduler {
    pub fn new(host_source: Arc<dyn HostSource>, scheduler_max_attempts: u32) -> Self {
        Self {
            host_source,
            filters: filters::default_filters(),
            weighers: weighers::default_weighers(),
            scheduler_max_attempts,
        }
    }

    pub fn with_filters_and_weighers(
        host_source: Arc<dyn HostSource>,
        scheduler_max_attempts: u32,
        filters: Vec<Box<dyn HostFilter>>,
        weighers: Vec<Box<dyn HostWeigher>>,
    ) -> Self {
        Self {
            host_source,
            filters,
            weighers,
            scheduler_max_attempts,
        }
    }

    /// `_schedule` (spec.md §4.6 steps 1-4): returns up to
    /// `len(instance_uuids)` hosts, one per loop iteration, each iteration
    /// seeing the virtual consumption of every prior pick in this pass. A
    /// filtered-to-empty host list ends the pass early with a partial
    /// batch rather than erroring (spec.md §4.6 step 4 "If empty, break").
    pub async fn schedule(
        &self,
        request_spec: &RequestSpec,
        filter_properties: &mut FilterProperties,
        instance_uuids: &[InstanceId],
    ) -> SchedulerResult<Vec<WeighedHost>> {
        if self.scheduler_max_attempts < 1 {
            return Err(SchedulerError::InvalidMaxAttempts(self.scheduler_max_attempts));
        }

        let lead_uuid = instance_uuids.first().copied();
        filter_properties.populate_retry(self.scheduler_max_attempts, lead_uuid)?;
        filter_properties.populate_from_request(request_spec);

        let num_instances = if instance_uuids.is_empty() {
            request_spec.num_instances
        } else {
            instance_uuids.len() as u32
        };

        let mut hosts = self.host_source.get_all_host_states().await;
        let mut selected = Vec::with_capacity(num_instances as usize);

        for _ in 0..num_instances {
            hosts = filters::get_filtered_hosts(
                hosts,
                &request_spec.instance_properties,
                filter_properties,
                &self.filters,
            );
            if hosts.is_empty() {
                break;
            }

            let mut weighed = weighers::get_weighed_hosts(
                hosts,
                &request_spec.instance_properties,
                filter_properties,
                &self.weighers,
            );
            let mut best_host = weighed.remove(0);

            best_host.obj.consume_from_instance(
                request_spec.instance_properties.memory_mb,
                request_spec.instance_properties.disk_gb,
                request_spec.instance_properties.vcpus,
            );

            hosts = weighed.into_iter().map(|w| w.obj).collect();
            hosts.push(best_host.obj.clone());

            selected.push(best_host);
        }

        Ok(selected)
    }

    /// `schedule_run_instance` (spec.md §4.6, §4.6 notifications): runs
    /// `schedule` once for the whole batch, then walks `instance_uuids`
    /// popping a selection for each. Per-instance failure is absorbed, not
    /// propagated, so the rest of the batch still proceeds (spec.md §7
    /// "in batch mode, per-instance errors are caught and recorded
    /// without aborting the batch"); the retry ledger's host list is
    /// scrubbed between instances so each starts with a fresh try list
    /// (spec.md §4.6 "Scrub the retry ledger...").
    pub async fn run_instance_batch(
        &self,
        request_spec: &RequestSpec,
        filter_properties: &mut FilterProperties,
        instance_uuids: &[InstanceId],
    ) -> Vec<SchedulerResult<WeighedHost>> {
        tracing::info!(event = "scheduler.run_instance.start");

        let mut weighed_hosts = match self.schedule(request_spec, filter_properties, instance_uuids).await {
            Ok(hosts) => hosts,
            Err(error) => {
                tracing::warn!(%error, "scheduling batch failed before any host was picked");
                let results = instance_uuids.iter().map(|_| Err(clone_error(&error))).collect();
                tracing::info!(event = "scheduler.run_instance.end");
                return results;
            }
        };

        let count = if instance_uuids.is_empty() {
            request_spec.num_instances as usize
        } else {
            instance_uuids.len()
        };
        let mut results = Vec::with_capacity(count);

        for _ in 0..count {
            let outcome = if weighed_hosts.is_empty() {
                Err(SchedulerError::NoValidHost {
                    reason: "scheduling pass exhausted before this instance was placed".to_string(),
                })
            } else {
                let picked = weighed_hosts.remove(0);
                filter_properties.record_selection(&picked.obj.host, &picked.obj.node, picked.obj.limits.clone());
                tracing::info!(
                    event = "scheduler.run_instance.scheduled",
                    host = %picked.obj.host,
                    node = %picked.obj.node
                );
                Ok(picked)
            };
            results.push(outcome);
            filter_properties.scrub_retry_hosts();
        }

        tracing::info!(event = "scheduler.run_instance.end");
        results
    }

    /// Build the payload for `scheduler.run_instance.start` /
    /// `.end` (spec.md §6 Notifications). The request spec is serialized
    /// opaquely since its exact shape is an external-API concern.
    pub fn event_payload(request_spec: &RequestSpec) -> SchedulerEvent {
        SchedulerEvent::RunInstanceStart {
            request_spec: serde_json::to_value(request_spec).unwrap_or(serde_json::Value::Null),
        }
    }
}

fn clone_error(error: &SchedulerError) -> SchedulerError {
    match error {
        SchedulerError::NoValidHost { reason } => SchedulerError::NoValidHost {
            reason: reason.clone(),
        },
        SchedulerError::InvalidMaxAttempts(n) => SchedulerError::InvalidMaxAttempts(*n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host_manager::StaticHostSource;
    use crate::request::InstanceProperties;
    use net_core::model::HostState;
    use net_uuid::project::ProjectId;

    fn host(name: &str, ram: i64) -> HostState {
        HostState {
            host: name.to_string(),
            node: format!("{name}-node"),
            free_ram_mb: ram,
            free_disk_gb: 1000,
            vcpus_total: 32,
            vcpus_used: 0,
            limits: Default::default(),
        }
    }

    fn spec(num_instances: u32) -> RequestSpec {
        RequestSpec {
            instance_properties: InstanceProperties {
                uuid: None,
                project_id: ProjectId::new_v4(),
                os_type: None,
                memory_mb: 1024,
                disk_gb: 10,
                vcpus: 1,
            },
            instance_type: None,
            num_instances,
        }
    }

    /// S4: equal-weight hosts spread a batch across the fleet instead of
    /// packing it onto one host, thanks to virtual consumption.
    #[tokio::test]
    async fn batch_spreads_across_hosts_via_virtual_consumption() {
        let hosts = vec![host("a", 4096), host("b", 4096), host("c", 4096)];
        let source = Arc::new(StaticHostSource::new(hosts));
        let scheduler = FilterScheduler::new(source, 3);
        let mut fp = FilterProperties::default();
        let request = spec(3);

        let selected = scheduler.schedule(&request, &mut fp, &[]).await.unwrap();
        let picked: Vec<&str> = selected.iter().map(|w| w.obj.host.as_str()).collect();
        assert_eq!(picked.len(), 3);
        assert_eq!(picked, vec!["a", "b", "c"]);
    }

    /// S5: retry already at the cap is incremented past it and rejected
    /// before any filtering runs.
    #[tokio::test]
    async fn retry_exhaustion_rejects_before_filtering() {
        let source = Arc::new(StaticHostSource::new(vec![host("a", 4096)]));
        let scheduler = FilterScheduler::new(source, 3);
        let mut fp = FilterProperties {
            retry: Some(crate::request::RetryLedger {
                num_attempts: 3,
                hosts: vec![],
            }),
            ..Default::default()
        };
        let request = spec(1);
        let result = scheduler.schedule(&request, &mut fp, &[]).await;
        assert!(matches!(result, Err(SchedulerError::NoValidHost { .. })));
    }

    /// `scheduler_max_attempts == 1` disables retry tracking entirely.
    #[tokio::test]
    async fn max_attempts_one_disables_retry_tracking() {
        let source = Arc::new(StaticHostSource::new(vec![host("a", 4096)]));
        let scheduler = FilterScheduler::new(source, 1);
        let mut fp = FilterProperties::default();
        let request = spec(1);
        scheduler.schedule(&request, &mut fp, &[]).await.unwrap();
        assert!(fp.retry.is_none());
    }

    #[tokio::test]
    async fn run_instance_batch_scrubs_retry_between_instances() {
        let hosts = vec![host("a", 8192), host("b", 8192)];
        let source = Arc::new(StaticHostSource::new(hosts));
        let scheduler = FilterScheduler::new(source, 3);
        let mut fp = FilterProperties {
            retry: Some(crate::request::RetryLedger::default()),
            ..Default::default()
        };
        let request = spec(2);
        let results = scheduler.run_instance_batch(&request, &mut fp, &[]).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_ok()));
        assert!(fp.retry.as_ref().unwrap().hosts.is_empty());
    }

    #[tokio::test]
    async fn partial_batch_when_hosts_run_out() {
        let source = Arc::new(StaticHostSource::new(vec![host("a", 1024)]));
        let scheduler = FilterScheduler::new(source, 3);
        let mut fp = FilterProperties::default();
        let request = spec(3);
        let results = scheduler.run_instance_batch(&request, &mut fp, &[]).await;
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_err());
    }
}
