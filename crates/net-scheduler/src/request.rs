//! The request/filter-properties shapes the scheduler threads through one
//! placement pass (spec.md §4.6 steps 1-2). Nova passes these as untyped
//! dicts mutated in place; here they're plain structs so filters and
//! weighers see a typed view instead of string-keyed lookups.

use net_uuid::instance::InstanceId;
use net_uuid::project::ProjectId;
use serde::{Deserialize, Serialize};

/// The resource shape of the instance(s) being placed, copied from the
/// compute API's request (spec.md §3 "HostState", §4.6 step 2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceProperties {
    pub uuid: Option<InstanceId>,
    pub project_id: ProjectId,
    pub os_type: Option<String>,
    pub memory_mb: i64,
    pub disk_gb: i64,
    pub vcpus: i32,
}

/// One instance-placement request. `num_instances` is used when the caller
/// doesn't supply a concrete list of instance uuids (spec.md §4.6 step 3:
/// "`N = len(instance_uuids)` or `request_spec.num_instances`").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSpec {
    pub instance_properties: InstanceProperties,
    pub instance_type: Option<InstanceTypeSpec>,
    pub num_instances: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceTypeSpec {
    pub name: String,
    pub memory_mb: i64,
    pub disk_gb: i64,
    pub vcpus: i32,
}

/// The retry ledger named in spec.md §4.6 step 1 and the GLOSSARY: carried
/// in `filter_properties['retry']`, bounds re-scheduling attempts and
/// excludes previously-tried hosts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryLedger {
    pub num_attempts: u32,
    pub hosts: Vec<(String, String)>,
}

/// Oversubscription limits attached after a successful pick (spec.md §4.6
/// "after selection... attach the host's `limits`").
pub type Limits = net_core::model::HostLimits;

/// Everything threaded through one scheduling pass: the retry ledger,
/// copied request context, and the limits attached to the last pick
/// (spec.md §4.6 steps 1-2, "after selection").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterProperties {
    pub retry: Option<RetryLedger>,
    pub project_id: Option<ProjectId>,
    pub os_type: Option<String>,
    pub limits: Option<Limits>,
}

impl FilterProperties {
    /// Step 1: enforce the retry budget. Increments `num_attempts` and
    /// raises `NoValidHost` once it exceeds `scheduler_max_attempts`. When
    /// `max_attempts == 1`, retry tracking is disabled entirely and the
    /// ledger is never recorded (spec.md §4.6 step 1, §8 boundary
    /// scenario "`scheduler_max_attempts = 1` ⇒ retry dict never
    /// recorded").
    pub fn populate_retry(
        &mut self,
        max_attempts: u32,
        instance_uuid: Option<InstanceId>,
    ) -> Result<(), crate::error::SchedulerError> {
        let previous = self.retry.take();

        if max_attempts == 1 {
            return Ok(());
        }

        let mut ledger = previous.unwrap_or_default();
        ledger.num_attempts += 1;

        if ledger.num_attempts > max_attempts {
            return Err(crate::error::SchedulerError::NoValidHost {
                reason: format!(
                    "exceeded max scheduling attempts {max_attempts} for instance {}",
                    instance_uuid
                        .map(|u| u.to_string())
                        .unwrap_or_else(|| "<unknown>".to_string())
                ),
            });
        }

        self.retry = Some(ledger);
        Ok(())
    }

    /// Step 2: copy `project_id` and `os_type` from the instance properties
    /// into the filter properties (spec.md §4.6 step 2).
    pub fn populate_from_request(&mut self, spec: &RequestSpec) {
        self.project_id = Some(spec.instance_properties.project_id);
        self.os_type = spec.instance_properties.os_type.clone();
    }

    /// After a successful pick: append `(host, node)` to the retry ledger
    /// and attach the host's limits for oversubscription policy (spec.md
    /// §4.6 "after selection...").
    pub fn record_selection(&mut self, host: &str, node: &str, limits: Limits) {
        if let Some(retry) = self.retry.as_mut() {
            retry.hosts.push((host.to_string(), node.to_string()));
        }
        self.limits = Some(limits);
    }

    /// Between instances in one batch: reset the retry ledger's host list
    /// so each instance starts with a fresh try list (spec.md §4.6 "Scrub
    /// the retry ledger... between instances in one batch").
    pub fn scrub_retry_hosts(&mut self) {
        if let Some(retry) = self.retry.as_mut() {
            retry.hosts.clear();
        }
    }
}
