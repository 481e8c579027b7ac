//! Notification events named in spec.md §6. A concrete dispatch transport is
//! a Non-goal; these types are the payload shape callers publish, logged via
//! `tracing` at the call site until a real bus is wired up.

use std::net::IpAddr;

use net_uuid::instance::InstanceId;
use net_uuid::project::ProjectId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum FloatingIpEvent {
    #[serde(rename = "network.floating_ip.allocate")]
    Allocate {
        project_id: ProjectId,
        floating_ip: IpAddr,
    },
    #[serde(rename = "network.floating_ip.deallocate")]
    Deallocate {
        project_id: ProjectId,
        floating_ip: IpAddr,
    },
    #[serde(rename = "network.floating_ip.associate")]
    Associate {
        project_id: ProjectId,
        instance_id: InstanceId,
        floating_ip: IpAddr,
    },
    #[serde(rename = "network.floating_ip.disassociate")]
    Disassociate {
        project_id: ProjectId,
        instance_id: InstanceId,
        floating_ip: IpAddr,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum SchedulerEvent {
    #[serde(rename = "scheduler.run_instance.start")]
    RunInstanceStart { request_spec: serde_json::Value },
    #[serde(rename = "scheduler.run_instance.scheduled")]
    RunInstanceScheduled {
        request_spec: serde_json::Value,
        host: String,
    },
    #[serde(rename = "scheduler.run_instance.end")]
    RunInstanceEnd { request_spec: serde_json::Value },
}
