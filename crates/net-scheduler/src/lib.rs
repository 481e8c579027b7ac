//! The Filter Scheduler core (spec.md §4.6): a stateless placement engine
//! that, given a request spec and a population of host states, repeatedly
//! filters and weighs candidate hosts, virtually consumes resources
//! between picks to avoid oversubscribing a single host with a batch, and
//! enforces a retry budget across re-scheduling.

pub mod error;
pub mod filters;
pub mod host_manager;
pub mod request;
pub mod scheduler;
pub mod weighers;

pub use error::{SchedulerError, SchedulerResult};
pub use filters::HostFilter;
pub use host_manager::{HostSource, StaticHostSource};
pub use request::{FilterProperties, InstanceProperties, InstanceTypeSpec, RequestSpec, RetryLedger};
pub use scheduler::FilterScheduler;
pub use weighers::{HostWeigher, WeighedHost};
