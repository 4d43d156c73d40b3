//! Domain types shared by the scout service: input tokens, lookup outcomes
//! and date-partitioned discovery records.

pub mod normalizer;
pub mod partition;
pub mod types;

pub use normalizer::{Normalizer, NormalizerError, Token};
pub use partition::{
    group_label, Partition, PartitionCalendar, PartitionError, PartitionKey, DEFAULT_GROUP,
};
pub use types::{CheckResult, CheckState};
