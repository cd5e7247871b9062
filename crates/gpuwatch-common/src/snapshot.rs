use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::HostResult;

/// Fleet-wide result of one completed cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    /// Cycle number, starting at 1. Zero means nothing has been collected yet.
    pub cycle: u64,
    pub collected_at: DateTime<Utc>,

    #[serde(default)]
    pub hosts: Vec<HostResult>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            cycle: 0,
            collected_at: DateTime::<Utc>::default(),
            hosts: Vec::new(),
        }
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}
