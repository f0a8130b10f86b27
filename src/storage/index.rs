//! Record index keys.
//!
//! A record is listed under several keys of the record-order multimap at
//! once. Nothing makes those inserts atomic, so every path that touches them
//! derives the key set here.

use crate::backend::keys::COLON;
use crate::models::{JobGroup, JobType};
use crate::storage::JobOwnership;

/// Index holding every record.
pub const GLOBAL_INDEX: &str = "";

pub fn group_job_key(group_key: &str, job_key: &str) -> String {
    [group_key, job_key].join(COLON)
}

fn group_of(group: Option<&JobGroup>) -> Option<&JobGroup> {
    group.filter(|g| !g.group_key.is_empty())
}

/// Keys a new record of `job_id` is inserted under.
///
/// Bean jobs get the finer `group:job` index as well; other job types only
/// the group index.
pub fn insert_keys(job_id: &str, owner: &JobOwnership) -> Vec<String> {
    let mut keys = vec![GLOBAL_INDEX.to_string(), job_id.to_string()];
    if let Some(group) = group_of(owner.group.as_ref()) {
        keys.push(group.group_key.clone());
        if owner.job_type == JobType::Bean {
            keys.push(group_job_key(&group.group_key, &group.job_key));
        }
    }
    keys
}

/// Keys to clear a record from on delete, besides its per-job list, when they
/// are re-derived from the job's current group.
pub fn removal_keys(group: Option<&JobGroup>) -> Vec<String> {
    let mut keys = vec![GLOBAL_INDEX.to_string()];
    if let Some(group) = group_of(group) {
        keys.push(group.group_key.clone());
        keys.push(group_job_key(&group.group_key, &group.job_key));
    }
    keys
}

/// Filter for listing and counting records.
///
/// A non-empty `job_id` wins; otherwise the group key, optionally joined with
/// the job key, selects the index. All empty means every record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordQuery {
    pub group_key: Option<String>,
    pub job_key: Option<String>,
    pub job_id: Option<String>,
}

impl RecordQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_job(job_id: impl Into<String>) -> Self {
        Self {
            job_id: Some(job_id.into()),
            ..Self::default()
        }
    }

    pub fn by_group(group_key: impl Into<String>) -> Self {
        Self {
            group_key: Some(group_key.into()),
            ..Self::default()
        }
    }

    pub fn by_group_job(group_key: impl Into<String>, job_key: impl Into<String>) -> Self {
        Self {
            group_key: Some(group_key.into()),
            job_key: Some(job_key.into()),
            job_id: None,
        }
    }

    pub fn index_key(&self) -> String {
        if let Some(job_id) = non_empty(&self.job_id) {
            return job_id.to_string();
        }
        let group_key = non_empty(&self.group_key).unwrap_or(GLOBAL_INDEX);
        match non_empty(&self.job_key) {
            Some(job_key) => group_job_key(group_key, job_key),
            None => group_key.to_string(),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
