use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::StoreError;

/// How a job is executed. Drives both script history and record indexing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    Script,
    Bean,
}

/// Group coordinates of a job, used to derive secondary record indices.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobGroup {
    pub group_key: String,
    pub job_key: String,
}

impl JobGroup {
    pub fn new(group_key: impl Into<String>, job_key: impl Into<String>) -> Self {
        Self {
            group_key: group_key.into(),
            job_key: job_key.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub job_type: JobType,
    #[serde(default)]
    pub group: Option<JobGroup>,
    #[serde(default)]
    pub cron: Option<String>,
    #[serde(default)]
    pub param: Option<String>,
    #[serde(default)]
    pub bean_name: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Latest script body. Lives only in the script history; never persisted
    /// with the job and filled in on read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
}

impl JobInfo {
    /// A script job with the given body.
    pub fn script(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            job_type: JobType::Script,
            group: None,
            cron: None,
            param: None,
            bean_name: None,
            created_at: Utc::now(),
            script: Some(body.into()),
        }
    }

    /// A bean job dispatched to a named handler on the worker.
    pub fn bean(name: impl Into<String>, bean_name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            job_type: JobType::Bean,
            group: None,
            cron: None,
            param: None,
            bean_name: Some(bean_name.into()),
            created_at: Utc::now(),
            script: None,
        }
    }

    pub fn with_group(mut self, group: JobGroup) -> Self {
        self.group = Some(group);
        self
    }

    /// Copy of this job as it is written to the metadata map.
    pub(crate) fn stripped(&self) -> Self {
        Self {
            script: None,
            ..self.clone()
        }
    }
}

/// One revision of a script job's body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobScript {
    #[serde(default)]
    pub id: String,
    pub job_id: String,
    pub script: String,
    #[serde(default = "Utc::now")]
    pub time: DateTime<Utc>,
    #[serde(default = "default_version")]
    pub version: String,
}

pub const DEFAULT_SCRIPT_VERSION: &str = "default";

fn default_version() -> String {
    DEFAULT_SCRIPT_VERSION.to_string()
}

impl JobScript {
    pub fn new(
        job_id: impl Into<String>,
        script: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            job_id: job_id.into(),
            script: script.into(),
            time: Utc::now(),
            version: version.into(),
        }
    }
}

/// Reject ids that cannot address a backend entry.
pub fn validate_job_id(id: &str) -> Result<(), StoreError> {
    if id.trim().is_empty() {
        return Err(StoreError::Validation("Job id cannot be empty".to_string()));
    }
    Ok(())
}
