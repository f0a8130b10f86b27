pub mod index;
pub mod jobs;
pub mod records;

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::StoreError;
use crate::models::{
    JobExecuteRecord, JobGroup, JobInfo, JobRecordStatus, JobScript, JobType,
};

pub use index::RecordQuery;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Stores a new job and returns its freshly assigned id.
    async fn add_job(&self, job: JobInfo) -> Result<String>;
    async fn update_job(&self, job: JobInfo) -> Result<()>;
    /// Removes the job and its ordering entry. Script history and records are
    /// left for the caller to clean up.
    async fn remove_job(&self, id: &str) -> Result<()>;
    async fn count_job_infos(&self) -> Result<usize>;
    async fn query_all_jobs(&self) -> Result<Vec<JobInfo>>;
    /// Jobs in creation order, sliced to `[from, min(to, len))`.
    async fn query_job_infos(&self, from: usize, to: usize) -> Result<Vec<JobInfo>>;
    async fn find_job_info_by_id(&self, id: &str) -> Result<Option<JobInfo>>;
    async fn add_job_script(&self, script: JobScript) -> Result<JobScript>;
    async fn query_job_scripts(&self, job_id: &str) -> Result<Vec<JobScript>>;
    async fn remove_job_scripts(&self, job_id: &str) -> Result<()>;
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn add_job_record(&self, record: JobExecuteRecord) -> Result<String>;
    async fn count_job_records(&self, query: &RecordQuery) -> Result<usize>;
    async fn query_job_records(
        &self,
        query: &RecordQuery,
        from: usize,
        to: usize,
    ) -> Result<Vec<JobExecuteRecord>>;
    async fn find_job_execute_record_by_id(&self, id: &str) -> Result<Option<JobExecuteRecord>>;
    async fn add_job_record_status(&self, status: JobRecordStatus) -> Result<()>;
    /// Removes every record of `job_id` from all indices, with their statuses.
    /// Returns how many records were removed.
    async fn remove_job_records(&self, job_id: &str) -> Result<usize>;
}

/// What the record store needs to know about a job to maintain its indices.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOwnership {
    pub job_type: JobType,
    pub group: Option<JobGroup>,
}

/// Resolves a job's current type and group.
#[async_trait]
pub trait GroupResolver: Send + Sync {
    async fn resolve_group(&self, job_id: &str) -> Result<Option<JobOwnership>>;
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value).map_err(StoreError::from)?)
}

pub(crate) fn decode<T: DeserializeOwned>(raw: &str) -> Result<T> {
    Ok(serde_json::from_str(raw).map_err(StoreError::from)?)
}
