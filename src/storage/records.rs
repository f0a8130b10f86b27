use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use uuid::Uuid;

use crate::backend::{Backend, Keys};
use crate::errors::StoreError;
use crate::models::job::validate_job_id;
use crate::models::{JobExecuteRecord, JobRecordStatus, StoreConfig};
use crate::storage::index::{self, RecordQuery};
use crate::storage::{decode, encode, GroupResolver, RecordStore};

/// Execution records, their status timelines and the record-order indices.
pub struct BackendRecordStore {
    backend: Arc<dyn Backend>,
    keys: Keys,
    resolver: Arc<dyn GroupResolver>,
    snapshot_index_keys: bool,
}

impl BackendRecordStore {
    pub fn new(
        backend: Arc<dyn Backend>,
        resolver: Arc<dyn GroupResolver>,
        config: &StoreConfig,
    ) -> Self {
        Self {
            backend,
            keys: Keys::new(config.namespace.clone()),
            resolver,
            snapshot_index_keys: config.snapshot_index_keys,
        }
    }

    async fn read_record(&self, id: &str) -> Result<Option<JobExecuteRecord>> {
        let raw = self.backend.map_get(&self.keys.record(), id).await?;
        raw.map(|raw| {
            decode::<JobExecuteRecord>(&raw)
                .with_context(|| format!("Failed to decode record '{}'", id))
        })
        .transpose()
    }

    async fn read_statuses(&self, id: &str) -> Result<Vec<JobRecordStatus>> {
        let values = self
            .backend
            .multimap_get_all(&self.keys.record_status(), id)
            .await?;
        values
            .iter()
            .map(|raw| decode::<JobRecordStatus>(raw).context("Failed to decode record status"))
            .collect()
    }

    /// Index keys to clear `id` from, other than its per-job list.
    async fn keys_to_clear(
        &self,
        job_id: &str,
        id: &str,
        derived: &[String],
    ) -> Result<Vec<String>> {
        if self.snapshot_index_keys {
            if let Some(keys) = self.read_record(id).await?.and_then(|r| r.index_keys) {
                return Ok(keys.into_iter().filter(|k| k != job_id).collect());
            }
        }
        Ok(derived.to_vec())
    }
}

#[async_trait]
impl RecordStore for BackendRecordStore {
    async fn add_job_record(&self, mut record: JobExecuteRecord) -> Result<String> {
        validate_job_id(&record.job_id)?;
        if record.id.is_empty() {
            record.id = Uuid::now_v7().to_string();
        }

        let owner = self
            .resolver
            .resolve_group(&record.job_id)
            .await?
            .ok_or_else(|| {
                StoreError::NotFound(format!("Job with id '{}' not found", record.job_id))
            })?;
        let index_keys = index::insert_keys(&record.job_id, &owner);

        let mut stored = record.stripped();
        stored.index_keys = if self.snapshot_index_keys {
            Some(index_keys.clone())
        } else {
            None
        };
        self.backend
            .map_put(&self.keys.record(), &record.id, encode(&stored)?)
            .await
            .context("Failed to store record")?;

        let order = self.keys.record_order();
        for key in &index_keys {
            self.backend
                .multimap_put_unique(&order, key, record.id.clone())
                .await
                .with_context(|| format!("Failed to index record under '{}'", key))?;
        }

        tracing::debug!(
            "Added record {} for job {} under {} indices",
            record.id,
            record.job_id,
            index_keys.len()
        );
        Ok(record.id)
    }

    async fn count_job_records(&self, query: &RecordQuery) -> Result<usize> {
        self.backend
            .multimap_len(&self.keys.record_order(), &query.index_key())
            .await
    }

    async fn query_job_records(
        &self,
        query: &RecordQuery,
        from: usize,
        to: usize,
    ) -> Result<Vec<JobExecuteRecord>> {
        let ids = self
            .backend
            .multimap_range(&self.keys.record_order(), &query.index_key(), from, to)
            .await?;
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            match self.find_job_execute_record_by_id(&id).await? {
                Some(record) => records.push(record),
                None => tracing::warn!("Record {} is indexed but not stored", id),
            }
        }
        Ok(records)
    }

    async fn find_job_execute_record_by_id(&self, id: &str) -> Result<Option<JobExecuteRecord>> {
        let Some(mut record) = self.read_record(id).await? else {
            return Ok(None);
        };
        let statuses = self.read_statuses(id).await?;
        for status in &statuses {
            status.fill(&mut record);
        }
        record.record_statuses = statuses;
        Ok(Some(record))
    }

    async fn add_job_record_status(&self, status: JobRecordStatus) -> Result<()> {
        if status.logger_id.is_empty() {
            return Err(
                StoreError::Validation("Record status needs a logger id".to_string()).into(),
            );
        }
        self.backend
            .multimap_put(&self.keys.record_status(), &status.logger_id, encode(&status)?)
            .await
            .context("Failed to append record status")
    }

    async fn remove_job_records(&self, job_id: &str) -> Result<usize> {
        let order = self.keys.record_order();
        let ids = self.backend.multimap_remove_all(&order, job_id).await?;
        if ids.is_empty() {
            return Ok(0);
        }

        let group = match self.resolver.resolve_group(job_id).await? {
            Some(owner) => owner.group,
            None => {
                tracing::warn!(
                    "Job {} no longer exists, its group indices are not cleaned up",
                    job_id
                );
                None
            }
        };
        let derived = index::removal_keys(group.as_ref());

        for id in &ids {
            for key in self.keys_to_clear(job_id, id, &derived).await? {
                self.backend.multimap_remove_value(&order, &key, id).await?;
            }
            self.backend
                .multimap_remove_all(&self.keys.record_status(), id)
                .await?;
            self.backend.map_remove(&self.keys.record(), id).await?;
        }

        tracing::debug!("Removed {} records of job {}", ids.len(), job_id);
        Ok(ids.len())
    }
}
