use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::backend::{Backend, Keys};
use crate::errors::StoreError;
use crate::models::job::{validate_job_id, DEFAULT_SCRIPT_VERSION};
use crate::models::{JobInfo, JobScript, JobType, StoreConfig};
use crate::storage::{decode, encode, GroupResolver, JobOwnership, JobStore};

/// Job metadata and script history kept in the shared backend.
pub struct BackendJobStore {
    backend: Arc<dyn Backend>,
    keys: Keys,
    script_history_limit: usize,
}

impl BackendJobStore {
    pub fn new(backend: Arc<dyn Backend>, config: &StoreConfig) -> Self {
        Self {
            backend,
            keys: Keys::new(config.namespace.clone()),
            script_history_limit: config.script_history_limit,
        }
    }

    /// The job as stored, without its script.
    async fn read_job(&self, id: &str) -> Result<Option<JobInfo>> {
        let raw = self.backend.map_get(&self.keys.job_info(), id).await?;
        raw.map(|raw| {
            decode::<JobInfo>(&raw).with_context(|| format!("Failed to decode job '{}'", id))
        })
        .transpose()
    }

    async fn write_job(&self, job: &JobInfo) -> Result<()> {
        self.backend
            .map_put(&self.keys.job_info(), &job.id, encode(&job.stripped())?)
            .await
            .context("Failed to store job")
    }

    async fn latest_script(&self, job_id: &str) -> Result<Option<JobScript>> {
        let key = self.keys.job_script();
        let len = self.backend.multimap_len(&key, job_id).await?;
        if len == 0 {
            return Ok(None);
        }
        let last = self.backend.multimap_range(&key, job_id, len - 1, len).await?;
        last.first()
            .map(|raw| decode::<JobScript>(raw).context("Failed to decode job script"))
            .transpose()
    }

    /// Replaces the whole history of `job_id` with a single default entry.
    async fn reset_history(&self, job_id: &str, body: &str) -> Result<()> {
        let key = self.keys.job_script();
        self.backend.multimap_remove_all(&key, job_id).await?;
        let script = fresh_script(JobScript::new(job_id, body, DEFAULT_SCRIPT_VERSION));
        self.backend
            .multimap_put(&key, job_id, encode(&script)?)
            .await
    }
}

fn fresh_script(mut script: JobScript) -> JobScript {
    script.id = Uuid::now_v7().to_string();
    script.time = Utc::now();
    script
}

#[async_trait]
impl JobStore for BackendJobStore {
    async fn add_job(&self, mut job: JobInfo) -> Result<String> {
        job.id = Uuid::now_v7().to_string();

        self.backend
            .list_push(&self.keys.job_order(), job.id.clone())
            .await
            .context("Failed to append job to ordering list")?;

        if job.job_type == JobType::Script {
            if let Some(ref body) = job.script {
                let script = fresh_script(JobScript::new(&job.id, body, DEFAULT_SCRIPT_VERSION));
                self.backend
                    .multimap_put(&self.keys.job_script(), &job.id, encode(&script)?)
                    .await
                    .context("Failed to store initial job script")?;
            }
        }

        self.write_job(&job).await?;
        tracing::debug!("Added job {} ({:?})", job.id, job.job_type);
        Ok(job.id)
    }

    async fn update_job(&self, job: JobInfo) -> Result<()> {
        validate_job_id(&job.id)?;

        let local = self
            .read_job(&job.id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Job with id '{}' not found", job.id)))?;

        match job.job_type {
            JobType::Script => {
                if let Some(ref body) = job.script {
                    // History only restarts when the job turns into a script job.
                    if local.job_type != JobType::Script {
                        self.reset_history(&job.id, body).await?;
                    } else {
                        tracing::debug!(
                            "Job {} already a script job, script history unchanged",
                            job.id
                        );
                    }
                }
            }
            JobType::Bean => {
                self.backend
                    .multimap_remove_all(&self.keys.job_script(), &job.id)
                    .await
                    .context("Failed to clear script history")?;
            }
        }

        self.write_job(&job).await?;
        tracing::debug!("Updated job {}", job.id);
        Ok(())
    }

    async fn remove_job(&self, id: &str) -> Result<()> {
        let removed = self.backend.map_remove(&self.keys.job_info(), id).await?;
        self.backend.list_remove(&self.keys.job_order(), id).await?;
        if removed.is_none() {
            tracing::debug!("Remove of unknown job {}", id);
        }
        Ok(())
    }

    async fn count_job_infos(&self) -> Result<usize> {
        self.backend.map_size(&self.keys.job_info()).await
    }

    async fn query_all_jobs(&self) -> Result<Vec<JobInfo>> {
        let values = self.backend.map_values(&self.keys.job_info()).await?;
        values
            .iter()
            .map(|raw| decode::<JobInfo>(raw).context("Failed to decode job"))
            .collect()
    }

    async fn query_job_infos(&self, from: usize, to: usize) -> Result<Vec<JobInfo>> {
        let ids = self
            .backend
            .list_range(&self.keys.job_order(), from, to)
            .await?;
        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            match self.read_job(&id).await? {
                Some(job) => jobs.push(job),
                // Ordering entry written but metadata not (yet) present.
                None => tracing::warn!("Job {} is in the ordering list but has no metadata", id),
            }
        }
        Ok(jobs)
    }

    async fn find_job_info_by_id(&self, id: &str) -> Result<Option<JobInfo>> {
        let Some(mut job) = self.read_job(id).await? else {
            return Ok(None);
        };
        if let Some(script) = self.latest_script(id).await? {
            job.script = Some(script.script);
        }
        Ok(Some(job))
    }

    async fn add_job_script(&self, script: JobScript) -> Result<JobScript> {
        validate_job_id(&script.job_id)?;
        let script = fresh_script(script);
        let key = self.keys.job_script();

        self.backend
            .multimap_put(&key, &script.job_id, encode(&script)?)
            .await
            .context("Failed to append job script")?;

        if self.backend.multimap_len(&key, &script.job_id).await? > self.script_history_limit {
            self.backend
                .multimap_remove_first(&key, &script.job_id)
                .await
                .context("Failed to evict oldest job script")?;
        }
        Ok(script)
    }

    async fn query_job_scripts(&self, job_id: &str) -> Result<Vec<JobScript>> {
        let values = self
            .backend
            .multimap_get_all(&self.keys.job_script(), job_id)
            .await?;
        values
            .iter()
            .map(|raw| decode::<JobScript>(raw).context("Failed to decode job script"))
            .collect()
    }

    async fn remove_job_scripts(&self, job_id: &str) -> Result<()> {
        self.backend
            .multimap_remove_all(&self.keys.job_script(), job_id)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl GroupResolver for BackendJobStore {
    async fn resolve_group(&self, job_id: &str) -> Result<Option<JobOwnership>> {
        Ok(self.read_job(job_id).await?.map(|job| JobOwnership {
            job_type: job.job_type,
            group: job.group,
        }))
    }
}
