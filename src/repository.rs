use std::sync::Arc;

use crate::backend::Backend;
use crate::discovery::ExecutorDiscovery;
use crate::models::StoreConfig;
use crate::storage::jobs::BackendJobStore;
use crate::storage::records::BackendRecordStore;
use crate::storage::{JobStore, RecordStore};

/// The three services wired against one backend and config.
///
/// The record store resolves groups through the job store.
pub struct JobRepository {
    pub jobs: Arc<dyn JobStore>,
    pub records: Arc<dyn RecordStore>,
    pub discovery: ExecutorDiscovery,
}

impl JobRepository {
    pub fn new(backend: Arc<dyn Backend>, config: &StoreConfig) -> Self {
        let jobs = Arc::new(BackendJobStore::new(Arc::clone(&backend), config));
        let records = BackendRecordStore::new(Arc::clone(&backend), jobs.clone(), config);
        Self {
            jobs,
            records: Arc::new(records),
            discovery: ExecutorDiscovery::new(backend, config),
        }
    }
}
