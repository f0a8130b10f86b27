//! End-to-end store tests.
//!
//! These wire the job store, record store and discovery against one
//! in-memory backend, the way an embedding scheduler would.

use std::sync::Arc;

use job_mesh_store::backend::{Backend, MemoryBackend};
use job_mesh_store::logging::init_tracing;
use job_mesh_store::models::{
    JobExecuteRecord, JobGroup, JobInfo, JobRecordStatus, JobScript, JobType, RecordPhase,
    StoreConfig,
};
use job_mesh_store::storage::RecordQuery;
use job_mesh_store::JobRepository;

fn setup() -> (JobRepository, Arc<MemoryBackend>) {
    init_tracing(false);
    let backend = Arc::new(MemoryBackend::new());
    let repo = JobRepository::new(backend.clone(), &StoreConfig::default());
    (repo, backend)
}

#[tokio::test]
async fn test_end_to_end_job_record_status() {
    let (repo, _backend) = setup();

    let job_id = repo
        .jobs
        .add_job(JobInfo::script("greeter", "echo hi"))
        .await
        .expect("add job");
    let job = repo
        .jobs
        .find_job_info_by_id(&job_id)
        .await
        .expect("find job")
        .expect("job exists");
    assert_eq!(job.script.as_deref(), Some("echo hi"));

    let record_id = repo
        .records
        .add_job_record(JobExecuteRecord::new(&job_id))
        .await
        .expect("add record");
    let record = repo
        .records
        .find_job_execute_record_by_id(&record_id)
        .await
        .expect("find record")
        .expect("record exists");
    assert!(record.record_statuses.is_empty());

    repo.records
        .add_job_record_status(JobRecordStatus::new(&record_id, RecordPhase::Done))
        .await
        .expect("add status");

    let record = repo
        .records
        .find_job_execute_record_by_id(&record_id)
        .await
        .expect("find record")
        .expect("record exists");
    assert_eq!(record.record_statuses.len(), 1);
    assert_eq!(record.phase, Some(RecordPhase::Done));
}

#[tokio::test]
async fn test_bean_and_script_index_asymmetry() {
    let (repo, _backend) = setup();

    let bean = repo
        .jobs
        .add_job(JobInfo::bean("bean", "handler").with_group(JobGroup::new("g", "j")))
        .await
        .expect("add bean");
    let script = repo
        .jobs
        .add_job(JobInfo::script("script", "echo").with_group(JobGroup::new("g", "j")))
        .await
        .expect("add script");

    repo.records
        .add_job_record(JobExecuteRecord::new(&bean))
        .await
        .expect("bean record");
    repo.records
        .add_job_record(JobExecuteRecord::new(&script))
        .await
        .expect("script record");

    let count = |query: RecordQuery| {
        let records = Arc::clone(&repo.records);
        async move { records.count_job_records(&query).await.expect("count") }
    };

    assert_eq!(count(RecordQuery::all()).await, 2);
    assert_eq!(count(RecordQuery::by_job(&bean)).await, 1);
    assert_eq!(count(RecordQuery::by_job(&script)).await, 1);
    assert_eq!(count(RecordQuery::by_group("g")).await, 2);
    assert_eq!(count(RecordQuery::by_group_job("g", "j")).await, 1);
}

#[tokio::test]
async fn test_job_removal_then_record_cleanup() {
    let (repo, _backend) = setup();

    let job_id = repo
        .jobs
        .add_job(JobInfo::bean("bean", "handler").with_group(JobGroup::new("g", "j")))
        .await
        .expect("add job");
    for _ in 0..3 {
        repo.records
            .add_job_record(JobExecuteRecord::new(&job_id))
            .await
            .expect("add record");
    }

    // Cleanup while the job still exists clears every index.
    let removed = repo
        .records
        .remove_job_records(&job_id)
        .await
        .expect("remove records");
    assert_eq!(removed, 3);
    repo.jobs.remove_job(&job_id).await.expect("remove job");

    for query in [
        RecordQuery::all(),
        RecordQuery::by_job(&job_id),
        RecordQuery::by_group("g"),
        RecordQuery::by_group_job("g", "j"),
    ] {
        assert_eq!(
            repo.records.count_job_records(&query).await.expect("count"),
            0
        );
    }
    assert_eq!(repo.jobs.count_job_infos().await.expect("count"), 0);
}

#[tokio::test]
async fn test_record_for_removed_job_is_not_found() {
    let (repo, _backend) = setup();
    let job_id = repo
        .jobs
        .add_job(JobInfo::bean("bean", "handler"))
        .await
        .expect("add job");
    repo.jobs.remove_job(&job_id).await.expect("remove job");

    let err = repo
        .records
        .add_job_record(JobExecuteRecord::new(&job_id))
        .await
        .unwrap_err();
    assert!(job_mesh_store::errors::is_not_found(&err));
}

#[tokio::test]
async fn test_script_history_window_through_repository() {
    let (repo, _backend) = setup();
    let job_id = repo
        .jobs
        .add_job(JobInfo::script("s", "echo 0"))
        .await
        .expect("add job");
    for i in 1..=22 {
        repo.jobs
            .add_job_script(JobScript::new(&job_id, format!("echo {}", i), format!("v{}", i)))
            .await
            .expect("add script");
    }

    let scripts = repo.jobs.query_job_scripts(&job_id).await.expect("scripts");
    assert_eq!(scripts.len(), 20);
    assert_eq!(scripts.first().map(|s| s.script.as_str()), Some("echo 3"));
    assert_eq!(scripts.last().map(|s| s.script.as_str()), Some("echo 22"));

    let job = repo
        .jobs
        .find_job_info_by_id(&job_id)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(job.script.as_deref(), Some("echo 22"));
    assert_eq!(job.job_type, JobType::Script);
}

#[tokio::test]
async fn test_backend_outage_surfaces_as_error() {
    let (repo, backend) = setup();
    let job_id = repo
        .jobs
        .add_job(JobInfo::bean("bean", "handler"))
        .await
        .expect("add job");

    backend.set_available(false);
    assert!(repo.jobs.find_job_info_by_id(&job_id).await.is_err());
    assert!(repo
        .records
        .add_job_record(JobExecuteRecord::new(&job_id))
        .await
        .is_err());
    assert!(repo.discovery.count_executors().await.is_err());

    backend.set_available(true);
    assert!(repo
        .jobs
        .find_job_info_by_id(&job_id)
        .await
        .expect("find")
        .is_some());
    assert_eq!(
        backend
            .map_size("jobmesh:record")
            .await
            .expect("size"),
        0
    );
}
