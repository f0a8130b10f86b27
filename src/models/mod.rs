pub mod config;
pub mod executor;
pub mod job;
pub mod record;

pub use config::StoreConfig;
pub use executor::JobExecutor;
pub use job::{JobGroup, JobInfo, JobScript, JobType};
pub use record::{JobExecuteRecord, JobRecordStatus, RecordPhase};
