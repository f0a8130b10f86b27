use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle phase reported for an execution record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecordPhase {
    Dispatched,
    Started,
    Progress,
    Done,
    Failed,
}

impl RecordPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RecordPhase::Done | RecordPhase::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobExecuteRecord {
    #[serde(default)]
    pub id: String,
    pub job_id: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub phase: Option<RecordPhase>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Index keys captured at insert time. Only written when index snapshots
    /// are enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_keys: Option<Vec<String>>,
    /// Status timeline, attached on read.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub record_statuses: Vec<JobRecordStatus>,
}

impl JobExecuteRecord {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            job_id: job_id.into(),
            created_at: Utc::now(),
            phase: None,
            message: None,
            started_at: None,
            finished_at: None,
            updated_at: None,
            index_keys: None,
            record_statuses: Vec::new(),
        }
    }

    pub(crate) fn stripped(&self) -> Self {
        Self {
            record_statuses: Vec::new(),
            ..self.clone()
        }
    }
}

/// One event on a record's timeline, keyed by `logger_id` (the record id).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobRecordStatus {
    pub logger_id: String,
    pub phase: RecordPhase,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default = "Utc::now")]
    pub time: DateTime<Utc>,
}

impl JobRecordStatus {
    pub fn new(logger_id: impl Into<String>, phase: RecordPhase) -> Self {
        Self {
            logger_id: logger_id.into(),
            phase,
            message: None,
            time: Utc::now(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Copy this event's summary onto `record`.
    pub fn fill(&self, record: &mut JobExecuteRecord) {
        record.phase = Some(self.phase);
        record.updated_at = Some(self.time);
        if let Some(ref message) = self.message {
            record.message = Some(message.clone());
        }
        match self.phase {
            RecordPhase::Started => record.started_at = Some(self.time),
            phase if phase.is_terminal() => record.finished_at = Some(self.time),
            _ => {}
        }
    }
}
