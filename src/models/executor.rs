use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A worker that answered a discovery query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobExecutor {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub address: String,
    #[serde(default = "Utc::now")]
    pub reported_at: DateTime<Utc>,
}

impl JobExecutor {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address: address.into(),
            reported_at: Utc::now(),
        }
    }
}
