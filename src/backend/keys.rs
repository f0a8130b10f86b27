/// Backend key names, all under one namespace prefix.
///
/// These names are shared with workers and other store instances, so they
/// must stay stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keys {
    namespace: String,
}

/// Separator for composite record index keys (`group:job`).
pub const COLON: &str = ":";

impl Keys {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    fn scoped(&self, suffix: &str) -> String {
        format!("{}:{}", self.namespace, suffix)
    }

    pub fn job_info(&self) -> String {
        self.scoped("job:info")
    }

    pub fn job_order(&self) -> String {
        self.scoped("job:order")
    }

    pub fn job_script(&self) -> String {
        self.scoped("job:script")
    }

    pub fn record(&self) -> String {
        self.scoped("record")
    }

    pub fn record_order(&self) -> String {
        self.scoped("record:order")
    }

    pub fn record_status(&self) -> String {
        self.scoped("record:status")
    }

    /// Topic workers subscribe to for discovery queries.
    pub fn worker_register(&self) -> String {
        self.scoped("worker:register")
    }

    /// Counting semaphore for one discovery round.
    pub fn worker_request(&self, correlation_id: &str) -> String {
        self.scoped(&format!("worker:req:{}", correlation_id))
    }

    /// TTL response map for one discovery round.
    pub fn worker_response(&self, correlation_id: &str) -> String {
        self.scoped(&format!("worker:req:{}:val", correlation_id))
    }
}

impl Default for Keys {
    fn default() -> Self {
        Self::new("jobmesh")
    }
}
