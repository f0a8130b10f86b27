use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<std::num::TryFromIntError> for StoreError {
    fn from(err: std::num::TryFromIntError) -> Self {
        StoreError::Validation(err.to_string())
    }
}

/// Returns true when `err` carries a `StoreError::NotFound`.
pub fn is_not_found(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<StoreError>(), Some(StoreError::NotFound(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = StoreError::NotFound("job xyz".to_string());
        assert_eq!(err.to_string(), "Not found: job xyz");
    }

    #[test]
    fn test_validation_display() {
        let err = StoreError::Validation("empty job id".to_string());
        assert_eq!(err.to_string(), "Validation error: empty job id");
    }

    #[test]
    fn test_backend_display() {
        let err = StoreError::Backend("connection refused".to_string());
        assert_eq!(err.to_string(), "Backend error: connection refused");
    }

    #[test]
    fn test_serialization_display() {
        let err = StoreError::Serialization("trailing comma".to_string());
        assert_eq!(err.to_string(), "Serialization error: trailing comma");
    }

    #[test]
    fn test_internal_display() {
        let err = StoreError::Internal("unexpected".to_string());
        assert_eq!(err.to_string(), "Internal error: unexpected");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<String>("not valid json").unwrap_err();
        let store_err: StoreError = json_err.into();
        match store_err {
            StoreError::Serialization(_) => {}
            other => panic!("Expected Serialization, got: {:?}", other),
        }
    }

    #[test]
    fn test_from_try_from_int_error() {
        let int_err = u32::try_from(u64::MAX).unwrap_err();
        let store_err: StoreError = int_err.into();
        match store_err {
            StoreError::Validation(_) => {}
            other => panic!("Expected Validation, got: {:?}", other),
        }
    }

    #[test]
    fn test_is_not_found_through_anyhow() {
        let err: anyhow::Error = StoreError::NotFound("record r1".to_string()).into();
        assert!(is_not_found(&err));

        let err: anyhow::Error = StoreError::Backend("down".to_string()).into();
        assert!(!is_not_found(&err));

        let err = anyhow::anyhow!("plain");
        assert!(!is_not_found(&err));
    }
}
