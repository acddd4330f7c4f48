use lessor_core::error::DomainError;
use lessor_shared::ApiResponse;

/// Boundary error: request validation failures plus everything the domain
/// rejects. Converted into the uniform envelope - the success flag is
/// always accurate, with a machine-checkable code and a human message.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl ApiError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    pub fn code(&self) -> String {
        match self {
            ApiError::Validation(_) => "validation_error".to_string(),
            ApiError::Domain(err) => err.code(),
        }
    }

    pub fn into_response<T>(self) -> ApiResponse<T> {
        if let ApiError::Domain(DomainError::Store(ref msg)) = self {
            tracing::error!(error = %msg, "store failure surfaced to caller");
        }
        ApiResponse::failure(self.code(), self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_error_keeps_condition_code() {
        let err: ApiError = DomainError::precondition("deposit_already_refunded").into();
        let resp: ApiResponse<()> = err.into_response();
        assert!(!resp.success);
        assert_eq!(resp.error.as_deref(), Some("precondition:deposit_already_refunded"));
    }

    #[test]
    fn test_validation_error_code() {
        let resp: ApiResponse<()> = ApiError::validation("rental_id or rental_batch_id required").into_response();
        assert_eq!(resp.error.as_deref(), Some("validation_error"));
        assert!(resp.message.unwrap().contains("rental_id"));
    }
}
