use serde::{Deserialize, Serialize};

/// Uniform response envelope returned by every operation.
///
/// `success` is authoritative: callers must never infer the outcome from
/// anything else. Non-fatal problems (a failed audit-log append, a payment
/// with no matching billing cycle) ride along in `warnings` on a successful
/// response instead of being promoted to errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Machine-checkable error code, e.g. `precondition:deposit_already_refunded`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Human-readable description of the outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
            warnings: Vec::new(),
        }
    }

    pub fn ok_with_warnings(data: T, warnings: Vec<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
            warnings,
        }
    }

    pub fn failure(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            message: Some(message.into()),
            warnings: Vec::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_envelope_shape() {
        let resp = ApiResponse::ok(42);
        assert!(resp.success);
        assert_eq!(resp.data, Some(42));
        assert!(resp.error.is_none());

        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], true);
        assert!(json.get("error").is_none());
        assert!(json.get("warnings").is_none());
    }

    #[test]
    fn test_failure_envelope_shape() {
        let resp: ApiResponse<()> = ApiResponse::failure("not_found:order", "order does not exist");
        assert!(!resp.success);
        assert!(resp.data.is_none());

        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["error"], "not_found:order");
    }

    #[test]
    fn test_warnings_are_serialized_when_present() {
        let resp = ApiResponse::ok_with_warnings(1, vec!["event_log_write_failed:monthly_payment".into()]);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["warnings"][0], "event_log_write_failed:monthly_payment");
    }
}
