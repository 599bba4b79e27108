//! App error type for gateway operations. Implements Display and Serialize for the boundary.

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("Engine initialization failed: {0}")]
    EngineInit(String),

    #[error("Engine call failed: {0}")]
    EngineCall(String),

    #[error("Engine reported unknown {field} value: {value}")]
    Decode { field: &'static str, value: i64 },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::Internal(s)
    }
}

impl From<&str> for AppError {
    fn from(s: &str) -> Self {
        s.to_string().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_names_field_and_value() {
        let e = AppError::Decode {
            field: "codec type",
            value: 42,
        };
        assert_eq!(e.to_string(), "Engine reported unknown codec type value: 42");
    }

    #[test]
    fn from_str_is_internal() {
        let e: AppError = "boom".into();
        assert!(matches!(e, AppError::Internal(_)));
    }

    #[test]
    fn serializes_to_display_string() {
        let e = AppError::EngineInit("no image".into());
        let json = serde_json::to_string(&e).expect("serialize");
        assert_eq!(json, "\"Engine initialization failed: no image\"");
    }
}
