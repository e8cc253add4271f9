use thiserror::Error;

/// Unified error type for debug-httpd.
#[derive(Error, Debug)]
pub enum DebugdError {
    #[error("Method Not Allowed")]
    MethodNotAllowed(String),

    #[error("Bad Request")]
    BadRequest(String),

    #[error("Request header too large")]
    HeaderTooLarge,

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Bind failed on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl DebugdError {
    /// Map to HTTP status code.
    pub fn status_code(&self) -> u16 {
        match self {
            DebugdError::MethodNotAllowed(_) => 405,
            DebugdError::BadRequest(_) => 400,
            DebugdError::HeaderTooLarge => 400,
            _ => 500,
        }
    }

    /// JSON error body.
    pub fn to_json_body(&self) -> Vec<u8> {
        serde_json::json!({
            "error": self.to_string(),
            "status": self.status_code(),
        })
        .to_string()
        .into_bytes()
    }
}

impl From<figment::Error> for DebugdError {
    fn from(e: figment::Error) -> Self {
        DebugdError::ConfigError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_not_allowed_maps_to_405() {
        let err = DebugdError::MethodNotAllowed("POST".into());
        assert_eq!(err.status_code(), 405);
        assert_eq!(
            err.to_json_body(),
            br#"{"error":"Method Not Allowed","status":405}"#.to_vec()
        );
    }

    #[test]
    fn bad_request_and_oversized_head_map_to_400() {
        assert_eq!(DebugdError::BadRequest("garbage".into()).status_code(), 400);
        assert_eq!(DebugdError::HeaderTooLarge.status_code(), 400);
    }

    #[test]
    fn other_errors_map_to_500() {
        assert_eq!(DebugdError::ConfigError("x".into()).status_code(), 500);
    }

    #[test]
    fn bind_error_message_names_the_address() {
        let err = DebugdError::Bind {
            addr: "0.0.0.0:80".into(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert!(err.to_string().starts_with("Bind failed on 0.0.0.0:80"));
    }
}
