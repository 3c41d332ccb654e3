use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Outcome taxonomy carried in every result envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Ok,
    TechError,
    NotAuthorized,
    MissingAttr,
    InvalidAttr,
    ExecTimeout,
    NotAvailable,
}

impl Status {
    /// Stable numeric code for gateways that report numbers, not names.
    pub fn code(self) -> u16 {
        match self {
            Self::Ok => 0,
            Self::TechError => 1,
            Self::NotAuthorized => 5,
            Self::MissingAttr => 6,
            Self::InvalidAttr => 7,
            Self::ExecTimeout => 8,
            Self::NotAvailable => 9,
        }
    }
}

/// Classified execution failure; every variant maps onto one non-OK status.
#[derive(Debug, Clone, Error)]
pub enum ExecError {
    #[error("missing attribute {0}")]
    MissingAttr(String),
    #[error("invalid attribute {0}: {1}")]
    InvalidAttr(String, String),
    #[error("not authorized: {0}")]
    NotAuthorized(String),
    #[error("not available: {0}")]
    NotAvailable(String),
    #[error("execution timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("technical error: {0}")]
    Tech(String),
}

impl ExecError {
    pub fn status(&self) -> Status {
        match self {
            Self::MissingAttr(_) => Status::MissingAttr,
            Self::InvalidAttr(..) => Status::InvalidAttr,
            Self::NotAuthorized(_) => Status::NotAuthorized,
            Self::NotAvailable(_) => Status::NotAvailable,
            Self::Timeout(_) => Status::ExecTimeout,
            Self::Tech(_) => Status::TechError,
        }
    }
}

fn default_transient() -> bool {
    true
}

/// Inbound command submitted by a client session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEnvelope {
    /// Handler name, matched case-insensitively.
    pub cmd: String,
    /// Declared sender; must agree with the transport-asserted origin.
    #[serde(default)]
    pub sender: Option<String>,
    /// Correlation id; generated when absent.
    #[serde(default)]
    pub reqid: Option<String>,
    #[serde(default)]
    pub params: Value,
    /// Transient commands skip the audit collections.
    #[serde(default = "default_transient")]
    pub transient: bool,
}

impl CommandEnvelope {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            sender: None,
            reqid: None,
            params: Value::Null,
            transient: true,
        }
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn with_reqid(mut self, reqid: impl Into<String>) -> Self {
        self.reqid = Some(reqid.into());
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    pub fn durable(mut self) -> Self {
        self.transient = false;
        self
    }
}

/// Correlated outcome of a command; exactly one per received envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub cmd: String,
    pub reqid: String,
    pub status: Status,
    #[serde(default)]
    pub result: Value,
}

impl ResultEnvelope {
    pub fn ok(cmd: &str, reqid: &str, result: Value) -> Self {
        Self {
            cmd: cmd.to_string(),
            reqid: reqid.to_string(),
            status: Status::Ok,
            result,
        }
    }

    pub fn error(cmd: &str, reqid: &str, status: Status, diagnostic: impl Into<String>) -> Self {
        Self {
            cmd: cmd.to_string(),
            reqid: reqid.to_string(),
            status,
            result: Value::String(diagnostic.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_stable() {
        assert_eq!(Status::Ok.code(), 0);
        assert_eq!(Status::TechError.code(), 1);
        assert_eq!(Status::NotAuthorized.code(), 5);
        assert_eq!(Status::MissingAttr.code(), 6);
        assert_eq!(Status::InvalidAttr.code(), 7);
        assert_eq!(Status::ExecTimeout.code(), 8);
        assert_eq!(Status::NotAvailable.code(), 9);
    }

    #[test]
    fn test_envelope_defaults_transient() {
        let envelope: CommandEnvelope = serde_json::from_str(r#"{"cmd":"hEcho"}"#).unwrap();
        assert!(envelope.transient);
        assert!(envelope.reqid.is_none());

        let durable: CommandEnvelope =
            serde_json::from_str(r#"{"cmd":"hEcho","transient":false}"#).unwrap();
        assert!(!durable.transient);
    }

    #[test]
    fn test_exec_error_maps_status() {
        assert_eq!(
            ExecError::MissingAttr("chid".into()).status(),
            Status::MissingAttr
        );
        assert_eq!(
            ExecError::NotAvailable("channel".into()).status(),
            Status::NotAvailable
        );
    }
}
