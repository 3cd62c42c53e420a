//! Wire protocol: one JSON object per line, UTF-8, newline terminated
//! (spec.md section 6).

use crate::error_code::ErrorCode;
use serde::{Deserialize, Serialize};

/// The `action` field of a request envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Eval,
    Exec,
    Status,
    Restart,
    /// Any value other than the four recognized actions (spec.md section
    /// 7: unknown `action` maps to `UNKNOWN_ACTION`, not a hard decode
    /// error, so the response can still carry the caller's `request_id`).
    #[serde(other)]
    Unknown,
}

impl Action {
    /// `exec` is an alias for `eval` (spec.md section 4.6).
    pub fn is_eval(self) -> bool {
        matches!(self, Action::Eval | Action::Exec)
    }
}

/// One line of client request JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestEnvelope {
    pub action: Action,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub timeout: Option<f64>,
    #[serde(default)]
    pub request_id: Option<String>,
}

/// One line of server response JSON. Fields are populated per-action; a
/// missing field is simply omitted from the wire object rather than sent
/// as `null`, matching the per-action field table in spec.md section 6.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResponseEnvelope {
    pub success: bool,
    pub request_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncated: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backtrace: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub running: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rails_root: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rails_env: Option<String>,
}

impl ResponseEnvelope {
    pub fn eval_success(request_id: String, result: String, execution_time: f64, truncated: bool) -> Self {
        Self {
            success: true,
            request_id,
            result: Some(result),
            execution_time: Some(execution_time),
            truncated: if truncated { Some(true) } else { None },
            ..Default::default()
        }
    }

    pub fn failure(request_id: String, error: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            request_id,
            error: Some(error),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn failure_with_backtrace(
        request_id: String,
        error: ErrorCode,
        message: impl Into<String>,
        backtrace: Vec<String>,
    ) -> Self {
        let mut env = Self::failure(request_id, error, message);
        if !backtrace.is_empty() {
            env.backtrace = Some(backtrace);
        }
        env
    }

    pub fn status(
        request_id: String,
        running: bool,
        pid: Option<i32>,
        rails_root: String,
        rails_env: String,
    ) -> Self {
        Self {
            success: true,
            request_id,
            running: Some(running),
            pid,
            rails_root: Some(rails_root),
            rails_env: Some(rails_env),
            ..Default::default()
        }
    }

    pub fn restarted(
        request_id: String,
        pid: Option<i32>,
        rails_root: String,
        rails_env: String,
        message: impl Into<String>,
    ) -> Self {
        Self {
            success: true,
            request_id,
            pid,
            rails_root: Some(rails_root),
            rails_env: Some(rails_env),
            message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// The outcome of a single evaluation, before it is translated into wire
/// response fields (spec.md section 3, "Eval result").
#[derive(Debug, Clone)]
pub enum EvalOutcome {
    Success {
        output: String,
        execution_time: f64,
        truncated: bool,
    },
    Failure {
        error: ErrorCode,
        message: String,
        execution_time: f64,
        backtrace: Vec<String>,
    },
}
