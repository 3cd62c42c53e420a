use consolle_core::{Action, ErrorCode, RequestEnvelope, ResponseEnvelope};
use consolle_supervisor::Backend;
use std::sync::Arc;
use std::time::Duration;

/// Runs one request to completion against `backend` (spec.md section
/// 4.6): translates the internal `Backend` success/error shape into wire
/// response fields.
pub(crate) async fn dispatch(
    backend: &Arc<dyn Backend>,
    request_id: String,
    envelope: RequestEnvelope,
) -> ResponseEnvelope {
    match envelope.action {
        Action::Eval | Action::Exec => dispatch_eval(backend, request_id, envelope).await,
        Action::Status => dispatch_status(backend, request_id).await,
        Action::Restart => dispatch_restart(backend, request_id).await,
        Action::Unknown => {
            ResponseEnvelope::failure(request_id, ErrorCode::UnknownAction, "unknown action")
        }
    }
}

async fn dispatch_eval(
    backend: &Arc<dyn Backend>,
    request_id: String,
    envelope: RequestEnvelope,
) -> ResponseEnvelope {
    let Some(code) = envelope.code else {
        return ResponseEnvelope::failure(
            request_id,
            ErrorCode::MissingParameter,
            "missing required field 'code'",
        );
    };

    let timeout = envelope.timeout.map(Duration::from_secs_f64);
    match backend.eval(&code, timeout).await {
        Ok(success) => ResponseEnvelope::eval_success(
            request_id,
            success.output,
            success.execution_time.as_secs_f64(),
            success.truncated,
        ),
        Err(error) => ResponseEnvelope::failure_with_backtrace(
            request_id,
            error.error_code(),
            error.message(),
            error.backtrace().unwrap_or_default().to_vec(),
        ),
    }
}

async fn dispatch_status(backend: &Arc<dyn Backend>, request_id: String) -> ResponseEnvelope {
    let status = backend.status().await;
    ResponseEnvelope::status(
        request_id,
        status.running,
        status.pid.map(|pid| pid as i32),
        status.rails_root.to_string_lossy().into_owned(),
        status.rails_env,
    )
}

async fn dispatch_restart(backend: &Arc<dyn Backend>, request_id: String) -> ResponseEnvelope {
    match backend.restart().await {
        Ok(status) => ResponseEnvelope::restarted(
            request_id,
            status.pid.map(|pid| pid as i32),
            status.rails_root.to_string_lossy().into_owned(),
            status.rails_env,
            "restarted",
        ),
        Err(error) => ResponseEnvelope::failure(request_id, error.error_code(), error.message()),
    }
}
