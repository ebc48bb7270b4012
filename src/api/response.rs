use crate::error::ApiError;
use reqwest::StatusCode;
use serde_json::Value;

/// Turn a raw HTTP status and body into a strict success/failure result.
///
/// Endpoints disagree on how they report refusal: some send a 4xx, some send
/// a 2xx carrying `success: false` or `status: false` (or `"error"`). All of
/// those become [`ApiError::Rejected`]. A free-text `message` never decides
/// the outcome.
pub fn interpret(status: StatusCode, body: &str) -> Result<Value, ApiError> {
    let parsed = if body.trim().is_empty() {
        Ok(Value::Null)
    } else {
        serde_json::from_str::<Value>(body)
    };

    if status.is_server_error() {
        return Err(ApiError::Server {
            status: status.as_u16(),
            message: error_message(parsed.as_ref().ok(), body),
        });
    }

    if !status.is_success() {
        return Err(ApiError::Rejected {
            status: Some(status.as_u16()),
            message: error_message(parsed.as_ref().ok(), body),
        });
    }

    let value = parsed.map_err(|e| {
        ApiError::Malformed(format!(
            "{} (first 200 chars: {})",
            e,
            body.chars().take(200).collect::<String>()
        ))
    })?;

    if explicitly_refused(&value) {
        return Err(ApiError::Rejected {
            status: Some(status.as_u16()),
            message: error_message(Some(&value), body),
        });
    }

    Ok(value)
}

fn explicitly_refused(value: &Value) -> bool {
    let Some(object) = value.as_object() else {
        return false;
    };

    for flag in ["success", "status"] {
        match object.get(flag) {
            Some(Value::Bool(false)) => return true,
            Some(Value::String(s)) => {
                let s = s.to_ascii_lowercase();
                if s == "error" || s == "fail" || s == "failed" || s == "failure" {
                    return true;
                }
            }
            _ => {}
        }
    }

    false
}

fn error_message(value: Option<&Value>, body: &str) -> String {
    value
        .and_then(|v| v.get("message").or_else(|| v.get("error")))
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                "no details".to_string()
            } else {
                body.chars().take(200).collect()
            }
        })
}
