//! The `/send` endpoint: validate, resolve the icon, dispatch and log.

use crate::dispatch::NotificationRequest;
use crate::error::{RelayError, Result};
use crate::notif_log::LoggedNotification;
use crate::server::AppState;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;

#[derive(Deserialize)]
pub struct SendQuery {
    #[serde(rename = "waitForResult")]
    wait_for_result: Option<String>,
}

impl SendQuery {
    fn wait(&self) -> bool {
        matches!(
            self.wait_for_result.as_deref(),
            Some("true") | Some("1") | Some("yes")
        )
    }
}

/// Validated payload of a `/send` request.
struct SendPayload {
    title: String,
    message: String,
    icon: Option<String>,
    actions: Option<Vec<String>>,
    timeout: Option<u64>,
}

pub async fn send_notification(
    State(state): State<AppState>,
    Query(query): Query<SendQuery>,
    body: Bytes,
) -> Result<Json<Value>> {
    if body.is_empty() {
        return Err(RelayError::Validation(
            "No request data was received".to_string(),
        ));
    }

    let body: Value = serde_json::from_slice(&body)
        .map_err(|e| RelayError::Validation(format!("Request body is not valid JSON: {}", e)))?;
    let payload = validate_payload(&body)?;

    let wait = query.wait();
    let icon = resolve_icon(&state, payload.icon.as_deref()).await;
    let timestamp = chrono::Utc::now().timestamp_millis();

    let default_timeout = state.config.snapshot().server.timeout;
    let request = NotificationRequest {
        title: payload.title.clone(),
        message: payload.message.clone(),
        icon: icon.clone(),
        actions: payload.actions.clone().unwrap_or_default(),
        timeout: payload.timeout.or(wait.then_some(default_timeout)),
        wait,
    };

    let log_entry = LoggedNotification {
        title: payload.title,
        message: payload.message,
        icon: icon.map(|p| p.to_string_lossy().to_string()),
        actions: payload.actions,
        wait,
        timestamp,
    };

    if wait {
        let activation = state.dispatcher.send(request).await?;
        log_dispatched(&state, log_entry, timestamp).await;

        Ok(Json(json!({
            "error": false,
            "message": "Sent desktop notification",
            "result": activation.result,
            "type": activation.activation_type.as_str(),
            "value": activation.activation_value,
        })))
    } else {
        state.dispatcher.send_detached(request);
        log_dispatched(&state, log_entry, timestamp).await;

        Ok(Json(json!({
            "error": false,
            "message": "Sent desktop notification",
        })))
    }
}

/// Check every property independently so one 400 names all violations,
/// not just the first.
fn validate_payload(body: &Value) -> Result<SendPayload> {
    let Some(obj) = body.as_object() else {
        return Err(RelayError::Validation(
            "Request body must be a JSON object".to_string(),
        ));
    };

    let mut violations: Vec<String> = Vec::new();

    let required_string = |key: &str, violations: &mut Vec<String>| -> String {
        match obj.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            _ => {
                violations.push(format!("property '{}' must be a non-empty string", key));
                String::new()
            }
        }
    };

    let title = required_string("title", &mut violations);
    let message = required_string("message", &mut violations);

    let icon = match obj.get("icon") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            violations.push("property 'icon' must be a string".to_string());
            None
        }
    };

    let actions = match obj.get("actions") {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) if items.iter().all(|v| v.is_string()) => Some(
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        ),
        Some(_) => {
            violations.push("property 'actions' must be an array of strings".to_string());
            None
        }
    };

    let timeout = match obj.get("timeout") {
        None | Some(Value::Null) => None,
        Some(value) => match value.as_f64() {
            Some(secs) if secs > 0.0 => Some(secs.round() as u64),
            _ => {
                violations.push("property 'timeout' must be a positive number".to_string());
                None
            }
        },
    };

    if !violations.is_empty() {
        return Err(RelayError::Validation(violations.join("; ")));
    }

    Ok(SendPayload {
        title,
        message,
        icon,
        actions,
        timeout,
    })
}

/// Turn the request's icon into an absolute local path. Remote URLs go
/// through the asset cache; a failed cache attempt falls back to no
/// icon rather than failing the notification.
async fn resolve_icon(state: &AppState, icon: Option<&str>) -> Option<PathBuf> {
    let icon = icon?;

    if icon.starts_with("http://") || icon.starts_with("https://") {
        let outcome = state.cache.try_cache(icon).await;
        if outcome.success {
            return outcome.path;
        }
        tracing::warn!("Can't cache icon '{}': {}", icon, outcome.message);
        return None;
    }

    let path = PathBuf::from(icon);
    Some(std::path::absolute(&path).unwrap_or(path))
}

async fn log_dispatched(state: &AppState, entry: LoggedNotification, timestamp: i64) {
    if state.config.snapshot().logging.log_notifications {
        if let Err(e) = state.notif_log.append(entry).await {
            tracing::warn!("Can't log notification: {}", e);
        }
    }

    if let Err(e) = state
        .properties
        .set("lastNotification", Value::from(timestamp))
        .await
    {
        tracing::warn!("Can't update lastNotification property: {}", e);
    }
}
