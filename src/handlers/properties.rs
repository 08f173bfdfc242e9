//! The internal property endpoints backing the dashboard.

use crate::error::{RelayError, Result};
use crate::server::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
struct SetPropertyBody {
    key: String,
    #[serde(default)]
    value: Value,
}

pub async fn get_properties(State(state): State<AppState>) -> Result<Json<Value>> {
    Ok(Json(state.properties.all().await?))
}

pub async fn set_property(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>> {
    let body: SetPropertyBody = serde_json::from_slice(&body)
        .map_err(|e| RelayError::Validation(format!("Request body is not valid JSON: {}", e)))?;

    if body.key.trim().is_empty() {
        return Err(RelayError::Validation(
            "property 'key' must be a non-empty string".to_string(),
        ));
    }

    state.properties.set(&body.key, body.value).await?;

    Ok(Json(json!({
        "error": false,
        "message": format!("Successfully set property '{}'", body.key),
    })))
}
