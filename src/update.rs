//! Release update checker.
//!
//! Polls the GitHub latest-release endpoint once at startup and every
//! 24 hours. A newer release updates the property bag and, unless the
//! reminder was muted from the dashboard, sends a desktop notification.

use crate::config::SharedConfig;
use crate::dispatch::{Dispatcher, NotificationRequest};
use crate::properties::PropertyStore;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::time;

const RELEASE_API_URL: &str =
    "https://api.github.com/repos/notify-relay/notify-relay/releases/latest";
const CHECK_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Deserialize)]
struct GitHubRelease {
    tag_name: String,
}

pub fn spawn_update_checker(
    config: SharedConfig,
    properties: PropertyStore,
    dispatcher: Dispatcher,
) {
    tokio::spawn(async move {
        let mut interval = time::interval(CHECK_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = check_update(&config, &properties, &dispatcher).await {
                tracing::warn!("Update check failed: {}", e);
            }
        }
    });
}

async fn check_update(
    config: &SharedConfig,
    properties: &PropertyStore,
    dispatcher: &Dispatcher,
) -> Result<(), String> {
    let Some(release) = fetch_latest_release(config).await? else {
        return Ok(());
    };

    let current = env!("CARGO_PKG_VERSION");
    let remote = release.tag_name.trim_start_matches('v').to_string();

    properties
        .set("latestRemoteVersion", Value::from(remote.clone()))
        .await
        .map_err(|e| e.to_string())?;

    if !is_newer_version(current, &remote) {
        properties
            .set("needsUpdate", Value::from(false))
            .await
            .map_err(|e| e.to_string())?;
        return Ok(());
    }

    tracing::info!("Update available: v{} (running v{})", remote, current);
    properties
        .set("needsUpdate", Value::from(true))
        .await
        .map_err(|e| e.to_string())?;

    let remind = properties
        .get("remindUpdate")
        .await
        .map_err(|e| e.to_string())?
        != Some(Value::from(false));

    if config.snapshot().notifications.notification_on_update && remind {
        let activation = dispatcher
            .send(NotificationRequest {
                title: "notify-relay update".to_string(),
                message: format!(
                    "Version {} is available.\nOpen the dashboard for more info.",
                    remote
                ),
                icon: None,
                actions: Vec::new(),
                timeout: Some(30),
                wait: true,
            })
            .await
            .map_err(|e| e.to_string())?;

        if matches!(
            activation.activation_type,
            crate::dispatch::ActivationType::Clicked
                | crate::dispatch::ActivationType::ActionClicked
        ) {
            let port = config.snapshot().server.port;
            tracing::info!("Dashboard: http://127.0.0.1:{}/", port);
        }
    }

    Ok(())
}

async fn fetch_latest_release(config: &SharedConfig) -> Result<Option<GitHubRelease>, String> {
    let proxy_cfg = config.snapshot().server.proxy;
    let mut builder = reqwest::Client::builder().user_agent("notify-relay-update-checker");

    if proxy_cfg.enabled {
        let mut proxy =
            reqwest::Proxy::all(format!("http://{}:{}", proxy_cfg.host, proxy_cfg.port))
                .map_err(|e| format!("Invalid proxy configuration: {}", e))?;
        if !proxy_cfg.user.is_empty() {
            proxy = proxy.basic_auth(&proxy_cfg.user, &proxy_cfg.pass);
        }
        builder = builder.proxy(proxy);
    }

    let client = builder
        .build()
        .map_err(|e| format!("Can't build HTTP client: {}", e))?;

    let response = client
        .get(RELEASE_API_URL)
        .send()
        .await
        .map_err(|e| format!("Request to release API failed: {}", e))?;

    let status = response.status();
    if status.as_u16() == 404 {
        // no releases published yet
        return Ok(None);
    }
    if !status.is_success() {
        return Err(format!("Release API returned status {}", status.as_u16()));
    }

    response
        .json::<GitHubRelease>()
        .await
        .map(Some)
        .map_err(|e| format!("Unexpected data from release API: {}", e))
}

/// Compare dotted version strings; missing segments count as zero.
fn is_newer_version(current: &str, remote: &str) -> bool {
    let parse = |v: &str| -> Vec<u32> {
        v.trim_start_matches('v')
            .split('.')
            .filter_map(|s| s.parse().ok())
            .collect()
    };

    let current_parts = parse(current);
    let remote_parts = parse(remote);

    for i in 0..3 {
        let c = current_parts.get(i).copied().unwrap_or(0);
        let r = remote_parts.get(i).copied().unwrap_or(0);
        if r > c {
            return true;
        }
        if r < c {
            return false;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_comparison() {
        assert!(is_newer_version("0.1.0", "0.2.0"));
        assert!(is_newer_version("0.1.0", "1.0.0"));
        assert!(is_newer_version("1.2.3", "1.2.4"));
        assert!(is_newer_version("1.2", "1.2.1"));
        assert!(!is_newer_version("0.1.0", "0.1.0"));
        assert!(!is_newer_version("1.0.0", "0.9.9"));
        assert!(!is_newer_version("1.2.4", "1.2.3"));
        // tag prefixes are tolerated on either side
        assert!(is_newer_version("v0.1.0", "v0.1.1"));
    }
}
