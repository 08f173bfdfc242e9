//! Notification dispatch.
//!
//! The only truly platform-specific dependency lives behind the
//! `NotificationBackend` trait: a blocking `deliver` call that shows a
//! desktop notification and reports how the user interacted with it.
//! The dispatcher wraps that call into an awaitable send with two
//! modes - fire-and-forget (failures are logged and swallowed) and
//! wait-for-result (failures surface to the caller).

use crate::config::SharedConfig;
use crate::error::{RelayError, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// A notification about to be shown.
#[derive(Debug, Clone)]
pub struct NotificationRequest {
    pub title: String,
    pub message: String,
    /// Absolute path of a local icon file.
    pub icon: Option<PathBuf>,
    /// Action labels the user can choose from.
    pub actions: Vec<String>,
    /// Seconds until the notifier gives up waiting for an interaction.
    pub timeout: Option<u64>,
    /// Whether the caller waits for the interaction outcome.
    pub wait: bool,
}

/// How the user interacted with a shown notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActivationType {
    #[serde(rename = "clicked")]
    Clicked,
    #[serde(rename = "actionClicked")]
    ActionClicked,
    #[serde(rename = "replied")]
    Replied,
    #[serde(rename = "closed")]
    Closed,
    #[serde(rename = "timedout")]
    TimedOut,
}

impl ActivationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clicked => "clicked",
            Self::ActionClicked => "actionClicked",
            Self::Replied => "replied",
            Self::Closed => "closed",
            Self::TimedOut => "timedout",
        }
    }
}

/// Outcome of a delivered notification.
#[derive(Debug, Clone, Serialize)]
pub struct Activation {
    /// Free-form result string from the notifier.
    pub result: String,
    pub activation_type: ActivationType,
    /// Reply text or chosen action label, where applicable.
    pub activation_value: Option<String>,
}

/// The OS-level notification facility.
pub trait NotificationBackend: Send + Sync + 'static {
    /// Show the notification and block until the notifier reports an
    /// outcome (or gives up).
    fn deliver(&self, request: &NotificationRequest) -> std::result::Result<Activation, String>;
}

/// Pick the native backend for this platform.
pub fn native_backend() -> Arc<dyn NotificationBackend> {
    #[cfg(target_os = "macos")]
    {
        Arc::new(macos::MacBackend)
    }
    #[cfg(not(target_os = "macos"))]
    {
        Arc::new(NoopBackend)
    }
}

/// True when the platform notifier renders its own placeholder icon, in
/// which case the configured placeholder must not be substituted.
fn native_supplies_placeholder() -> bool {
    cfg!(target_os = "macos")
}

/// Fallback for platforms without a native binding: the notification is
/// logged and immediately treated as never interacted with.
pub struct NoopBackend;

impl NotificationBackend for NoopBackend {
    fn deliver(&self, request: &NotificationRequest) -> std::result::Result<Activation, String> {
        tracing::info!(
            title = %request.title,
            message = %request.message,
            "No native notifier on this platform, notification not shown"
        );
        Ok(Activation {
            result: "noop".to_string(),
            activation_type: ActivationType::TimedOut,
            activation_value: None,
        })
    }
}

#[cfg(target_os = "macos")]
mod macos {
    use super::{Activation, ActivationType, NotificationBackend, NotificationRequest};
    use mac_notification_sys::{MainButton, Notification, NotificationResponse};

    pub struct MacBackend;

    impl NotificationBackend for MacBackend {
        fn deliver(
            &self,
            request: &NotificationRequest,
        ) -> std::result::Result<Activation, String> {
            let mut notification = Notification::new();
            notification
                .title(&request.title)
                .message(&request.message)
                .default_sound()
                .wait_for_click(request.wait)
                .asynchronous(false);

            let actions: Vec<&str> = request.actions.iter().map(String::as_str).collect();
            match actions.as_slice() {
                [] => {}
                [single] => {
                    notification.main_button(MainButton::SingleAction(single));
                }
                rest => {
                    notification.main_button(MainButton::DropdownActions("Actions", rest));
                }
            }

            let icon = request.icon.as_ref().map(|p| p.to_string_lossy().to_string());
            if let Some(icon) = icon.as_deref() {
                notification.content_image(icon);
            }

            let response = notification
                .send()
                .map_err(|e| format!("Failed to show notification: {}", e))?;

            Ok(match response {
                NotificationResponse::Click => Activation {
                    result: "activate".to_string(),
                    activation_type: ActivationType::Clicked,
                    activation_value: None,
                },
                NotificationResponse::ActionButton(label) => Activation {
                    result: "activate".to_string(),
                    activation_type: ActivationType::ActionClicked,
                    activation_value: Some(label),
                },
                NotificationResponse::Reply(text) => Activation {
                    result: "replied".to_string(),
                    activation_type: ActivationType::Replied,
                    activation_value: Some(text),
                },
                NotificationResponse::CloseButton(label) => Activation {
                    result: "closed".to_string(),
                    activation_type: ActivationType::Closed,
                    activation_value: Some(label),
                },
                NotificationResponse::None => Activation {
                    result: "timeout".to_string(),
                    activation_type: ActivationType::TimedOut,
                    activation_value: None,
                },
            })
        }
    }
}

/// Awaitable wrapper around the blocking backend.
#[derive(Clone)]
pub struct Dispatcher {
    backend: Arc<dyn NotificationBackend>,
    config: SharedConfig,
    default_icon: Option<PathBuf>,
}

impl Dispatcher {
    pub fn new(
        backend: Arc<dyn NotificationBackend>,
        config: SharedConfig,
        default_icon: Option<PathBuf>,
    ) -> Self {
        Self {
            backend,
            config,
            default_icon,
        }
    }

    /// Show the notification and resolve with the interaction outcome.
    pub async fn send(&self, request: NotificationRequest) -> Result<Activation> {
        let request = self.apply_icon_policy(request);
        let backend = self.backend.clone();

        tokio::task::spawn_blocking(move || backend.deliver(&request))
            .await
            .map_err(|e| RelayError::Dispatch(format!("Notification task failed: {}", e)))?
            .map_err(RelayError::Dispatch)
    }

    /// Fire-and-forget mode: dispatch in the background, log failures,
    /// never surface them.
    pub fn send_detached(&self, request: NotificationRequest) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            if let Err(e) = dispatcher.send(request).await {
                tracing::warn!("Dropped notification: {}", e);
            }
        });
    }

    fn apply_icon_policy(&self, mut request: NotificationRequest) -> NotificationRequest {
        let placeholder_enabled = self
            .config
            .snapshot()
            .notifications
            .placeholder_icon_enabled;

        if request.icon.is_none() && placeholder_enabled && !native_supplies_placeholder() {
            request.icon = self.default_icon.clone();
        }
        request
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records every delivered request and replays a canned outcome.
    pub struct StubBackend {
        pub delivered: Mutex<Vec<NotificationRequest>>,
        pub outcome: std::result::Result<Activation, String>,
    }

    impl StubBackend {
        pub fn ok(activation_type: ActivationType) -> Arc<Self> {
            Arc::new(Self {
                delivered: Mutex::new(Vec::new()),
                outcome: Ok(Activation {
                    result: activation_type.as_str().to_string(),
                    activation_type,
                    activation_value: None,
                }),
            })
        }

        pub fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                delivered: Mutex::new(Vec::new()),
                outcome: Err(message.to_string()),
            })
        }
    }

    impl NotificationBackend for StubBackend {
        fn deliver(
            &self,
            request: &NotificationRequest,
        ) -> std::result::Result<Activation, String> {
            self.delivered.lock().unwrap().push(request.clone());
            self.outcome.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::StubBackend;
    use super::*;
    use crate::config::RelayConfig;

    fn request(icon: Option<PathBuf>) -> NotificationRequest {
        NotificationRequest {
            title: "T".to_string(),
            message: "M".to_string(),
            icon,
            actions: Vec::new(),
            timeout: None,
            wait: false,
        }
    }

    #[tokio::test]
    async fn send_resolves_with_the_backend_outcome() {
        let backend = StubBackend::ok(ActivationType::Clicked);
        let dispatcher = Dispatcher::new(
            backend.clone(),
            SharedConfig::from_value(RelayConfig::default()),
            None,
        );

        let activation = dispatcher.send(request(None)).await.unwrap();
        assert_eq!(activation.activation_type, ActivationType::Clicked);
        assert_eq!(backend.delivered.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn send_surfaces_backend_failures_as_dispatch_errors() {
        let backend = StubBackend::failing("notifier exploded");
        let dispatcher = Dispatcher::new(
            backend,
            SharedConfig::from_value(RelayConfig::default()),
            None,
        );

        let err = dispatcher.send(request(None)).await.err().unwrap();
        assert!(matches!(err, RelayError::Dispatch(_)));
        assert!(err.to_string().contains("notifier exploded"));
    }

    #[cfg(not(target_os = "macos"))]
    #[tokio::test]
    async fn placeholder_icon_is_substituted_when_enabled() {
        let backend = StubBackend::ok(ActivationType::TimedOut);
        let placeholder = PathBuf::from("/opt/notify-relay/www/favicon.png");
        let dispatcher = Dispatcher::new(
            backend.clone(),
            SharedConfig::from_value(RelayConfig::default()),
            Some(placeholder.clone()),
        );

        dispatcher.send(request(None)).await.unwrap();
        assert_eq!(
            backend.delivered.lock().unwrap()[0].icon,
            Some(placeholder)
        );

        // an explicit icon always wins over the placeholder
        let explicit = PathBuf::from("/tmp/custom.png");
        dispatcher.send(request(Some(explicit.clone()))).await.unwrap();
        assert_eq!(backend.delivered.lock().unwrap()[1].icon, Some(explicit));
    }

    #[cfg(not(target_os = "macos"))]
    #[tokio::test]
    async fn placeholder_icon_respects_the_config_switch() {
        let backend = StubBackend::ok(ActivationType::TimedOut);
        let mut config = RelayConfig::default();
        config.notifications.placeholder_icon_enabled = false;
        let dispatcher = Dispatcher::new(
            backend.clone(),
            SharedConfig::from_value(config),
            Some(PathBuf::from("/opt/notify-relay/www/favicon.png")),
        );

        dispatcher.send(request(None)).await.unwrap();
        assert_eq!(backend.delivered.lock().unwrap()[0].icon, None);
    }
}
