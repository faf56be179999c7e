use std::future::Future;

use base64::{Engine, engine::general_purpose::STANDARD};
use tracing::{debug, error, info};

use crate::config::NtfyConfig;

pub const TITLE: &str = "BMC PID Fan Control";

// Best effort delivery of operator notifications.
// Delivery failures are logged and never reach the caller
pub trait Notifier: Send + Sync {
    fn notify(
        &self,
        title: &str,
        message: &str,
    ) -> impl Future<Output = ()> + Send;
}

// Publish notifications to an ntfy topic
pub struct NtfyNotifier {
    client: reqwest::Client,
    url: String,
}

impl NtfyNotifier {
    pub fn new(host: &str, topic: &str, token: Option<&str>) -> Self {
        let mut url = format!("https://{host}/{topic}");

        // ntfy accepts the authorization header base64 encoded in the query
        if let Some(token) = token {
            let auth = STANDARD.encode(format!("Bearer {token}"));
            url.push_str(&format!("?auth={auth}"));
        }

        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Notifier for NtfyNotifier {
    async fn notify(&self, title: &str, message: &str) {
        debug!("Sending notification \"{title}\": {message}");

        let response = self
            .client
            .post(&self.url)
            .header("Title", title)
            .body(message.to_string())
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                info!("Message sent successfully: {}", response.status());
            }
            Ok(response) => {
                error!(
                    "Message was not sent, server answered {}",
                    response.status()
                );
            }
            Err(err) => {
                error!("Message was not sent, error occurred: {err}");
            }
        }
    }
}

// Used when no notification service is configured
pub struct NullNotifier;

impl Notifier for NullNotifier {
    async fn notify(&self, title: &str, message: &str) {
        debug!("Notifications disabled, dropping \"{title}\": {message}");
    }
}

// Either notifier, picked at startup from the configuration
pub enum AnyNotifier {
    Ntfy(NtfyNotifier),
    Null(NullNotifier),
}

impl AnyNotifier {
    pub fn from_config(config: Option<&NtfyConfig>) -> Self {
        let non_empty = |value: &Option<String>| {
            value.as_deref().filter(|v| !v.trim().is_empty()).map(str::to_owned)
        };

        let target = config.and_then(|ntfy| {
            Some((non_empty(&ntfy.host)?, non_empty(&ntfy.topic)?, ntfy))
        });

        match target {
            Some((host, topic, ntfy)) => Self::Ntfy(NtfyNotifier::new(
                &host,
                &topic,
                non_empty(&ntfy.token).as_deref(),
            )),
            None => {
                info!("No ntfy host and topic configured, notifications disabled");
                Self::Null(NullNotifier)
            }
        }
    }
}

impl Notifier for AnyNotifier {
    async fn notify(&self, title: &str, message: &str) {
        match self {
            Self::Ntfy(notifier) => notifier.notify(title, message).await,
            Self::Null(notifier) => notifier.notify(title, message).await,
        }
    }
}
