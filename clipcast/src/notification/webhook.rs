//! HTTP status notifier.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, info, warn};
use url::Url;

use super::{StatusEvent, StatusNotifier};
use crate::config::NotifierConfig;
use crate::{Error, Result};

/// POSTs each event as JSON to a fixed URL.
pub struct HttpStatusNotifier {
    url: Url,
    client: Client,
    headers: HeaderMap,
}

impl HttpStatusNotifier {
    pub fn new(url: &str, config: &NotifierConfig) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| Error::config(format!("invalid status url '{url}': {e}")))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            url,
            client,
            headers: build_headers(config),
        })
    }
}

/// Custom headers plus bearer auth. Headers that do not parse are skipped.
fn build_headers(config: &NotifierConfig) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.headers {
        match (name.parse::<HeaderName>(), value.parse::<HeaderValue>()) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(header = %name, "Ignoring invalid notifier header"),
        }
    }
    if let Some(token) = &config.bearer_token
        && let Ok(value) = format!("Bearer {token}").parse()
    {
        headers.insert(AUTHORIZATION, value);
    }
    headers
}

#[async_trait]
impl StatusNotifier for HttpStatusNotifier {
    async fn notify(&self, event: &StatusEvent) -> Result<()> {
        let response = self
            .client
            .post(self.url.clone())
            .headers(self.headers.clone())
            .json(event)
            .send()
            .await
            .map_err(|e| Error::Notify(format!("request failed: {e}")))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            warn!(id = %event.id, %status, %body, "Status notification rejected");
            return Err(Error::Notify(format!("{status} - {body}")));
        }

        info!(id = %event.id, phase = %event.status, %status, "Status notification delivered");
        debug!(%body, "Coordinator response");
        Ok(())
    }
}

/// Used when no coordinator is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlyNotifier;

#[async_trait]
impl StatusNotifier for LogOnlyNotifier {
    async fn notify(&self, event: &StatusEvent) -> Result<()> {
        info!(
            id = %event.id,
            phase = %event.status,
            message = event.message.as_deref().unwrap_or(""),
            "No status url configured, skipping notification"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers() {
        let config = NotifierConfig {
            bearer_token: Some("secret".to_string()),
            headers: vec![
                ("X-Source".to_string(), "clipcast".to_string()),
                ("bad header".to_string(), "x".to_string()),
            ],
            ..Default::default()
        };
        let headers = build_headers(&config);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[AUTHORIZATION], "Bearer secret");
        assert_eq!(headers["x-source"], "clipcast");
    }

    #[tokio::test]
    async fn test_unreachable_coordinator_is_notify_error() {
        let notifier =
            HttpStatusNotifier::new("http://127.0.0.1:9/status", &NotifierConfig::default())
                .unwrap();
        let err = notifier
            .notify(&StatusEvent::finished("job1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Notify(_)));
    }
}
