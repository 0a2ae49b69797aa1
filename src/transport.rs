/*!
 # Device transport

 The device speaks plain HTTP: `GET ?action=get` returns the settings document,
 `POST ?action=set` stores one. The synchronizer only sees the
 [`SettingsTransport`] trait so tests can stand in for the device.
*/

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::{header, Client};
use tracing::{debug, instrument, trace};

use crate::sync::SyncConfig;
use crate::Result;

/// Raw answer from the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// Request/response channel to the device.
///
/// Implementations do not apply timeouts; the synchronizer wraps every call.
pub trait SettingsTransport: Send + Sync {
    /// Fetches the settings document
    fn fetch(&self) -> BoxFuture<'_, Result<Response>>;

    /// Sends a settings document
    fn send(&self, body: String) -> BoxFuture<'_, Result<Response>>;
}

/// HTTP transport backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    get_url: String,
    set_url: String,
}

impl HttpTransport {
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let base = config.base_url.trim_end_matches('/');
        let client = Client::builder().build()?;
        debug!("Using device at {}", base);
        Ok(Self {
            client,
            get_url: format!("{base}/?action=get"),
            set_url: format!("{base}/?action=set"),
        })
    }

    #[instrument(skip(self), fields(url = %self.get_url))]
    async fn get(&self) -> Result<Response> {
        let response = self.client.get(&self.get_url).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        trace!("GET answered {} with {} bytes", status, body.len());
        Ok(Response { status, body })
    }

    #[instrument(skip(self, body), fields(url = %self.set_url, len = body.len()))]
    async fn post(&self, body: String) -> Result<Response> {
        let response = self
            .client
            .post(&self.set_url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        trace!("POST answered {}", status);
        Ok(Response { status, body })
    }
}

impl SettingsTransport for HttpTransport {
    fn fetch(&self) -> BoxFuture<'_, Result<Response>> {
        self.get().boxed()
    }

    fn send(&self, body: String) -> BoxFuture<'_, Result<Response>> {
        self.post(body).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_carry_the_action() {
        let transport = HttpTransport::new(&SyncConfig::new("http://10.0.0.7/")).unwrap();
        assert_eq!(transport.get_url, "http://10.0.0.7/?action=get");
        assert_eq!(transport.set_url, "http://10.0.0.7/?action=set");
    }
}
