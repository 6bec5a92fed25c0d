use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::ServerConfig;
use crate::csrf;
use crate::document::SharedDocument;
use crate::error::ActionError;
use crate::transport::{Request, Transport, AJAX_HEADER};

/// `{success, error?, ...}` wrapper every JSON endpoint answers with.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(flatten)]
    pub data: T,
}

impl<T> Envelope<T> {
    /// Turns a failure flag into `ActionError::Rejected`, using the server's
    /// reason when it gave one.
    pub fn into_result(self, fallback: &str) -> Result<T, ActionError> {
        if self.success {
            Ok(self.data)
        } else {
            Err(ActionError::Rejected(
                self.error.unwrap_or_else(|| fallback.to_string()),
            ))
        }
    }
}

/// Acknowledgement with no payload beyond the flag.
#[derive(Debug, Default, Deserialize)]
pub struct Ack {}

/// JSON endpoints of the server, with CSRF handling.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    document: SharedDocument,
    csrf_cookie: String,
    csrf_header: String,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>, document: SharedDocument, config: &ServerConfig) -> Self {
        Self {
            transport,
            document,
            csrf_cookie: config.csrf_cookie.clone(),
            csrf_header: config.csrf_header.clone(),
        }
    }

    pub fn document(&self) -> &SharedDocument {
        &self.document
    }

    async fn csrf_token(&self) -> Option<String> {
        let cookies = self.transport.cookie_header();
        let embedded = self.document.lock().await.csrf_field.clone();
        csrf::resolve(cookies.as_deref(), &self.csrf_cookie, embedded.as_deref())
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Envelope<T>, ActionError> {
        let mut request = Request::post(path).header("Content-Type", "application/json");
        if let Some(token) = self.csrf_token().await {
            request = request.header(self.csrf_header.as_str(), token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        self.exchange(request).await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Envelope<T>, ActionError> {
        let request = Request::get(path).header(AJAX_HEADER.0, AJAX_HEADER.1);
        self.exchange(request).await
    }

    async fn exchange<T: DeserializeOwned>(&self, request: Request) -> Result<Envelope<T>, ActionError> {
        let response = self
            .transport
            .send(request)
            .await
            .map_err(ActionError::Transport)?;
        if !response.is_success() {
            return Err(ActionError::Status(response.status));
        }
        Ok(response.json()?)
    }
}
