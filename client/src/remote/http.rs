//! REST remote speaking the PostgREST dialect.

use super::RemoteAuthority;
use crate::error::RemoteError;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Remote authority reached over HTTP at `{base_url}/rest/v1/{collection}`.
#[derive(Clone)]
pub struct RestRemote {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    access_token: Option<String>,
}

impl RestRemote {
    pub fn new(base_url: impl Into<String>) -> Result<Self, RemoteError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            access_token: None,
        })
    }

    /// Send `apikey` with every request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Authenticate requests with a bearer token.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Health endpoint suitable for a connectivity probe.
    pub fn health_url(&self) -> String {
        format!("{}/rest/v1/", self.base_url)
    }

    fn endpoint(&self, collection: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, collection)
    }

    fn request(&self, method: Method, collection: &str) -> RequestBuilder {
        let mut builder = self.client.request(method, self.endpoint(collection));
        if let Some(key) = &self.api_key {
            builder = builder.header("apikey", key);
        }
        match (&self.access_token, &self.api_key) {
            (Some(token), _) => builder.bearer_auth(token),
            (None, Some(key)) => builder.bearer_auth(key),
            (None, None) => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, RemoteError> {
        let response = builder.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                RemoteError::Unreachable(e.to_string())
            } else {
                RemoteError::Http(e)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        Err(RemoteError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

fn id_filter(id: &str) -> [(&'static str, String); 1] {
    [("id", format!("eq.{id}"))]
}

fn with_id(mut data: Value, id: &str) -> Value {
    if let Value::Object(fields) = &mut data {
        fields
            .entry("id")
            .or_insert_with(|| Value::String(id.to_string()));
    }
    data
}

#[async_trait]
impl RemoteAuthority for RestRemote {
    async fn insert(&self, collection: &str, data: Value) -> Result<(), RemoteError> {
        debug!(collection, "remote insert");
        let builder = self
            .request(Method::POST, collection)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&data);
        self.send(builder).await?;
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, data: Value) -> Result<(), RemoteError> {
        debug!(collection, id, "remote update");
        let builder = self
            .request(Method::PATCH, collection)
            .query(&id_filter(id))
            .header("Prefer", "return=representation")
            .json(&data);
        let body = self.send(builder).await?.text().await?;

        // A filtered PATCH that matched nothing answers with an empty list
        let matched = serde_json::from_str::<Vec<Value>>(&body)
            .map(|rows| !rows.is_empty())
            .unwrap_or(true);
        if matched {
            return Ok(());
        }

        debug!(collection, id, "no row to update, inserting");
        self.insert(collection, with_id(data, id)).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RemoteError> {
        debug!(collection, id, "remote delete");
        let builder = self.request(Method::DELETE, collection).query(&id_filter(id));
        match self.send(builder).await {
            Ok(_) => Ok(()),
            Err(RemoteError::Rejected { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_one(&self, collection: &str, id: &str) -> Result<Option<Value>, RemoteError> {
        debug!(collection, id, "remote fetch");
        let builder = self
            .request(Method::GET, collection)
            .query(&id_filter(id))
            .query(&[("select", "*")]);
        let rows: Vec<Value> = self.send(builder).await?.json().await?;
        Ok(rows.into_iter().next())
    }
}

impl std::fmt::Debug for RestRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestRemote")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
