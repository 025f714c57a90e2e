use anyhow::Context;
use reqwest::Client as HttpClient;
use snowtable_core::{HttpMethod, RequestDescriptor, TransportResponse};

/// Sends a fully described request and hands back status and body
///
/// Pooling, TLS and timeouts are left to the implementation.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: RequestDescriptor) -> anyhow::Result<TransportResponse>;
}

/// Transport backed by `reqwest`
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: HttpClient,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuse an existing client, e.g. one configured with custom TLS roots
    pub fn with_client(client: HttpClient) -> Self {
        Self { client }
    }
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: RequestDescriptor) -> anyhow::Result<TransportResponse> {
        let RequestDescriptor {
            method,
            url,
            headers,
            credentials,
            body,
        } = request;

        let mut builder = self
            .client
            .request(to_reqwest_method(method), url.as_str())
            .basic_auth(&credentials.username, Some(&credentials.password));

        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .with_context(|| format!("{} {} failed", method, url))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        Ok(TransportResponse { status, body })
    }
}
