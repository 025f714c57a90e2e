use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::Credentials;
use crate::operand::DateFormat;

pub const JSON_FORMAT: &str = "application/json";

/// Connection settings for one store instance
#[derive(Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Base address, e.g. `https://dev12345.service-now.com`
    pub instance: String,
    pub username: String,
    pub password: String,

    #[serde(default = "default_api_name")]
    pub api_name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,

    // Content-Type and Accept headers
    #[serde(default = "default_format")]
    pub request_format: String,
    #[serde(default = "default_format")]
    pub response_format: String,

    /// Pattern used for date/time query operands
    ///
    /// Operands are rendered when a condition is added, so this only applies
    /// to builders created through `Client::query()`. A `QueryBuilder::new()`
    /// keeps the default pattern unless `with_date_format` is called on it.
    #[serde(default)]
    pub date_format: DateFormat,
}

fn default_api_name() -> String {
    "table".to_string()
}

fn default_namespace() -> String {
    "now".to_string()
}

fn default_format() -> String {
    JSON_FORMAT.to_string()
}

impl ClientConfig {
    pub fn new(
        instance: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            instance: instance.into(),
            username: username.into(),
            password: password.into(),
            api_name: default_api_name(),
            namespace: default_namespace(),
            request_format: default_format(),
            response_format: default_format(),
            date_format: DateFormat::default(),
        }
    }

    pub fn load(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: ClientConfig = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn with_api_name(mut self, api_name: impl Into<String>) -> Self {
        self.api_name = api_name.into();
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_formats(
        mut self,
        request_format: impl Into<String>,
        response_format: impl Into<String>,
    ) -> Self {
        self.request_format = request_format.into();
        self.response_format = response_format.into();
        self
    }

    pub fn with_date_format(mut self, date_format: DateFormat) -> Self {
        self.date_format = date_format;
        self
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }

    /// `<instance>/api/<namespace>/<api_name>`, the base every table path hangs off
    ///
    /// Table names and sys_ids are appended by the client as encoded path
    /// segments, never by string concatenation.
    pub fn api_url(&self) -> String {
        format!(
            "{}/api/{}/{}",
            self.instance.trim_end_matches('/'),
            self.namespace,
            self.api_name
        )
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("instance", &self.instance)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("api_name", &self.api_name)
            .field("namespace", &self.namespace)
            .field("request_format", &self.request_format)
            .field("response_format", &self.response_format)
            .field("date_format", &self.date_format)
            .finish()
    }
}
