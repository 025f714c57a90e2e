use crate::transport::{ReqwestTransport, Transport};
use crate::{ClientError, Operation, Result};
use serde::Serialize;
use snowtable_core::config::JSON_FORMAT;
use snowtable_core::{
    ClientConfig, HttpMethod, QueryBuilder, RecordRef, RequestDescriptor, ResultEnvelope,
    TransportResponse,
};
use std::collections::BTreeMap;
use tracing::instrument;
use url::Url;

/// Field requested by `count_records` to keep the payload small
const COUNT_FIELDS: &str = "sys_created_on";

/// Table API client
///
/// Every operation issues exactly one request through the transport. No
/// state changes between calls, so a client can be shared across tasks.
pub struct Client<T = ReqwestTransport> {
    config: ClientConfig,
    transport: T,
}

/// Content types for a single request
struct Formats<'a> {
    request: &'a str,
    response: &'a str,
}

impl Client<ReqwestTransport> {
    /// Create a new client using the default `reqwest` transport
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, ReqwestTransport::new())
    }

    /// Shorthand for an instance with default namespace, API name and formats
    pub fn connect(
        instance: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self::new(ClientConfig::new(instance, username, password))
    }
}

impl<T: Transport> Client<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Empty query builder using this instance's date format
    pub fn query(&self) -> QueryBuilder {
        QueryBuilder::new().with_date_format(self.config.date_format.clone())
    }

    /// Fetch records from `table`, filtered by `query` when one is given
    #[instrument(skip(self, query))]
    pub async fn get_records(&self, table: &str, query: Option<&QueryBuilder>) -> Result<String> {
        let operation = Operation::GetRecords;
        let mut params = Vec::new();
        if let Some(query) = query {
            params.push(("sysparm_query", query.build()?));
        }

        let url = self.url(table, None, &params)?;
        let response = self
            .execute(operation, HttpMethod::Get, url, None, self.default_formats())
            .await?;
        let response = self.check(operation, response)?;
        Ok(response.body)
    }

    /// Count records in `table` matching `query`
    ///
    /// Always talks JSON for this request, whatever the configured formats.
    #[instrument(skip(self, query))]
    pub async fn count_records(&self, table: &str, query: Option<&QueryBuilder>) -> Result<usize> {
        let operation = Operation::CountRecords;
        let mut params = Vec::new();
        if let Some(query) = query {
            params.push(("sysparm_query", query.build()?));
        }
        params.push(("sysparm_fields", COUNT_FIELDS.to_string()));

        let url = self.url(table, None, &params)?;
        let formats = Formats {
            request: JSON_FORMAT,
            response: JSON_FORMAT,
        };
        let response = self
            .execute(operation, HttpMethod::Get, url, None, formats)
            .await?;
        let response = self.check(operation, response)?;

        let envelope: ResultEnvelope<Vec<serde_json::Value>> =
            self.parse(operation, &response.body)?;
        Ok(envelope.result.len())
    }

    /// Fetch one record by sys_id, returning the raw body
    #[instrument(skip(self))]
    pub async fn get_single_record(&self, table: &str, sys_id: &str) -> Result<String> {
        let operation = Operation::GetSingleRecord;
        let url = self.url(table, Some(sys_id), &[])?;
        let response = self
            .execute(operation, HttpMethod::Get, url, None, self.default_formats())
            .await?;
        let response = self.check(operation, response)?;
        Ok(response.body)
    }

    /// Create a record and return its sys_id
    #[instrument(skip(self, body))]
    pub async fn create_record<B>(&self, table: &str, body: &B) -> Result<String>
    where
        B: Serialize + ?Sized,
    {
        let operation = Operation::CreateRecord;
        let payload = serde_json::to_string(body)?;
        let url = self.url(table, None, &[])?;
        let response = self
            .execute(
                operation,
                HttpMethod::Post,
                url,
                Some(payload),
                self.default_formats(),
            )
            .await?;
        self.extract_sys_id(operation, 201, response)
    }

    /// Update a record and return its sys_id
    #[instrument(skip(self, body))]
    pub async fn update_single_record<B>(
        &self,
        table: &str,
        body: &B,
        sys_id: &str,
    ) -> Result<String>
    where
        B: Serialize + ?Sized,
    {
        let operation = Operation::UpdateSingleRecord;
        let payload = serde_json::to_string(body)?;
        let url = self.url(table, Some(sys_id), &[])?;
        let response = self
            .execute(
                operation,
                HttpMethod::Put,
                url,
                Some(payload),
                self.default_formats(),
            )
            .await?;
        self.extract_sys_id(operation, 200, response)
    }

    /// Delete a record. Resolves `true` only for a 204 reply.
    #[instrument(skip(self))]
    pub async fn delete_single_record(&self, table: &str, sys_id: &str) -> Result<bool> {
        let operation = Operation::DeleteSingleRecord;
        let url = self.url(table, Some(sys_id), &[])?;
        let response = self
            .execute(operation, HttpMethod::Delete, url, None, self.default_formats())
            .await?;

        if response.status == 204 {
            return Ok(true);
        }

        tracing::warn!(
            "Delete of {}/{} returned status {}: {}",
            table,
            sys_id,
            response.status,
            response.body
        );
        Ok(false)
    }

    fn default_formats(&self) -> Formats<'_> {
        Formats {
            request: &self.config.request_format,
            response: &self.config.response_format,
        }
    }

    fn url(&self, table: &str, sys_id: Option<&str>, params: &[(&str, String)]) -> Result<String> {
        let base = self.config.api_url();
        let mut url = Url::parse(&base).map_err(|source| ClientError::InvalidUrl {
            url: base.clone(),
            source,
        })?;

        // Each value becomes exactly one encoded segment, so `/`, `?`, `#`
        // inside a sys_id can never address a different resource
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ClientError::CannotBeABase { url: base.clone() })?;
            segments.pop_if_empty();
            for segment in std::iter::once(table).chain(sys_id) {
                // PathSegmentsMut silently drops `.` and `..`
                if matches!(segment, "" | "." | "..") {
                    return Err(ClientError::InvalidPathSegment {
                        segment: segment.to_string(),
                    });
                }
                segments.push(segment);
            }
        }

        // query_pairs_mut leaves a bare `?` behind even when nothing is appended
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }

        Ok(url.into())
    }

    async fn execute(
        &self,
        operation: Operation,
        method: HttpMethod,
        url: String,
        body: Option<String>,
        formats: Formats<'_>,
    ) -> Result<TransportResponse> {
        let mut headers = BTreeMap::new();
        headers.insert("Accept".to_string(), formats.response.to_string());
        headers.insert("Content-Type".to_string(), formats.request.to_string());

        let request = RequestDescriptor {
            method,
            url,
            headers,
            credentials: self.config.credentials(),
            body,
        };

        tracing::debug!("{} {}", request.method, request.url);

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|source| ClientError::Transport {
                operation,
                instance: self.config.instance.clone(),
                source,
            })?;

        tracing::debug!("{} replied with status {}", operation, response.status);
        Ok(response)
    }

    /// Reject error statuses and empty bodies
    fn check(&self, operation: Operation, response: TransportResponse) -> Result<TransportResponse> {
        if response.is_error() {
            tracing::warn!(
                "Error while {} on {}: status {}",
                operation,
                self.config.instance,
                response.status
            );
            return Err(ClientError::Status {
                operation,
                instance: self.config.instance.clone(),
                status: response.status,
                body: response.body,
            });
        }

        if response.body.is_empty() {
            return Err(ClientError::EmptyResponse {
                operation,
                instance: self.config.instance.clone(),
            });
        }

        Ok(response)
    }

    fn extract_sys_id(
        &self,
        operation: Operation,
        expected: u16,
        response: TransportResponse,
    ) -> Result<String> {
        let response = self.check(operation, response)?;

        if response.status != expected {
            return Err(ClientError::UnexpectedStatus {
                operation,
                instance: self.config.instance.clone(),
                expected,
                status: response.status,
                body: response.body,
            });
        }

        let envelope: ResultEnvelope<RecordRef> = self.parse(operation, &response.body)?;
        Ok(envelope.result.sys_id)
    }

    fn parse<D: serde::de::DeserializeOwned>(&self, operation: Operation, body: &str) -> Result<D> {
        serde_json::from_str(body).map_err(|source| ClientError::MalformedBody {
            operation,
            instance: self.config.instance.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Replies with a canned response and records every request
    struct MockTransport {
        reply: std::result::Result<TransportResponse, String>,
        seen: Mutex<Vec<RequestDescriptor>>,
    }

    impl MockTransport {
        fn replying(status: u16, body: &str) -> Self {
            Self {
                reply: Ok(TransportResponse::new(status, body)),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                reply: Err(message.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn last(&self) -> RequestDescriptor {
            self.seen.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait::async_trait]
    impl Transport for MockTransport {
        async fn send(&self, request: RequestDescriptor) -> anyhow::Result<TransportResponse> {
            self.seen.lock().unwrap().push(request);
            match &self.reply {
                Ok(response) => Ok(response.clone()),
                Err(message) => Err(anyhow::anyhow!(message.clone())),
            }
        }
    }

    const INSTANCE: &str = "http://dev0000.service-now.com";

    fn mock_client(transport: MockTransport) -> Client<MockTransport> {
        Client::with_transport(ClientConfig::new(INSTANCE, "user", "pass"), transport)
    }

    fn query_pairs(url: &str) -> Vec<(String, String)> {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[tokio::test]
    async fn test_get_single_record() {
        let client = mock_client(MockTransport::replying(200, r#"{"result":{"sys_id":"x"}}"#));
        let body = client.get_single_record("test_table", "test_sys_id").await.unwrap();
        assert_eq!(body, r#"{"result":{"sys_id":"x"}}"#);

        let request = client.transport.last();
        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(
            request.url,
            "http://dev0000.service-now.com/api/now/table/test_table/test_sys_id"
        );
        assert_eq!(request.credentials.username, "user");
        assert_eq!(request.credentials.password, "pass");
        assert_eq!(request.headers["Accept"], "application/json");
        assert_eq!(request.headers["Content-Type"], "application/json");
        assert!(request.body.is_none());
    }

    #[tokio::test]
    async fn test_get_single_record_server_error() {
        let client = mock_client(MockTransport::replying(500, "Internal Server Error"));
        let err = client.get_single_record("test_table", "id").await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(
            err.to_string(),
            "Error while fetching single record on http://dev0000.service-now.com. Error: Internal Server Error"
        );
    }

    #[tokio::test]
    async fn test_get_single_record_empty_body() {
        let client = mock_client(MockTransport::replying(200, ""));
        let err = client.get_single_record("test_table", "id").await.unwrap_err();
        assert!(matches!(err, ClientError::EmptyResponse { .. }));
        assert!(!err.is_transport());
        assert_eq!(
            err.to_string(),
            "Error while fetching single record on http://dev0000.service-now.com. Retrieved empty response"
        );
    }

    #[tokio::test]
    async fn test_transport_failure() {
        let client = mock_client(MockTransport::failing("connection refused"));
        let err = client.get_single_record("test_table", "id").await.unwrap_err();
        assert!(err.is_transport());
        let message = err.to_string();
        assert!(message.contains("connection refused"));
        assert!(message.contains(INSTANCE));
    }

    #[tokio::test]
    async fn test_get_records_without_query() {
        let client = mock_client(MockTransport::replying(200, r#"{"result":[]}"#));
        client.get_records("incident", None).await.unwrap();

        let request = client.transport.last();
        assert_eq!(request.url, "http://dev0000.service-now.com/api/now/table/incident");
    }

    #[tokio::test]
    async fn test_get_records_with_query() {
        let client = mock_client(MockTransport::replying(200, r#"{"result":[]}"#));
        let mut query = client.query();
        query
            .field("active")
            .equals("true")
            .unwrap()
            .and()
            .field("priority")
            .equals(vec![1, 2])
            .unwrap();

        client.get_records("incident", Some(&query)).await.unwrap();

        let request = client.transport.last();
        assert!(request
            .url
            .starts_with("http://dev0000.service-now.com/api/now/table/incident?"));
        assert_eq!(
            query_pairs(&request.url),
            vec![(
                "sysparm_query".to_string(),
                "active=true^priorityIN1,2".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_get_records_empty_query_fails_before_sending() {
        let client = mock_client(MockTransport::replying(200, "{}"));
        let query = QueryBuilder::new();
        let err = client.get_records("incident", Some(&query)).await.unwrap_err();
        assert!(matches!(err, ClientError::Query(_)));
        assert!(client.transport.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_count_records() {
        let transport = MockTransport::replying(
            200,
            r#"{"result":[{"sys_created_on":"a"},{"sys_created_on":"b"},{"sys_created_on":"c"}]}"#,
        );
        let config = ClientConfig::new(INSTANCE, "user", "pass")
            .with_formats("application/xml", "application/xml");
        let client = Client::with_transport(config, transport);

        let mut query = client.query();
        query.field("state").equals(1).unwrap();
        assert_eq!(client.count_records("incident", Some(&query)).await.unwrap(), 3);

        let request = client.transport.last();
        assert_eq!(request.headers["Accept"], "application/json");
        assert_eq!(request.headers["Content-Type"], "application/json");
        assert_eq!(
            query_pairs(&request.url),
            vec![
                ("sysparm_query".to_string(), "state=1".to_string()),
                ("sysparm_fields".to_string(), "sys_created_on".to_string()),
            ]
        );

        // Configured formats are untouched for later calls
        assert_eq!(client.config().response_format, "application/xml");
        client.get_single_record("incident", "id").await.unwrap();
        assert_eq!(client.transport.last().headers["Accept"], "application/xml");
    }

    #[tokio::test]
    async fn test_count_records_without_query() {
        let client = mock_client(MockTransport::replying(200, r#"{"result":[]}"#));
        assert_eq!(client.count_records("incident", None).await.unwrap(), 0);
        assert_eq!(
            client.transport.last().url,
            "http://dev0000.service-now.com/api/now/table/incident?sysparm_fields=sys_created_on"
        );
    }

    #[tokio::test]
    async fn test_count_records_malformed_body() {
        let client = mock_client(MockTransport::replying(200, "<xml/>"));
        let err = client.count_records("incident", None).await.unwrap_err();
        assert!(matches!(err, ClientError::MalformedBody { .. }));
    }

    #[tokio::test]
    async fn test_create_record() {
        let client = mock_client(MockTransport::replying(201, r#"{"result":{"sys_id":"abc123"}}"#));
        let body = serde_json::json!({"short_description": "Printer on fire"});
        let sys_id = client.create_record("incident", &body).await.unwrap();
        assert_eq!(sys_id, "abc123");

        let request = client.transport.last();
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.url, "http://dev0000.service-now.com/api/now/table/incident");
        let sent: serde_json::Value =
            serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
        assert_eq!(sent, body);
    }

    #[tokio::test]
    async fn test_create_record_unexpected_status() {
        let client = mock_client(MockTransport::replying(200, r#"{"result":{"sys_id":"abc123"}}"#));
        let err = client
            .create_record("incident", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::UnexpectedStatus {
                expected: 201,
                status: 200,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_update_single_record() {
        let client = mock_client(MockTransport::replying(200, r#"{"result":{"sys_id":"abc123"}}"#));
        let sys_id = client
            .update_single_record("incident", &serde_json::json!({"state": 2}), "abc123")
            .await
            .unwrap();
        assert_eq!(sys_id, "abc123");

        let request = client.transport.last();
        assert_eq!(request.method, HttpMethod::Put);
        assert_eq!(
            request.url,
            "http://dev0000.service-now.com/api/now/table/incident/abc123"
        );
    }

    #[tokio::test]
    async fn test_update_single_record_client_error() {
        let client = mock_client(MockTransport::replying(404, "No Record found"));
        let err = client
            .update_single_record("incident", &serde_json::json!({}), "missing")
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Error while updating single record on http://dev0000.service-now.com. Error: No Record found"
        );
    }

    #[tokio::test]
    async fn test_delete_single_record() {
        for (status, expected) in [(204, true), (200, false), (202, false), (404, false), (500, false)] {
            let client = mock_client(MockTransport::replying(status, ""));
            let deleted = client.delete_single_record("incident", "abc").await.unwrap();
            assert_eq!(deleted, expected, "status {}", status);
            assert_eq!(client.transport.last().method, HttpMethod::Delete);
        }
    }

    #[tokio::test]
    async fn test_delete_transport_failure() {
        let client = mock_client(MockTransport::failing("timed out"));
        let err = client.delete_single_record("incident", "abc").await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_sys_id_stays_in_one_segment() {
        let cases = [
            ("abc/../def", "abc%2F..%2Fdef"),
            ("abc?x=1", "abc%3Fx=1"),
            ("abc#frag", "abc%23frag"),
        ];

        for (sys_id, encoded) in cases {
            let client = mock_client(MockTransport::replying(204, ""));
            assert!(client.delete_single_record("incident", sys_id).await.unwrap());

            let request = client.transport.last();
            assert_eq!(
                request.url,
                format!("http://dev0000.service-now.com/api/now/table/incident/{}", encoded)
            );

            let url = Url::parse(&request.url).unwrap();
            assert_eq!(url.query(), None);
            assert_eq!(url.fragment(), None);
            assert_eq!(url.path_segments().unwrap().count(), 5);
        }
    }

    #[tokio::test]
    async fn test_table_name_is_encoded() {
        let client = mock_client(MockTransport::replying(200, "{}"));
        client.get_single_record("incident/../sys_user", "1").await.unwrap();
        assert_eq!(
            client.transport.last().url,
            "http://dev0000.service-now.com/api/now/table/incident%2F..%2Fsys_user/1"
        );
    }

    #[tokio::test]
    async fn test_dot_segments_rejected_before_sending() {
        for sys_id in ["", ".", ".."] {
            let client = mock_client(MockTransport::replying(204, ""));
            let err = client.delete_single_record("incident", sys_id).await.unwrap_err();
            assert!(matches!(err, ClientError::InvalidPathSegment { .. }), "{:?}", sys_id);
            assert!(client.transport.seen.lock().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_invalid_instance_keeps_parse_error() {
        let config = ClientConfig::new("not a url", "user", "pass");
        let client = Client::with_transport(config, MockTransport::replying(200, "{}"));
        let err = client.get_single_record("incident", "1").await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidUrl { .. }));
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.downcast_ref::<url::ParseError>().is_some());
    }

    #[tokio::test]
    async fn test_query_uses_configured_date_format() {
        use chrono::TimeZone;

        let config = ClientConfig::new(INSTANCE, "user", "pass")
            .with_date_format(snowtable_core::DateFormat::new("%Y-%m-%d"));
        let client = Client::with_transport(config, MockTransport::replying(200, "{}"));
        let when = chrono::Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap();

        let mut query = client.query();
        query.field("opened_at").greater_than(when).unwrap();
        client.get_records("incident", Some(&query)).await.unwrap();

        assert_eq!(
            query_pairs(&client.transport.last().url),
            vec![("sysparm_query".to_string(), "opened_at>2024-02-03".to_string())]
        );
    }

    #[tokio::test]
    async fn test_custom_namespace_and_api() {
        let config = ClientConfig::new(INSTANCE, "user", "pass")
            .with_namespace("x_acme")
            .with_api_name("records");
        let client = Client::with_transport(config, MockTransport::replying(200, "{}"));
        client.get_single_record("task", "1").await.unwrap();
        assert_eq!(
            client.transport.last().url,
            "http://dev0000.service-now.com/api/x_acme/records/task/1"
        );
    }
}
