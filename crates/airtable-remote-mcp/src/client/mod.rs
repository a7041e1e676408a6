//! Airtable Web API client.
//!
//! Provides async HTTP client with:
//! - Connection pooling via reqwest
//! - Retry middleware with exponential backoff
//! - Request pacing at 5 req/s (Airtable's per-base limit)
//! - Schema response caching with 60-second TTL

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use moka::future::Cache;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};

use crate::config::{Config, api};
use crate::error::{ClientError, ClientResult};
use crate::models::{
    BasesResponse, DeletedRecordsResponse, FieldSchema, FieldSpec, ListRecordsOptions, Record,
    RecordsResponse, TableSchema, TablesResponse,
};

/// Pacing limiter for outbound requests.
type Pacer = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// Airtable Web API client.
#[derive(Clone)]
pub struct AirtableClient {
    /// HTTP client with middleware.
    client: ClientWithMiddleware,

    /// Cached schema responses (bases, tables, table detail).
    schema_cache: Cache<String, serde_json::Value>,

    /// Whether schema caching is active.
    cache_enabled: bool,

    /// Outbound request pacer.
    pacer: Arc<Pacer>,

    /// Personal access token (optional).
    api_key: Option<String>,

    /// API base URL.
    api_url: String,

    /// Request timeout, reported in timeout errors.
    request_timeout: Duration,
}

impl AirtableClient {
    /// Create a new client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            "application/json".parse().expect("valid content-type header"),
        );
        headers.insert(
            reqwest::header::USER_AGENT,
            "Airtable-Remote-MCP/2.0.0".parse().expect("valid user-agent header"),
        );

        if let Some(ref key) = config.api_key {
            let mut auth: reqwest::header::HeaderValue = format!("Bearer {key}").parse()?;
            auth.set_sensitive(true);
            headers.insert(reqwest::header::AUTHORIZATION, auth);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(api::MAX_CONNECTIONS)
            .pool_idle_timeout(api::KEEPALIVE_EXPIRY)
            .gzip(true)
            .build()?;

        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(Duration::from_secs(1), Duration::from_secs(30))
            .build_with_max_retries(3);

        let client = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        let schema_cache = Cache::builder()
            .max_capacity(config.cache_max_size)
            .time_to_live(config.cache_ttl.max(Duration::from_millis(1)))
            .build();

        let rps = NonZeroU32::new(config.upstream_rps).unwrap_or(NonZeroU32::MIN);
        let pacer = Arc::new(RateLimiter::direct(Quota::per_second(rps)));

        Ok(Self {
            client,
            schema_cache,
            cache_enabled: !config.cache_ttl.is_zero(),
            pacer,
            api_key: config.api_key.clone(),
            api_url: config.airtable_api_url.clone(),
            request_timeout: config.request_timeout,
        })
    }

    /// Check if an API key is configured.
    #[must_use]
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    // ─── Base operations ─────────────────────────────────────────────────────

    /// List all bases the token can access.
    ///
    /// # Errors
    ///
    /// Returns error on API failure.
    pub async fn list_bases(&self) -> ClientResult<BasesResponse> {
        let url = format!("{}/meta/bases", self.api_url);
        self.get_cached(&url, &[]).await
    }

    // ─── Table operations ────────────────────────────────────────────────────

    /// List tables in a base with their schema.
    ///
    /// # Errors
    ///
    /// Returns error on API failure.
    pub async fn list_tables(
        &self,
        base_id: &str,
        detail_level: crate::models::DetailLevel,
    ) -> ClientResult<TablesResponse> {
        let url = format!("{}/meta/bases/{}/tables", self.api_url, base_id);

        let mut params = Vec::new();
        if let Some(level) = detail_level.as_param() {
            params.push(("detailLevel".to_string(), level.to_string()));
        }

        self.get_cached(&url, &params).await
    }

    /// Get the schema of a single table.
    ///
    /// # Errors
    ///
    /// Returns error on API failure.
    pub async fn describe_table(
        &self,
        base_id: &str,
        table_id: &str,
        detail_level: crate::models::DetailLevel,
    ) -> ClientResult<TableSchema> {
        let url = format!("{}/meta/bases/{}/tables/{}", self.api_url, base_id, table_id);

        let mut params = Vec::new();
        if let Some(level) = detail_level.as_param() {
            params.push(("detailLevel".to_string(), level.to_string()));
        }

        self.get_cached(&url, &params).await
    }

    /// Create a new table in a base.
    ///
    /// # Errors
    ///
    /// Returns error on API failure.
    pub async fn create_table(
        &self,
        base_id: &str,
        name: &str,
        description: Option<&str>,
        fields: &[FieldSpec],
    ) -> ClientResult<TableSchema> {
        let url = format!("{}/meta/bases/{}/tables", self.api_url, base_id);

        let mut body = serde_json::json!({
            "name": name,
            "fields": fields,
        });
        if let Some(desc) = description {
            body["description"] = serde_json::Value::String(desc.to_string());
        }

        let table = self.post(&url, &body).await?;
        self.invalidate_schema_cache();
        Ok(table)
    }

    /// Update a table's name or description. At least one must be given.
    ///
    /// # Errors
    ///
    /// Returns error on API failure, or `BadRequest` if neither name nor
    /// description is provided.
    pub async fn update_table(
        &self,
        base_id: &str,
        table_id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> ClientResult<TableSchema> {
        let url = format!("{}/meta/bases/{}/tables/{}", self.api_url, base_id, table_id);
        let body = patch_body(name, description)?;

        let table = self.patch(&url, &body).await?;
        self.invalidate_schema_cache();
        Ok(table)
    }

    // ─── Field operations ────────────────────────────────────────────────────

    /// Add a field to a table.
    ///
    /// # Errors
    ///
    /// Returns error on API failure.
    pub async fn create_field(
        &self,
        base_id: &str,
        table_id: &str,
        field: &FieldSpec,
    ) -> ClientResult<FieldSchema> {
        let url = format!("{}/meta/bases/{}/tables/{}/fields", self.api_url, base_id, table_id);
        let body = serde_json::to_value(field)?;

        let created = self.post(&url, &body).await?;
        self.invalidate_schema_cache();
        Ok(created)
    }

    /// Update a field's name or description. At least one must be given.
    ///
    /// # Errors
    ///
    /// Returns error on API failure, or `BadRequest` if neither name nor
    /// description is provided.
    pub async fn update_field(
        &self,
        base_id: &str,
        table_id: &str,
        field_id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> ClientResult<FieldSchema> {
        let url = format!(
            "{}/meta/bases/{}/tables/{}/fields/{}",
            self.api_url, base_id, table_id, field_id
        );
        let body = patch_body(name, description)?;

        let field = self.patch(&url, &body).await?;
        self.invalidate_schema_cache();
        Ok(field)
    }

    // ─── Record operations ───────────────────────────────────────────────────

    /// List records from a table with optional filtering and sorting.
    ///
    /// # Errors
    ///
    /// Returns error on API failure.
    pub async fn list_records(
        &self,
        base_id: &str,
        table_id: &str,
        options: &ListRecordsOptions,
    ) -> ClientResult<RecordsResponse> {
        let url = format!("{}/{}/{}", self.api_url, base_id, table_id);

        let mut params = Vec::new();
        if let Some(ref formula) = options.filter_by_formula {
            params.push(("filterByFormula".to_string(), formula.clone()));
        }
        if let Some(max) = options.max_records {
            params.push(("maxRecords".to_string(), max.to_string()));
        }
        if let Some(ref view) = options.view {
            params.push(("view".to_string(), view.clone()));
        }
        for (i, sort) in options.sort.iter().enumerate() {
            params.push((format!("sort[{i}][field]"), sort.field.clone()));
            params.push((format!("sort[{i}][direction]"), sort.direction.as_param().to_string()));
        }

        self.get(&url, &params).await
    }

    /// Search for records containing specific text.
    ///
    /// Builds a `SEARCH(...)` formula over the given field IDs, or over
    /// `RECORD_ID()` when no fields are given.
    ///
    /// # Errors
    ///
    /// Returns error on API failure.
    pub async fn search_records(
        &self,
        base_id: &str,
        table_id: &str,
        search_term: &str,
        field_ids: &[String],
        max_records: Option<u32>,
        view: Option<&str>,
    ) -> ClientResult<RecordsResponse> {
        let url = format!("{}/{}/{}", self.api_url, base_id, table_id);

        let mut params =
            vec![("filterByFormula".to_string(), search_formula(search_term, field_ids))];
        if let Some(max) = max_records {
            params.push(("maxRecords".to_string(), max.to_string()));
        }
        if let Some(view) = view {
            params.push(("view".to_string(), view.to_string()));
        }

        self.get(&url, &params).await
    }

    /// Get a single record by ID.
    ///
    /// # Errors
    ///
    /// Returns error on API failure.
    pub async fn get_record(
        &self,
        base_id: &str,
        table_id: &str,
        record_id: &str,
    ) -> ClientResult<Record> {
        let url = format!("{}/{}/{}/{}", self.api_url, base_id, table_id, record_id);
        self.get(&url, &[]).await
    }

    /// Create a new record.
    ///
    /// # Errors
    ///
    /// Returns error on API failure.
    pub async fn create_record(
        &self,
        base_id: &str,
        table_id: &str,
        fields: &serde_json::Map<String, serde_json::Value>,
    ) -> ClientResult<Record> {
        let url = format!("{}/{}/{}", self.api_url, base_id, table_id);
        let body = serde_json::json!({ "fields": fields });

        self.post(&url, &body).await
    }

    /// Update up to 10 records in one call.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` if more than 10 records are given, or error on
    /// API failure.
    pub async fn update_records(
        &self,
        base_id: &str,
        table_id: &str,
        records: &[crate::models::RecordPatch],
    ) -> ClientResult<RecordsResponse> {
        if records.len() > api::MAX_RECORDS_PER_WRITE {
            return Err(ClientError::bad_request(format!(
                "cannot update more than {} records at once",
                api::MAX_RECORDS_PER_WRITE
            )));
        }

        let url = format!("{}/{}/{}", self.api_url, base_id, table_id);
        let body = serde_json::json!({ "records": records });

        self.patch(&url, &body).await
    }

    /// Delete up to 10 records in one call.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` if more than 10 record IDs are given, or error
    /// on API failure.
    pub async fn delete_records(
        &self,
        base_id: &str,
        table_id: &str,
        record_ids: &[String],
    ) -> ClientResult<DeletedRecordsResponse> {
        if record_ids.len() > api::MAX_RECORDS_PER_WRITE {
            return Err(ClientError::bad_request(format!(
                "cannot delete more than {} records at once",
                api::MAX_RECORDS_PER_WRITE
            )));
        }

        let url = format!("{}/{}/{}", self.api_url, base_id, table_id);
        let params: Vec<(String, String)> = record_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (format!("records[{i}]"), id.clone()))
            .collect();

        self.delete(&url, &params).await
    }

    // ─── Request plumbing ────────────────────────────────────────────────────

    /// Make a GET request.
    async fn get<T>(&self, url: &str, params: &[(String, String)]) -> ClientResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.pacer.until_ready().await;

        let response = self.client.get(url).query(params).send().await;
        let value = self.finish(response).await?;

        serde_json::from_value(value).map_err(ClientError::from)
    }

    /// Make a GET request through the schema cache.
    async fn get_cached<T>(&self, url: &str, params: &[(String, String)]) -> ClientResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        if !self.cache_enabled {
            return self.get(url, params).await;
        }

        let cache_key = cache_key("GET", url, params);
        if let Some(cached) = self.schema_cache.get(&cache_key).await {
            return serde_json::from_value(cached).map_err(ClientError::from);
        }

        let value: serde_json::Value = self.get(url, params).await?;
        self.schema_cache.insert(cache_key, value.clone()).await;

        serde_json::from_value(value).map_err(ClientError::from)
    }

    /// Make a POST request.
    async fn post<T>(&self, url: &str, body: &serde_json::Value) -> ClientResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.pacer.until_ready().await;

        let response = self.client.post(url).json(body).send().await;
        let value = self.finish(response).await?;

        serde_json::from_value(value).map_err(ClientError::from)
    }

    /// Make a PATCH request.
    async fn patch<T>(&self, url: &str, body: &serde_json::Value) -> ClientResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.pacer.until_ready().await;

        let response = self.client.patch(url).json(body).send().await;
        let value = self.finish(response).await?;

        serde_json::from_value(value).map_err(ClientError::from)
    }

    /// Make a DELETE request.
    async fn delete<T>(&self, url: &str, params: &[(String, String)]) -> ClientResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.pacer.until_ready().await;

        let response = self.client.delete(url).query(params).send().await;
        let value = self.finish(response).await?;

        serde_json::from_value(value).map_err(ClientError::from)
    }

    /// Map transport errors, check status, and decode the body.
    async fn finish(
        &self,
        response: Result<reqwest::Response, reqwest_middleware::Error>,
    ) -> ClientResult<serde_json::Value> {
        let response = response.map_err(|err| match err {
            reqwest_middleware::Error::Reqwest(inner) if inner.is_timeout() => {
                ClientError::Timeout(self.request_timeout)
            }
            other => ClientError::from(other),
        })?;

        let response = handle_response(response).await?;

        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(serde_json::json!({ "success": true }));
        }

        response.json().await.map_err(ClientError::from)
    }

    /// Drop all cached schema responses.
    fn invalidate_schema_cache(&self) {
        self.schema_cache.invalidate_all();
    }
}

impl std::fmt::Debug for AirtableClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AirtableClient")
            .field("api_url", &self.api_url)
            .field("has_api_key", &self.has_api_key())
            .finish()
    }
}

/// Handle API response status codes.
async fn handle_response(response: reqwest::Response) -> ClientResult<reqwest::Response> {
    let status = response.status();

    if status.is_success() {
        return Ok(response);
    }

    match status.as_u16() {
        401 => {
            let text = response.text().await.unwrap_or_default();
            Err(ClientError::unauthorized(text))
        }
        403 => {
            let text = response.text().await.unwrap_or_default();
            Err(ClientError::forbidden(text))
        }
        404 => {
            let text = response.text().await.unwrap_or_default();
            Err(ClientError::not_found(text))
        }
        422 => {
            let text = response.text().await.unwrap_or_default();
            Err(ClientError::unprocessable(text))
        }
        429 => {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(30);

            Err(ClientError::rate_limited(retry_after))
        }
        400 => {
            let text = response.text().await.unwrap_or_default();
            Err(ClientError::bad_request(text))
        }
        500..=599 => {
            let text = response.text().await.unwrap_or_default();
            Err(ClientError::server(status.as_u16(), text))
        }
        _ => {
            let text = response.text().await.unwrap_or_default();
            Err(ClientError::UnexpectedStatus { status: status.as_u16(), message: text })
        }
    }
}

/// Build the text-search formula over the given field IDs.
///
/// Double quotes in the search term are escaped so the term cannot break
/// out of the formula string.
fn search_formula(search_term: &str, field_ids: &[String]) -> String {
    let escaped = search_term.replace('\\', "\\\\").replace('"', "\\\"");
    let haystack =
        if field_ids.is_empty() { "RECORD_ID()".to_string() } else { field_ids.join(", ") };

    format!("SEARCH(\"{escaped}\", CONCATENATE({haystack})) != \"\"")
}

/// Build a PATCH body from optional name/description.
fn patch_body(
    name: Option<&str>,
    description: Option<&str>,
) -> ClientResult<serde_json::Value> {
    let mut body = serde_json::Map::new();
    if let Some(name) = name {
        body.insert("name".to_string(), serde_json::Value::String(name.to_string()));
    }
    if let Some(desc) = description {
        body.insert("description".to_string(), serde_json::Value::String(desc.to_string()));
    }

    if body.is_empty() {
        return Err(ClientError::bad_request(
            "at least one of name or description must be provided",
        ));
    }

    Ok(serde_json::Value::Object(body))
}

/// Generate cache key.
fn cache_key(method: &str, url: &str, params: &[(String, String)]) -> String {
    use md5::{Digest, Md5};

    let mut hasher = Md5::new();
    hasher.update(method.as_bytes());
    hasher.update(b"|");
    hasher.update(url.as_bytes());
    hasher.update(b"|");

    for (k, v) in params {
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.as_bytes());
        hasher.update(b"&");
    }

    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_formula_default_target() {
        let formula = search_formula("widget", &[]);
        assert_eq!(formula, r#"SEARCH("widget", CONCATENATE(RECORD_ID())) != """#);
    }

    #[test]
    fn test_search_formula_with_fields() {
        let fields = vec!["fldAAAA00000000B1".to_string(), "fldAAAA00000000B2".to_string()];
        let formula = search_formula("widget", &fields);
        assert_eq!(
            formula,
            r#"SEARCH("widget", CONCATENATE(fldAAAA00000000B1, fldAAAA00000000B2)) != """#
        );
    }

    #[test]
    fn test_search_formula_escapes_quotes() {
        let formula = search_formula(r#"say "hi""#, &[]);
        assert_eq!(formula, r#"SEARCH("say \"hi\"", CONCATENATE(RECORD_ID())) != """#);
    }

    #[test]
    fn test_patch_body_requires_a_field() {
        assert!(patch_body(None, None).is_err());

        let body = patch_body(Some("Tasks"), None).unwrap();
        assert_eq!(body, serde_json::json!({ "name": "Tasks" }));

        let body = patch_body(Some("Tasks"), Some("All tasks")).unwrap();
        assert_eq!(body, serde_json::json!({ "name": "Tasks", "description": "All tasks" }));
    }

    #[test]
    fn test_cache_key_stable() {
        let params = vec![("detailLevel".to_string(), "identifiersOnly".to_string())];
        let a = cache_key("GET", "https://api.airtable.com/v0/meta/bases", &params);
        let b = cache_key("GET", "https://api.airtable.com/v0/meta/bases", &params);
        assert_eq!(a, b);

        let c = cache_key("GET", "https://api.airtable.com/v0/meta/bases", &[]);
        assert_ne!(a, c);
    }
}
