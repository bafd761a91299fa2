use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Map, Value};

use lifeflow_core::collection::SnapshotOrder;
use lifeflow_core::row::{validate::row_from_value, Row, RowId, TableName};
use lifeflow_filter::Filter;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::service::{DataService, EventStream};

use super::ws;

/// Client of the hosted data service.
pub struct RemoteService {
    http: reqwest::Client,
    base_url: String,
    ws_url: String,
    key: String,
}

impl RemoteService {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let base_url = config.service_url.trim_end_matches('/').to_string();
        let ws_url = derive_ws_url(&base_url);
        let http = reqwest::Client::builder()
            .user_agent(format!("{}-client", config.app_name))
            .build()?;
        Ok(Self {
            http,
            base_url,
            ws_url,
            key: config.service_key.clone(),
        })
    }

    fn rest_url(&self, table: &TableName) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.key).bearer_auth(&self.key)
    }

    /// Map an error status onto the client taxonomy. `empty_on_not_found`
    /// is set for list reads, where an absent table or row is an empty
    /// result rather than an error.
    async fn check(
        response: reqwest::Response,
        empty_on_not_found: bool,
    ) -> ClientResult<Option<reqwest::Response>> {
        match response.status() {
            status if status.is_success() => Ok(Some(response)),
            StatusCode::UNAUTHORIZED => Err(ClientError::Unauthorized),
            StatusCode::FORBIDDEN => {
                let detail = response.text().await.unwrap_or_default();
                Err(ClientError::Forbidden(detail))
            }
            StatusCode::NOT_FOUND if empty_on_not_found => Ok(None),
            StatusCode::NOT_FOUND => {
                let detail = response.text().await.unwrap_or_default();
                Err(ClientError::NotFound(detail))
            }
            status => {
                let detail = response.text().await.unwrap_or_default();
                Err(ClientError::Transport(format!("HTTP {status}: {detail}")))
            }
        }
    }

    fn parse_rows(values: Vec<Value>, table: &TableName) -> Vec<Row> {
        // Rows that fail the shape contract are dropped with a warning
        // rather than failing the whole read.
        values
            .into_iter()
            .filter_map(|value| match row_from_value(value) {
                Ok(row) => Some(row),
                Err(err) => {
                    tracing::warn!(table = %table, %err, "dropping malformed row from snapshot");
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl DataService for RemoteService {
    async fn snapshot(
        &self,
        table: &TableName,
        filter: Option<&Filter>,
        order: SnapshotOrder,
        limit: usize,
    ) -> ClientResult<Vec<Row>> {
        let order = match order {
            SnapshotOrder::CreatedAsc => "created_at.asc",
            SnapshotOrder::CreatedDesc => "created_at.desc",
        };
        let mut query: Vec<(&str, String)> = vec![
            ("order", order.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(filter) = filter {
            query.push(("filter", filter.to_string()));
        }

        let response = self
            .authed(self.http.get(self.rest_url(table)).query(&query))
            .send()
            .await?;
        match Self::check(response, true).await? {
            Some(response) => {
                let values: Vec<Value> = response.json().await?;
                Ok(Self::parse_rows(values, table))
            }
            None => Ok(Vec::new()),
        }
    }

    async fn subscribe(
        &self,
        table: &TableName,
        filter: Option<&Filter>,
    ) -> ClientResult<EventStream> {
        ws::open_feed(&self.ws_url, &self.key, table, filter).await
    }

    async fn insert(&self, table: &TableName, row: Row) -> ClientResult<Row> {
        let response = self
            .authed(self.http.post(self.rest_url(table)))
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await?;
        let response = Self::check(response, false).await?.ok_or_else(|| {
            ClientError::Internal("insert response vanished".into())
        })?;
        let mut values: Vec<Value> = response.json().await?;
        match values.pop() {
            Some(value) => Ok(row_from_value(value)?),
            None => Err(ClientError::Internal("insert returned no row".into())),
        }
    }

    async fn update(
        &self,
        table: &TableName,
        id: &RowId,
        fields: Map<String, Value>,
    ) -> ClientResult<Row> {
        let response = self
            .authed(
                self.http
                    .patch(self.rest_url(table))
                    .query(&[("id", format!("eq.{id}"))]),
            )
            .header("Prefer", "return=representation")
            .json(&Value::Object(fields))
            .send()
            .await?;
        let response = Self::check(response, false).await?.ok_or_else(|| {
            ClientError::Internal("update response vanished".into())
        })?;
        let mut values: Vec<Value> = response.json().await?;
        match values.pop() {
            Some(value) => Ok(row_from_value(value)?),
            None => Err(ClientError::NotFound(format!("row {id} in {table}"))),
        }
    }

    async fn delete(&self, table: &TableName, id: &RowId) -> ClientResult<()> {
        let response = self
            .authed(
                self.http
                    .delete(self.rest_url(table))
                    .query(&[("id", format!("eq.{id}"))]),
            )
            .send()
            .await?;
        // Deleting an absent row is a no-op.
        Self::check(response, true).await?;
        Ok(())
    }

    async fn count(&self, table: &TableName, filter: Option<&Filter>) -> ClientResult<u64> {
        let mut query: Vec<(&str, String)> = vec![("limit", "0".to_string())];
        if let Some(filter) = filter {
            query.push(("filter", filter.to_string()));
        }

        let response = self
            .authed(self.http.get(self.rest_url(table)).query(&query))
            .header("Prefer", "count=exact")
            .header("Range", "0-0")
            .send()
            .await?;
        let response = match Self::check(response, true).await? {
            Some(response) => response,
            None => return Ok(0),
        };

        // Total arrives as `Content-Range: 0-0/123`.
        let range = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        parse_content_range_total(range)
            .ok_or_else(|| ClientError::Internal(format!("bad content-range {range:?}")))
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{bucket}/{path}",
            self.base_url
        )
    }
}

fn derive_ws_url(base_url: &str) -> String {
    let ws_base = if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base_url.to_string()
    };
    format!("{ws_base}/realtime/v1/websocket")
}

fn parse_content_range_total(range: &str) -> Option<u64> {
    range.rsplit('/').next()?.trim().parse().ok()
}
