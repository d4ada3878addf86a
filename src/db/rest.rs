use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use std::time::Duration;

use super::{StatStore, StoreRow};
use crate::error::{Result, SyncError};

/// PostgREST table store (the REST interface Supabase exposes).
pub struct RestStore {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl RestStore {
    pub fn new(url: &str, api_key: &str) -> Result<Self> {
        let base_url = Url::parse(url)
            .map_err(|e| SyncError::connection(format!("invalid store URL '{}': {}", url, e)))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(SyncError::connection(format!("unsupported store URL scheme '{}'", base_url.scheme())));
        }
        if api_key.trim().is_empty() {
            return Err(SyncError::connection("empty store access key"));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SyncError::connection(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, base_url, api_key: api_key.to_string() })
    }

    pub fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url.as_str().trim_end_matches('/'), table)
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, self.table_url(table))
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    async fn rows(response: Response) -> Result<Vec<StoreRow>> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Store(format!("{}: {}", status, body)));
        }
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl StatStore for RestStore {
    fn name(&self) -> &'static str {
        "postgrest"
    }

    async fn ping(&self, table: &str) -> Result<()> {
        let response = self
            .request(Method::GET, table)
            .query(&[("select", "*"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| SyncError::connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::connection(format!("{} answered {}: {}", self.table_url(table), status, body)));
        }
        Ok(())
    }

    async fn upsert(&self, table: &str, rows: &[StoreRow], on_conflict: &str) -> Result<Vec<StoreRow>> {
        let response = self
            .request(Method::POST, table)
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(rows)
            .send()
            .await?;
        Self::rows(response).await
    }

    async fn insert(&self, table: &str, rows: &[StoreRow]) -> Result<Vec<StoreRow>> {
        let response = self
            .request(Method::POST, table)
            .header("Prefer", "return=representation")
            .json(rows)
            .send()
            .await?;
        Self::rows(response).await
    }

    async fn player_rows(&self, table: &str, player_id: &str) -> Result<Vec<StoreRow>> {
        let filter = format!("eq.{}", player_id);
        let response = self
            .request(Method::GET, table)
            .query(&[
                ("select", "*"),
                ("player_id", filter.as_str()),
                ("order", "season.desc,week.asc"),
            ])
            .send()
            .await?;
        Self::rows(response).await
    }
}
