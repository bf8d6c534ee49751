//! Supabase PostgREST implementation of [`RowClient`]

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;

use super::{RemoteError, RowClient};
use crate::session::Principal;
use crate::util::{is_http_url, normalize_text_option};

const UPSERT_PREFERENCE: &str = "resolution=merge-duplicates,return=minimal";

#[derive(Clone)]
pub struct PostgrestClient {
    rest_url: String,
    anon_key: String,
    client: Client,
}

impl PostgrestClient {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Result<Self, RemoteError> {
        let rest_url = normalize_rest_url(url.into())?;
        let anon_key = normalize_text_option(Some(anon_key.into())).ok_or_else(|| {
            RemoteError::Network("Supabase anon key must not be empty".to_string())
        })?;
        Ok(Self {
            rest_url,
            anon_key,
            client: Client::builder().build()?,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{table}", self.rest_url)
    }

    fn authorized(&self, request: RequestBuilder, principal: &Principal) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(&principal.access_token)
            .header("Accept", "application/json")
    }
}

#[async_trait]
impl RowClient for PostgrestClient {
    async fn fetch_rows(&self, principal: &Principal, table: &str) -> Result<Vec<Value>, RemoteError> {
        let owner = format!("eq.{}", principal.user_id);
        let response = self
            .authorized(self.client.get(self.table_url(table)), principal)
            .query(&[("select", "*"), ("user_id", owner.as_str())])
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(response.json::<Vec<Value>>().await?)
    }

    async fn upsert_rows(
        &self,
        principal: &Principal,
        table: &str,
        rows: Vec<Value>,
    ) -> Result<(), RemoteError> {
        if rows.is_empty() {
            return Ok(());
        }
        let response = self
            .authorized(self.client.post(self.table_url(table)), principal)
            .query(&[("on_conflict", "id")])
            .header("Prefer", UPSERT_PREFERENCE)
            .json(&rows)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn delete_row(&self, principal: &Principal, table: &str, id: &str) -> Result<(), RemoteError> {
        let filter = format!("eq.{id}");
        let response = self
            .authorized(self.client.delete(self.table_url(table)), principal)
            .query(&[("id", filter.as_str())])
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}

async fn ensure_success(response: Response) -> Result<Response, RemoteError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::from_response(status, &body))
}

fn normalize_rest_url(raw: String) -> Result<String, RemoteError> {
    let url = normalize_text_option(Some(raw))
        .ok_or_else(|| RemoteError::Network("Supabase URL must not be empty".to_string()))?;
    if !is_http_url(&url) {
        return Err(RemoteError::Network(
            "Supabase URL must include http:// or https://".to_string(),
        ));
    }
    let url = url.trim_end_matches('/');
    if url.ends_with("/rest/v1") {
        Ok(url.to_string())
    } else {
        Ok(format!("{url}/rest/v1"))
    }
}
