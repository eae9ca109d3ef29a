use crate::{DocumentStore, Row, Selection};
use chrono::{DateTime, Utc};
use recall_core::Result;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// HTTP client for an external document store. One POST per operation; the
/// endpoint answers with `{"rows": [...]}`. The timeout is short because a
/// slow store is handled the same way as a dead one: fail over.
pub struct RemoteStore {
    endpoint: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct RemoteResponse {
    #[serde(default)]
    rows: Vec<RemoteRow>,
    #[serde(default)]
    removed: usize,
    #[serde(default)]
    ok: bool,
}

#[derive(Debug, Deserialize)]
struct RemoteRow {
    id: String,
    table: String,
    created_at: DateTime<Utc>,
    data: serde_json::Value,
    #[serde(default)]
    score: f32,
}

impl RemoteRow {
    fn into_row(self) -> (Row, f32) {
        let score = self.score;
        (
            Row {
                id: self.id,
                table: self.table,
                created_at: self.created_at,
                data: self.data,
            },
            score,
        )
    }
}

impl RemoteStore {
    pub fn connect(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            client,
        })
    }

    fn call(&self, body: serde_json::Value) -> Result<RemoteResponse> {
        let response = self.client.post(&self.endpoint).json(&body).send()?;
        let response = response.error_for_status()?;
        Ok(response.json()?)
    }

    fn single_row(&self, body: serde_json::Value) -> Result<Row> {
        let mut response = self.call(body)?;
        if response.rows.is_empty() {
            return Err(anyhow::anyhow!("remote store returned no rows"));
        }
        Ok(response.rows.remove(0).into_row().0)
    }
}

impl DocumentStore for RemoteStore {
    fn create(&self, table: &str, record: serde_json::Value) -> Result<Row> {
        self.single_row(json!({"op": "create", "table": table, "record": record}))
    }

    fn select(&self, table: &str, selection: &Selection) -> Result<Vec<Row>> {
        let response = self.call(json!({
            "op": "select",
            "table": table,
            "selection": selection,
        }))?;
        Ok(response
            .rows
            .into_iter()
            .map(|row| row.into_row().0)
            .collect())
    }

    fn update(&self, table: &str, id: &str, record: serde_json::Value) -> Result<Row> {
        self.single_row(json!({"op": "update", "table": table, "id": id, "record": record}))
    }

    fn delete_before(&self, table: &str, cutoff: DateTime<Utc>) -> Result<usize> {
        let response = self.call(json!({
            "op": "delete_before",
            "table": table,
            "cutoff": cutoff,
        }))?;
        Ok(response.removed)
    }

    fn health_check(&self) -> bool {
        self.call(json!({"op": "health"}))
            .map(|r| r.ok)
            .unwrap_or(false)
    }

    fn similarity(&self, table: &str, query: &[f32], k: usize) -> Result<Vec<(Row, f32)>> {
        let response = self.call(json!({
            "op": "similarity",
            "table": table,
            "query": query,
            "k": k,
        }))?;
        Ok(response
            .rows
            .into_iter()
            .map(RemoteRow::into_row)
            .collect())
    }
}
