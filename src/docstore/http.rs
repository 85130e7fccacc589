//! REST-backed document store.
//!
//! Talks to a plain document API: merge-upsert `PUT`, collection `POST`,
//! paginated id listing and batched deletes. The importer stays agnostic of
//! the concrete backend; anything speaking this surface works.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

use super::DocumentStore;
use crate::error::{DocStoreError, DocStoreResult};

/// Page size used while listing collection ids.
const LIST_PAGE_SIZE: usize = 50;

/// Ids deleted per batch commit.
const DELETE_BATCH_SIZE: usize = 100;

/// Document store client over HTTP.
pub struct HttpDocumentStore {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListIdsResponse {
    #[serde(default)]
    ids: Vec<String>,
    #[serde(default)]
    next_page_token: Option<String>,
}

impl HttpDocumentStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .expect("reqwest client");
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token: None,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    fn document_url(&self, path: &str) -> String {
        format!("{}/documents/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn expect_success(response: reqwest::Response) -> DocStoreResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(DocStoreError::Rejected(format!("{status}: {body}")))
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn save(&self, path: &str, doc: Value) -> DocStoreResult<()> {
        if doc.as_object().map(Map::is_empty).unwrap_or(true) {
            return Ok(());
        }
        let response = self
            .request(self.client.put(self.document_url(path)))
            .query(&[("merge", "true")])
            .json(&doc)
            .send()
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn add(&self, path: &str, doc: Value) -> DocStoreResult<()> {
        if doc.as_object().map(Map::is_empty).unwrap_or(true) {
            return Ok(());
        }
        let response = self
            .request(self.client.post(self.document_url(path)))
            .json(&doc)
            .send()
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn list_ids(&self, collection: &str) -> DocStoreResult<Vec<String>> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .request(self.client.get(self.document_url(collection)))
                .query(&[("pageSize", LIST_PAGE_SIZE.to_string())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }
            let response = Self::expect_success(request.send().await?).await?;
            let page: ListIdsResponse = response.json().await?;
            ids.extend(page.ids);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(ids)
    }

    async fn delete_by_ids(&self, collection: &str, ids: &[String]) -> DocStoreResult<()> {
        for batch in ids.chunks(DELETE_BATCH_SIZE) {
            let response = self
                .request(
                    self.client
                        .post(format!("{}:batchDelete", self.document_url(collection))),
                )
                .json(&serde_json::json!({ "ids": batch }))
                .send()
                .await?;
            Self::expect_success(response).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_url_normalization() {
        let store = HttpDocumentStore::new("https://docs.example.com/");
        assert_eq!(
            store.document_url("/languages/en/venues/v1"),
            "https://docs.example.com/documents/languages/en/venues/v1"
        );
    }

    #[test]
    fn test_list_response_decoding() {
        let page: ListIdsResponse =
            serde_json::from_str(r#"{ "ids": ["a", "b"], "nextPageToken": "t1" }"#).unwrap();
        assert_eq!(page.ids, vec!["a", "b"]);
        assert_eq!(page.next_page_token.as_deref(), Some("t1"));

        let last: ListIdsResponse = serde_json::from_str(r#"{ "ids": [] }"#).unwrap();
        assert!(last.ids.is_empty());
        assert!(last.next_page_token.is_none());
    }
}
