// src/directory/web.rs
use async_trait::async_trait;

use crate::directory::{DirectoryError, DirectorySession};
use crate::models::server::{Endpoint, Region};

/// Directory adapter speaking HTTP+JSON against a configured base URL. The
/// upstream is expected to answer `GET <base>?appId=..&region=..&filter=..&
/// maxResults=..` with a JSON array of `{"ip": .., "port": ..}` objects.
pub struct WebDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl WebDirectory {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl DirectorySession for WebDirectory {
    async fn query(
        &self,
        app_id: u32,
        region: Region,
        filter: Option<&str>,
        max_results: usize,
    ) -> Result<Vec<Endpoint>, DirectoryError> {
        let mut request = self.client.get(&self.base_url).query(&[
            ("appId", app_id.to_string()),
            ("region", region.as_str().to_string()),
            ("maxResults", max_results.to_string()),
        ]);
        if let Some(filter) = filter {
            request = request.query(&[("filter", filter)]);
        }

        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| DirectoryError::Transport(e.to_string()))?;

        let mut candidates: Vec<Endpoint> = response
            .json()
            .await
            .map_err(|e| DirectoryError::Decode(e.to_string()))?;
        candidates.truncate(max_results);
        Ok(candidates)
    }

    async fn heartbeat(&self) -> Result<(), DirectoryError> {
        self.client
            .get(&self.base_url)
            .query(&[("maxResults", "0")])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| DirectoryError::Transport(e.to_string()))?;
        Ok(())
    }
}
