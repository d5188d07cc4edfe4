// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use std::time::Duration;
use tracing::{error, info, warn};
use url::Url;

use crate::backup::traits::{BackupAck, BackupClient};
use crate::error::{SyncError, SyncResult};

const BACKUP_PATH: &str = "backup";

/// Backup endpoint reached over HTTP.
///
/// `PUT {base}/backup` stores a snapshot, `GET {base}/backup` returns the latest one.
#[derive(Debug, Clone)]
pub struct HttpBackupClient {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpBackupClient {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let mut base = Url::parse(base_url)?;
        match base.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(anyhow::anyhow!(
                    "Invalid backup URL scheme: {} (only http and https are allowed)",
                    scheme
                ));
            }
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base.join(BACKUP_PATH)?;

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("GarageSyncDaemon/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn build_request(&self, method: Method) -> reqwest::RequestBuilder {
        let mut request = self.client.request(method, self.endpoint.clone());

        if let Some(ref key) = self.api_key {
            request = request.header(AUTHORIZATION, format!("Bearer {}", key));
        }

        request
    }
}

#[async_trait]
impl BackupClient for HttpBackupClient {
    async fn push(&self, snapshot: &str) -> SyncResult<BackupAck> {
        info!(bytes = snapshot.len(), endpoint = %self.endpoint, "Pushing snapshot to backup endpoint");

        let response = self
            .build_request(Method::PUT)
            .header(CONTENT_TYPE, "application/json")
            .body(snapshot.to_string())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!(status = %status, body = %text, "Backup endpoint rejected snapshot");
            return Err(SyncError::RemoteRejected {
                status: status.as_u16(),
                body: text,
            });
        }

        info!(status = %status, "Snapshot stored on backup endpoint");
        Ok(BackupAck {
            status: status.as_u16(),
            bytes: snapshot.len(),
        })
    }

    async fn pull(&self) -> SyncResult<String> {
        info!(endpoint = %self.endpoint, "Pulling snapshot from backup endpoint");

        let response = self.build_request(Method::GET).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            warn!("No snapshot stored on backup endpoint");
            return Err(SyncError::NotFound);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!(status = %status, body = %text, "Backup endpoint refused pull");
            return Err(SyncError::RemoteRejected {
                status: status.as_u16(),
                body: text,
            });
        }

        let text = response.text().await?;
        info!(bytes = text.len(), "Pulled snapshot from backup endpoint");
        Ok(text)
    }
}
