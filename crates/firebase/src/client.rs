use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use firebridge_core::{record_url, CommandRecord, ResponseRecord, ResponseUpdate};

use crate::config::FirebaseConfig;
use crate::store::{StateStore, StoreError};

/// Realtime Database client speaking the REST API (`{base}/{path}.json`).
#[derive(Clone)]
pub struct FirebaseStore {
    http: Client,
    config: FirebaseConfig,
}

impl FirebaseStore {
    pub fn new(config: FirebaseConfig) -> Result<Self, StoreError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &FirebaseConfig {
        &self.config
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = record_url(&self.config.database_url, path);
        let mut req = self.http.request(method, url);
        if let Some(token) = &self.config.auth_token {
            req = req.query(&[("auth", token.as_str())]);
        }
        if let Some(ns) = &self.config.namespace {
            req = req.query(&[("ns", ns.as_str())]);
        }
        req
    }

    async fn read<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, StoreError> {
        let resp = self.request(Method::GET, path).send().await?;
        let body = check_status(resp).await?;
        debug!(path, %body, "Store read");
        Ok(serde_json::from_str::<Option<T>>(&body)?)
    }

    async fn write<B: serde::Serialize + ?Sized>(&self, method: Method, path: &str, body: &B) -> Result<(), StoreError> {
        // print=silent: the server answers 204 instead of echoing the written data
        let resp = self
            .request(method, path)
            .query(&[("print", "silent")])
            .json(body)
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }
}

async fn check_status(resp: reqwest::Response) -> Result<String, StoreError> {
    let status = resp.status();
    let body = resp.text().await?;
    if status.is_success() {
        Ok(body)
    } else {
        warn!(status = status.as_u16(), %body, "Store request rejected");
        Err(StoreError::Status { status: status.as_u16(), body })
    }
}

#[async_trait]
impl StateStore for FirebaseStore {
    async fn get_command(&self) -> Result<Option<CommandRecord>, StoreError> {
        self.read(&self.config.commands_path).await
    }

    async fn set_command(&self, record: &CommandRecord) -> Result<(), StoreError> {
        self.write(Method::PUT, &self.config.commands_path, record).await
    }

    async fn update_response(&self, update: &ResponseUpdate) -> Result<(), StoreError> {
        if update.is_empty() {
            return Ok(());
        }
        self.write(Method::PATCH, &self.config.response_path, update).await
    }

    async fn get_response(&self) -> Result<ResponseRecord, StoreError> {
        Ok(self.read(&self.config.response_path).await?.unwrap_or_default())
    }
}
