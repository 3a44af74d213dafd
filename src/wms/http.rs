//! HTTP/JSON implementation of the WMS adapter

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::config::WmsEndpointConfig;

use super::{
    CreateTaskRequest, Page, WireTaskStatus, WmsAdapter, WmsBufferState, WmsCell, WmsError,
    WmsForklift, WmsPicker, WmsProduct, WmsTaskRow, WmsWorker, WmsZone,
};

/// Thin reqwest client over the WMS REST surface.
#[derive(Clone)]
pub struct HttpWmsAdapter {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpWmsAdapter {
    pub fn new(config: &WmsEndpointConfig) -> Result<Self, WmsError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(method, format!("{}{}", self.base_url, path));
        if !self.api_key.is_empty() {
            builder = builder.header("Authorization", format!("Bearer {}", self.api_key));
        }
        builder
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, WmsError> {
        let response = self.request(reqwest::Method::GET, path).send().await?;
        if !response.status().is_success() {
            return Err(WmsError::Server(response.status().as_u16()));
        }
        Ok(response.json().await?)
    }

    async fn paged<T: DeserializeOwned>(
        &self,
        resource: &str,
        after_id: i64,
        limit: usize,
    ) -> Result<Page<T>, WmsError> {
        self.get_json(&format!("/api/{resource}?after_id={after_id}&limit={limit}"))
            .await
    }

    async fn post_json<B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, WmsError> {
        let response = self
            .request(reqwest::Method::POST, path)
            .json(body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(WmsError::Server(response.status().as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl WmsAdapter for HttpWmsAdapter {
    async fn tasks_after(&self, after_id: i64, limit: usize) -> Result<Page<WmsTaskRow>, WmsError> {
        self.paged("tasks", after_id, limit).await
    }

    async fn workers_after(&self, after_id: i64, limit: usize) -> Result<Page<WmsWorker>, WmsError> {
        self.paged("workers", after_id, limit).await
    }

    async fn zones_after(&self, after_id: i64, limit: usize) -> Result<Page<WmsZone>, WmsError> {
        self.paged("zones", after_id, limit).await
    }

    async fn cells_after(&self, after_id: i64, limit: usize) -> Result<Page<WmsCell>, WmsError> {
        self.paged("cells", after_id, limit).await
    }

    async fn products_after(
        &self,
        after_id: i64,
        limit: usize,
    ) -> Result<Page<WmsProduct>, WmsError> {
        self.paged("products", after_id, limit).await
    }

    async fn current_pickers(&self) -> Result<Vec<WmsPicker>, WmsError> {
        self.get_json("/api/pickers/current").await
    }

    async fn current_forklifts(&self) -> Result<Vec<WmsForklift>, WmsError> {
        self.get_json("/api/forklifts/current").await
    }

    async fn buffer_state(&self) -> Result<WmsBufferState, WmsError> {
        self.get_json("/api/buffer/current").await
    }

    async fn create_task(&self, request: &CreateTaskRequest) -> Result<String, WmsError> {
        let response = self.post_json("/api/tasks", request).await?;
        #[derive(serde::Deserialize)]
        struct Created {
            task_id: String,
        }
        let created: Created = response.json().await?;
        Ok(created.task_id)
    }

    async fn update_task_status(
        &self,
        task_id: &str,
        status: WireTaskStatus,
    ) -> Result<(), WmsError> {
        self.post_json(
            &format!("/api/tasks/{task_id}/status"),
            &serde_json::json!({ "status": u8::from(status) }),
        )
        .await?;
        Ok(())
    }

    async fn confirm_pallet_delivered(&self, pallet_id: &str) -> Result<(), WmsError> {
        self.post_json(
            &format!("/api/pallets/{pallet_id}/delivered"),
            &serde_json::json!({}),
        )
        .await?;
        Ok(())
    }

    async fn confirm_pallet_consumed(&self, pallet_id: &str) -> Result<(), WmsError> {
        self.post_json(
            &format!("/api/pallets/{pallet_id}/consumed"),
            &serde_json::json!({}),
        )
        .await?;
        Ok(())
    }

    async fn update_forklift_status(&self, forklift_id: &str, state: &str) -> Result<(), WmsError> {
        self.post_json(
            &format!("/api/forklifts/{forklift_id}/status"),
            &serde_json::json!({ "state": state }),
        )
        .await?;
        Ok(())
    }
}
