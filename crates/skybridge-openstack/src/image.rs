//! Image adapter

use crate::http::{ApiClient, Subject};
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use skybridge_cloud::{ImageService, RemoteImage, Result, ServiceType, Session};

/// Image service client
pub struct ImageClient {
    api: ApiClient,
}

impl ImageClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Catalog entries for the image service usually omit the API version
    fn url(session: &Session, path: &str) -> Result<String> {
        let base = session.endpoint(ServiceType::Image)?;
        if base.ends_with("/v2") {
            Ok(format!("{}{}", base, path))
        } else {
            Ok(format!("{}/v2{}", base, path))
        }
    }

    async fn list(&self, session: &Session, name: Option<&str>) -> Result<Vec<RemoteImage>> {
        let url = Self::url(session, "/images")?;
        let mut builder = self.api.request(Method::GET, &url);
        if let Some(name) = name {
            builder = builder.query(&[("name", name)]);
        }

        let reply = self
            .api
            .execute(builder, Some(&session.token), Subject::new("image", name.unwrap_or("*")))
            .await?;
        let response: ImagesEnvelope = reply.json()?;

        Ok(response.images.into_iter().map(RemoteImage::from).collect())
    }
}

#[async_trait]
impl ImageService for ImageClient {
    async fn get_image(&self, session: &Session, image_id: &str) -> Result<RemoteImage> {
        let url = Self::url(session, &format!("/images/{}", image_id))?;
        let reply = self
            .api
            .execute(
                self.api.request(Method::GET, &url),
                Some(&session.token),
                Subject::new("image", image_id),
            )
            .await?;

        let image: ApiImage = reply.json()?;
        Ok(image.into())
    }

    async fn find_images_by_name(&self, session: &Session, name: &str) -> Result<Vec<RemoteImage>> {
        let images = self.list(session, Some(name)).await?;
        Ok(images
            .into_iter()
            .filter(|i| i.name.as_deref() == Some(name))
            .collect())
    }

    async fn list_images(&self, session: &Session) -> Result<Vec<RemoteImage>> {
        self.list(session, None).await
    }

    async fn delete_image(&self, session: &Session, image_id: &str) -> Result<()> {
        let url = Self::url(session, &format!("/images/{}", image_id))?;
        self.api
            .execute(
                self.api.request(Method::DELETE, &url),
                Some(&session.token),
                Subject::new("image", image_id),
            )
            .await?;
        Ok(())
    }
}

// ============ API Types ============

#[derive(Debug, Deserialize)]
struct ImagesEnvelope {
    #[serde(default)]
    images: Vec<ApiImage>,
}

#[derive(Debug, Deserialize)]
struct ApiImage {
    id: String,
    name: Option<String>,
    status: String,
}

impl From<ApiImage> for RemoteImage {
    fn from(image: ApiImage) -> Self {
        Self {
            id: image.id,
            name: image.name,
            status: image.status,
        }
    }
}
