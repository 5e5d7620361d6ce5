/// External API clients module
use crate::domain::{EpicAsset, EpicImage, Rover, RoverPhoto, RoverPhotosResponse, Sol, Apod};
use crate::errors::{ApiError, ApiResult};
use axum::body::Bytes;
use chrono::NaiveDate;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// HTTP client wrapper with common configuration
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("nasa-viewer/0.1")
            .build()?;
        Ok(Self { client })
    }

    pub fn get_client(&self) -> &Client {
        &self.client
    }
}

/// Client for the api.nasa.gov family of endpoints
///
/// Every request carries the configured key as the `api_key` query
/// parameter. Bodies are decoded into typed records; a body that does not
/// match is reported as `ApiError::Decode`.
pub struct NasaClient {
    http_client: HttpClient,
    base_url: String,
    api_key: String,
}

impl NasaClient {
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> ApiResult<Self> {
        Ok(Self {
            http_client: HttpClient::new(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Fetch the Astronomy Picture of the Day; `None` means today
    pub async fn fetch_apod(&self, date: Option<NaiveDate>) -> ApiResult<Apod> {
        let mut query = Vec::new();
        if let Some(d) = date {
            query.push(("date", d.to_string()));
        }
        self.get_json("/planetary/apod", &query).await
    }

    /// Fetch all photos a rover took on one sol
    pub async fn fetch_rover_photos(&self, rover: Rover, sol: Sol) -> ApiResult<Vec<RoverPhoto>> {
        let path = format!("/mars-photos/api/v1/rovers/{}/photos", rover);
        let resp: RoverPhotosResponse = self.get_json(&path, &[("sol", sol.to_string())]).await?;
        Ok(resp.photos)
    }

    /// Fetch the days that have EPIC natural-color imagery
    pub async fn fetch_epic_available(&self) -> ApiResult<Vec<NaiveDate>> {
        self.get_json("/EPIC/api/natural/available", &[]).await
    }

    /// Fetch metadata of every EPIC capture on `date`
    pub async fn fetch_epic_by_date(&self, date: NaiveDate) -> ApiResult<Vec<EpicImage>> {
        let path = format!("/EPIC/api/natural/date/{}", date);
        self.get_json(&path, &[]).await
    }

    /// Archive URL of a capture's full PNG or JPEG thumbnail, without the key
    pub fn epic_image_url(&self, image: &EpicImage, asset: EpicAsset) -> String {
        let (dir, ext) = match asset {
            EpicAsset::Full => ("png", "png"),
            EpicAsset::Thumbnail => ("thumbs", "jpg"),
        };
        format!(
            "{}/EPIC/archive/natural/{}/{}/{}.{}",
            self.base_url,
            image.date.format("%Y/%m/%d"),
            dir,
            image.image,
            ext
        )
    }

    /// Download an image asset; the key is only added to the outgoing request
    pub async fn fetch_bytes(&self, url: &str) -> ApiResult<Bytes> {
        let resp = self
            .http_client
            .get_client()
            .get(url)
            .query(&[("api_key", &self.api_key)])
            .send()
            .await?;
        let resp = check_status(resp, url.to_string())?;
        Ok(resp.bytes().await?)
    }

    /// Fetch a Landsat image of the given coordinates
    pub async fn fetch_earth_imagery(&self, date: NaiveDate, lat: f64, lon: f64) -> ApiResult<Bytes> {
        let url = format!("{}/planetary/earth/imagery", self.base_url);
        let resp = self
            .http_client
            .get_client()
            .get(&url)
            .query(&[
                ("lon", lon.to_string()),
                ("lat", lat.to_string()),
                ("date", date.to_string()),
                ("api_key", self.api_key.clone()),
            ])
            .send()
            .await?;
        let resp = check_status(resp, url)?;
        Ok(resp.bytes().await?)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> ApiResult<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let resp = self
            .http_client
            .get_client()
            .get(&url)
            .query(query)
            .query(&[("api_key", &self.api_key)])
            .send()
            .await?;
        let resp = check_status(resp, url)?;

        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

}

fn check_status(resp: Response, url: String) -> ApiResult<Response> {
    let status = resp.status();
    if !status.is_success() {
        return Err(ApiError::UpstreamStatus {
            status: status.as_u16(),
            url,
        });
    }
    Ok(resp)
}
