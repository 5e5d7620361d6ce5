/// HTTP request handlers
use crate::clients::NasaClient;
use crate::domain::{Apod, EpicAsset, Health, Rover};
use crate::errors::{ApiError, ApiResult};
use crate::services::{ApodService, ApodView, EpicService, EpicView, RecentView, RoverService, RoverView};
use crate::utils::{parse_day, today};
use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Longest a `?wait=true` read blocks before answering with the pending view
const WAIT_LIMIT: Duration = Duration::from_secs(30);

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub apod_service: Arc<ApodService>,
    pub rover_service: Arc<RoverService>,
    pub epic_service: Arc<EpicService>,
    pub nasa_client: Arc<NasaClient>,
}

/// Successful response wrapper
#[derive(Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub ok: bool,
    #[serde(flatten)]
    pub data: T,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self { ok: true, data }
    }
}

type JsonResult<T> = Result<Json<SuccessResponse<T>>, ApiError>;

fn ok<T: Serialize>(data: T) -> JsonResult<T> {
    Ok(Json(SuccessResponse::new(data)))
}

#[derive(Debug, Default, Deserialize)]
pub struct ViewQuery {
    #[serde(default)]
    pub wait: bool,
    pub days: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct DateBody {
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RoverBody {
    pub rover: String,
}

#[derive(Debug, Deserialize)]
pub struct SolBody {
    pub sol: i64,
}

#[derive(Debug, Deserialize)]
pub struct EpicImageQuery {
    pub index: Option<usize>,
    pub asset: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImageryQuery {
    pub date: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

fn parse_optional_day(raw: Option<&str>) -> ApiResult<Option<NaiveDate>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => parse_day(s)
            .map(Some)
            .ok_or_else(|| ApiError::InvalidInput(format!("'{}' is not a YYYY-MM-DD date", s))),
    }
}

/// Settle within `WAIT_LIMIT` or fall back to the current snapshot.
///
/// `current` is only polled when the settled view is not used.
async fn wait_or<T, S, C>(wait: bool, settled: S, current: C) -> T
where
    S: Future<Output = T>,
    C: Future<Output = T>,
{
    if !wait {
        return current.await;
    }
    match tokio::time::timeout(WAIT_LIMIT, settled).await {
        Ok(view) => view,
        Err(_) => {
            warn!("View did not settle within {:?}", WAIT_LIMIT);
            current.await
        }
    }
}

/// Health check handler
pub async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        now: Utc::now(),
    })
}

/// Picture-of-the-day view
pub async fn get_apod(
    State(state): State<AppState>,
    Query(q): Query<ViewQuery>,
) -> JsonResult<ApodView> {
    let svc = &state.apod_service;
    ok(wait_or(q.wait, svc.settled_view(), svc.view()).await)
}

/// Pick a day, or today when `date` is null
pub async fn select_apod_date(
    State(state): State<AppState>,
    Json(body): Json<DateBody>,
) -> JsonResult<ApodView> {
    let date = parse_optional_day(body.date.as_deref())?;
    state.apod_service.select_date(date)?;
    ok(state.apod_service.view().await)
}

/// Jump to a random day of the archive
pub async fn select_random_apod(State(state): State<AppState>) -> JsonResult<ApodView> {
    state.apod_service.select_random()?;
    ok(state.apod_service.view().await)
}

/// Recent pictures fan-out state
pub async fn get_recent_apod(
    State(state): State<AppState>,
    Query(q): Query<ViewQuery>,
) -> JsonResult<RecentView> {
    let svc = &state.apod_service;
    if let Some(days) = q.days {
        svc.load_recent(days);
    }
    let view = wait_or(q.wait, svc.settled_recent_view(), async { svc.recent_view() }).await;
    ok(view)
}

/// Re-issue the recent pictures fan-out
pub async fn refresh_recent_apod(
    State(state): State<AppState>,
    Query(q): Query<ViewQuery>,
) -> JsonResult<RecentView> {
    let svc = &state.apod_service;
    svc.load_recent(q.days.unwrap_or_else(|| svc.recent_view().days));
    ok(svc.recent_view())
}

/// Toggle the loaded picture in the favorites list
pub async fn toggle_apod_favorite(State(state): State<AppState>) -> JsonResult<Value> {
    let favorite = state.apod_service.toggle_favorite().await?;
    ok(serde_json::json!({ "favorite": favorite }))
}

/// List favorites in insertion order
pub async fn list_favorites(State(state): State<AppState>) -> JsonResult<Value> {
    let items = state.apod_service.favorites().list().await;
    ok(serde_json::json!({ "items": items }))
}

/// Add a picture record to favorites
pub async fn add_favorite(State(state): State<AppState>, Json(apod): Json<Apod>) -> JsonResult<Value> {
    let added = state.apod_service.favorites().add(apod).await?;
    ok(serde_json::json!({ "added": added }))
}

/// Remove one favorite by its date
pub async fn remove_favorite(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> JsonResult<Value> {
    let date = parse_day(&date)
        .ok_or_else(|| ApiError::InvalidInput(format!("'{}' is not a YYYY-MM-DD date", date)))?;
    let removed = state.apod_service.favorites().remove(date).await?;
    ok(serde_json::json!({ "removed": removed }))
}

/// Remove all favorites
pub async fn clear_favorites(State(state): State<AppState>) -> JsonResult<Value> {
    let removed = state.apod_service.favorites().clear().await?;
    ok(serde_json::json!({ "removed": removed }))
}

/// Mars rover gallery view
pub async fn get_rover(
    State(state): State<AppState>,
    Query(q): Query<ViewQuery>,
) -> JsonResult<RoverView> {
    let svc = &state.rover_service;
    ok(wait_or(q.wait, svc.settled_view(), async { svc.view() }).await)
}

pub async fn select_rover(
    State(state): State<AppState>,
    Json(body): Json<RoverBody>,
) -> JsonResult<RoverView> {
    let rover: Rover = body.rover.parse().map_err(ApiError::InvalidInput)?;
    state.rover_service.select_rover(rover);
    ok(state.rover_service.view())
}

pub async fn set_rover_sol(
    State(state): State<AppState>,
    Json(body): Json<SolBody>,
) -> JsonResult<RoverView> {
    state.rover_service.set_sol(body.sol);
    ok(state.rover_service.view())
}

pub async fn focus_rover_photo(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> JsonResult<RoverView> {
    state.rover_service.focus_photo(id)?;
    ok(state.rover_service.view())
}

pub async fn clear_rover_focus(State(state): State<AppState>) -> JsonResult<RoverView> {
    state.rover_service.clear_focus();
    ok(state.rover_service.view())
}

/// EPIC gallery view
pub async fn get_epic(
    State(state): State<AppState>,
    Query(q): Query<ViewQuery>,
) -> JsonResult<EpicView> {
    let svc = &state.epic_service;
    ok(wait_or(q.wait, svc.settled_view(), async { svc.view() }).await)
}

pub async fn select_epic_date(
    State(state): State<AppState>,
    Json(body): Json<DateBody>,
) -> JsonResult<EpicView> {
    let date = parse_optional_day(body.date.as_deref())?;
    state.epic_service.select_date(date)?;
    ok(state.epic_service.view())
}

pub async fn next_epic(State(state): State<AppState>) -> JsonResult<EpicView> {
    state.epic_service.next()?;
    ok(state.epic_service.view())
}

pub async fn previous_epic(State(state): State<AppState>) -> JsonResult<EpicView> {
    state.epic_service.previous()?;
    ok(state.epic_service.view())
}

pub async fn focus_epic(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> JsonResult<EpicView> {
    state.epic_service.select(index)?;
    ok(state.epic_service.view())
}

pub async fn clear_epic_focus(State(state): State<AppState>) -> JsonResult<EpicView> {
    state.epic_service.clear_focus();
    ok(state.epic_service.view())
}

/// Main PNG of the current EPIC capture
pub async fn epic_image(
    State(state): State<AppState>,
    Query(q): Query<EpicImageQuery>,
) -> Result<Response, ApiError> {
    let asset = match q.asset.as_deref() {
        None | Some("full") => EpicAsset::Full,
        Some("thumbnail") => EpicAsset::Thumbnail,
        Some(other) => {
            return Err(ApiError::InvalidInput(format!(
                "asset '{}' is not one of full, thumbnail",
                other
            )))
        }
    };
    let content_type = match asset {
        EpicAsset::Full => "image/png",
        EpicAsset::Thumbnail => "image/jpeg",
    };

    let bytes = state.epic_service.image(q.index, asset).await?;
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

/// Landsat imagery passthrough for a coordinate
pub async fn earth_imagery(
    State(state): State<AppState>,
    Query(q): Query<ImageryQuery>,
) -> Result<Response, ApiError> {
    let date = parse_optional_day(q.date.as_deref())?.unwrap_or_else(today);
    let lat = q.lat.unwrap_or(29.78);
    let lon = q.lon.unwrap_or(-95.33);
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(ApiError::InvalidInput(format!(
            "coordinates ({}, {}) are out of range",
            lat, lon
        )));
    }

    let bytes = state.nasa_client.fetch_earth_imagery(date, lat, lon).await?;
    Ok(([(header::CONTENT_TYPE, "image/png")], bytes).into_response())
}

/// Re-issue every view's current load
pub async fn reload_all(State(state): State<AppState>) -> JsonResult<Value> {
    state.apod_service.reload();
    state.rover_service.reload();
    state.epic_service.reload();
    info!("Reloaded all views");
    ok(serde_json::json!({ "reloaded": ["apod", "rover", "epic"] }))
}
