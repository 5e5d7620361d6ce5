use super::{EPIC_IMAGE_PATH, RELOAD_PATH};
use crate::cache::BoundedCache;
use crate::clients::NasaClient;
use crate::domain::{Centroid, EpicAsset, EpicImage, Position, EPIC_FIRST_DATE};
use crate::errors::{ApiError, ApiResult};
use crate::loader::{LoadState, Loader};
use crate::utils::{in_range, today, wrap_next, wrap_prev};
use axum::body::Bytes;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::debug;

pub const EPIC_LOADING: &str = "Loading Earth images...";
pub const EPIC_FAILED: &str = "Failed to fetch EPIC imagery. Please try again later.";
pub const EPIC_EMPTY: &str = "No images available for this date";

#[derive(Debug, Serialize)]
pub struct EpicView {
    pub selected_date: Option<NaiveDate>,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub loading_message: &'static str,
    pub reload_path: &'static str,
    #[serde(flatten)]
    pub state: LoadState<EpicGallery>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EpicGallery {
    Images {
        date: NaiveDate,
        count: usize,
        index: usize,
        focused: bool,
        current: EpicFrame,
        /// Withheld until the current main image has been delivered
        thumbnails: Option<Vec<EpicFrame>>,
    },
    NoImages {
        date: NaiveDate,
        message: &'static str,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct EpicFrame {
    pub index: usize,
    pub identifier: String,
    pub caption: String,
    pub captured_at: NaiveDateTime,
    pub centroid: Centroid,
    pub sun_position: Position,
    pub image_url: String,
    pub thumbnail_url: String,
}

/// One day's captures, in upstream order without duplicate identifiers
#[derive(Debug, Clone)]
pub struct EpicDay {
    pub date: NaiveDate,
    pub images: Vec<EpicImage>,
}

struct EpicParams {
    date: Option<NaiveDate>,
    index: usize,
    focused: bool,
    main_loaded: bool,
}

/// Earth imagery view model with circular navigation
pub struct EpicService {
    client: Arc<NasaClient>,
    days: Arc<BoundedCache<NaiveDate, Vec<EpicImage>>>,
    images: Arc<BoundedCache<String, Bytes>>,
    params: Mutex<EpicParams>,
    day: Arc<Loader<EpicDay>>,
}

impl EpicService {
    pub fn new(client: Arc<NasaClient>, cache_capacity: usize, image_capacity: usize) -> Self {
        Self {
            client,
            days: Arc::new(BoundedCache::new("epic-day", cache_capacity)),
            images: Arc::new(BoundedCache::new("epic-image", image_capacity)),
            params: Mutex::new(EpicParams {
                date: None,
                index: 0,
                focused: false,
                main_loaded: false,
            }),
            day: Arc::new(Loader::new("epic", EPIC_FAILED)),
        }
    }

    /// Show the captures of `date`, or of the newest available day
    pub fn select_date(&self, date: Option<NaiveDate>) -> ApiResult<()> {
        if let Some(d) = date {
            let last = today();
            if !in_range(d, EPIC_FIRST_DATE, last) {
                return Err(ApiError::InvalidInput(format!(
                    "date {} is outside {}..={}",
                    d, EPIC_FIRST_DATE, last
                )));
            }
        }

        let mut params = self.lock();
        *params = EpicParams {
            date,
            index: 0,
            focused: false,
            main_loaded: false,
        };
        self.start(date);
        Ok(())
    }

    pub fn next(&self) -> ApiResult<usize> {
        self.step(wrap_next)
    }

    pub fn previous(&self) -> ApiResult<usize> {
        self.step(wrap_prev)
    }

    fn step(&self, f: fn(usize, usize) -> usize) -> ApiResult<usize> {
        let (_, day) = self.loaded_day()?;
        let mut params = self.lock();
        params.index = f(params.index, day.images.len());
        params.main_loaded = false;
        let index = params.index;
        drop(params);

        self.prefetch_neighbors(&day, index);
        Ok(index)
    }

    /// Open the focus view on one capture
    pub fn select(&self, index: usize) -> ApiResult<()> {
        let (_, day) = self.loaded_day()?;
        if index >= day.images.len() {
            return Err(ApiError::NotFound(format!(
                "image {} of {} does not exist",
                index,
                day.images.len()
            )));
        }

        let mut params = self.lock();
        if params.index != index {
            params.index = index;
            params.main_loaded = false;
        }
        params.focused = true;
        Ok(())
    }

    pub fn clear_focus(&self) {
        self.lock().focused = false;
    }

    /// Deliver the main image for the current index.
    ///
    /// Marks the main image as loaded, which releases the thumbnail strip,
    /// and warms the cache with both neighbours.
    pub async fn current_image(&self) -> ApiResult<Bytes> {
        let (generation, day) = self.loaded_day()?;
        let index = self.lock().index.min(day.images.len() - 1);
        let image = &day.images[index];

        let bytes = self.fetch_image(image, EpicAsset::Full).await?;

        {
            let mut params = self.lock();
            if params.index == index && self.day.generation() == generation {
                params.main_loaded = true;
            }
        }
        self.prefetch_neighbors(&day, index);
        Ok(bytes)
    }

    /// Deliver one rendition of capture `index`, or the current main image.
    ///
    /// Only the main image of the current index counts as delivered for the
    /// thumbnail strip.
    pub async fn image(&self, index: Option<usize>, asset: EpicAsset) -> ApiResult<Bytes> {
        let current = self.lock().index;
        if asset == EpicAsset::Full && index.map_or(true, |i| i == current) {
            return self.current_image().await;
        }

        let (_, day) = self.loaded_day()?;
        let index = index.unwrap_or(current);
        let image = day.images.get(index).ok_or_else(|| {
            ApiError::NotFound(format!("image {} of {} does not exist", index, day.images.len()))
        })?;
        self.fetch_image(image, asset).await
    }

    async fn fetch_image(&self, image: &EpicImage, asset: EpicAsset) -> ApiResult<Bytes> {
        let url = self.client.epic_image_url(image, asset);
        let client = self.client.clone();
        self.images
            .get_or_fetch(url.clone(), || async move { client.fetch_bytes(&url).await })
            .await
    }

    fn prefetch_neighbors(&self, day: &EpicDay, index: usize) {
        let len = day.images.len();
        let mut targets = vec![wrap_prev(index, len), wrap_next(index, len)];
        targets.dedup();
        targets.retain(|&i| i != index);

        for i in targets {
            let image = day.images[i].clone();
            let url = self.client.epic_image_url(&image, EpicAsset::Full);
            let client = self.client.clone();
            let cache = self.images.clone();
            tokio::spawn(async move {
                let result = cache
                    .get_or_fetch(url.clone(), || async move { client.fetch_bytes(&url).await })
                    .await;
                if let Err(e) = result {
                    debug!("Prefetch of {} failed: {}", image.image, e);
                }
            });
        }
    }

    fn loaded_day(&self) -> ApiResult<(u64, EpicDay)> {
        match self.day.snapshot_with_generation() {
            (generation, LoadState::Ready(day)) if !day.images.is_empty() => Ok((generation, day)),
            _ => Err(ApiError::InvalidInput("no EPIC images are loaded".into())),
        }
    }

    pub fn reload(&self) {
        let mut params = self.lock();
        params.main_loaded = false;
        self.start(params.date);
    }

    /// Without a date the newest day is looked up again on every load
    fn start(&self, date: Option<NaiveDate>) {
        let client = self.client.clone();
        let days = self.days.clone();

        self.day.load(async move {
            let date = match date {
                Some(d) => d,
                None => {
                    let dates = client.fetch_epic_available().await?;
                    dates
                        .into_iter()
                        .max()
                        .ok_or_else(|| ApiError::NotFound("no EPIC dates are available".into()))?
                }
            };

            let images = days
                .get_or_fetch(date, || client.fetch_epic_by_date(date))
                .await?;
            Ok(EpicDay {
                date,
                images: dedup_by_identifier(images),
            })
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EpicParams> {
        self.params.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn view(&self) -> EpicView {
        if self.day.is_idle() {
            let params = self.lock();
            if self.day.is_idle() {
                self.start(params.date);
            }
        }
        self.render(self.day.snapshot())
    }

    pub async fn settled_view(&self) -> EpicView {
        self.view();
        let state = self.day.settled().await;
        self.render(state)
    }

    fn render(&self, state: LoadState<EpicDay>) -> EpicView {
        let (selected_date, index, focused, main_loaded) = {
            let p = self.lock();
            (p.date, p.index, p.focused, p.main_loaded)
        };

        let state = state.map(|day| {
            if day.images.is_empty() {
                return EpicGallery::NoImages {
                    date: day.date,
                    message: EPIC_EMPTY,
                };
            }
            let index = index.min(day.images.len() - 1);
            let frames: Vec<EpicFrame> = day
                .images
                .iter()
                .enumerate()
                .map(|(i, img)| frame(i, img))
                .collect();

            EpicGallery::Images {
                date: day.date,
                count: frames.len(),
                index,
                focused,
                current: frames[index].clone(),
                thumbnails: main_loaded.then_some(frames),
            }
        });

        EpicView {
            selected_date,
            first_date: EPIC_FIRST_DATE,
            last_date: today(),
            loading_message: EPIC_LOADING,
            reload_path: RELOAD_PATH,
            state,
        }
    }

    #[cfg(test)]
    async fn cached_images(&self) -> usize {
        self.images.len().await
    }
}

fn frame(index: usize, image: &EpicImage) -> EpicFrame {
    EpicFrame {
        index,
        identifier: image.identifier.clone(),
        caption: image.caption.clone(),
        captured_at: image.date,
        centroid: image.centroid_coordinates,
        sun_position: image.sun_j2000_position,
        image_url: format!("{}?index={}", EPIC_IMAGE_PATH, index),
        thumbnail_url: format!("{}?index={}&asset=thumbnail", EPIC_IMAGE_PATH, index),
    }
}

fn dedup_by_identifier(images: Vec<EpicImage>) -> Vec<EpicImage> {
    let mut seen = HashSet::new();
    images
        .into_iter()
        .filter(|img| seen.insert(img.identifier.clone()))
        .collect()
}
