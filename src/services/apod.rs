use super::RELOAD_PATH;
use crate::cache::BoundedCache;
use crate::clients::NasaClient;
use crate::domain::{Apod, APOD_FIRST_DATE};
use crate::errors::{ApiError, ApiResult};
use crate::loader::{LoadState, Loader};
use crate::repo::FavoritesRepo;
use crate::utils::{in_range, random_day, today, trailing_days};
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::info;

pub const APOD_LOADING: &str = "Loading today's cosmic wonder...";
pub const APOD_FAILED: &str = "Failed to fetch NASA data. Please try again later.";

/// What the picture-of-the-day page renders
#[derive(Debug, Serialize)]
pub struct ApodView {
    pub selected_date: Option<NaiveDate>,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub loading_message: &'static str,
    pub reload_path: &'static str,
    #[serde(flatten)]
    pub state: LoadState<ApodContent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApodContent {
    pub record: Apod,
    pub is_video: bool,
    pub full_resolution_url: String,
    pub is_favorite: bool,
}

#[derive(Debug, Serialize)]
pub struct RecentView {
    pub days: u32,
    pub loading_message: &'static str,
    #[serde(flatten)]
    pub state: LoadState<Vec<Apod>>,
}

/// Picture-of-the-day view model
pub struct ApodService {
    client: Arc<NasaClient>,
    favorites: Arc<FavoritesRepo>,
    cache: Arc<BoundedCache<NaiveDate, Apod>>,
    selected: Mutex<Option<NaiveDate>>,
    current: Arc<Loader<Apod>>,
    recent: Arc<Loader<Vec<Apod>>>,
    recent_days: Mutex<u32>,
}

impl ApodService {
    pub fn new(
        client: Arc<NasaClient>,
        favorites: Arc<FavoritesRepo>,
        cache_capacity: usize,
        recent_days: u32,
    ) -> Self {
        Self {
            client,
            favorites,
            cache: Arc::new(BoundedCache::new("apod", cache_capacity)),
            selected: Mutex::new(None),
            current: Arc::new(Loader::new("apod", APOD_FAILED)),
            recent: Arc::new(Loader::new("apod-recent", APOD_FAILED)),
            recent_days: Mutex::new(recent_days),
        }
    }

    /// Show the picture of `date`, or today's when `None`
    pub fn select_date(&self, date: Option<NaiveDate>) -> ApiResult<()> {
        if let Some(d) = date {
            let last = today();
            if !in_range(d, APOD_FIRST_DATE, last) {
                return Err(ApiError::InvalidInput(format!(
                    "date {} is outside {}..={}",
                    d, APOD_FIRST_DATE, last
                )));
            }
        }

        let mut selected = self.selected.lock().unwrap_or_else(|e| e.into_inner());
        *selected = date;
        self.start(date);
        Ok(())
    }

    /// Jump to a uniformly random day of the archive
    pub fn select_random(&self) -> ApiResult<NaiveDate> {
        let date = random_day(&mut rand::thread_rng(), APOD_FIRST_DATE, today());
        info!("Random APOD date {}", date);
        self.select_date(Some(date))?;
        Ok(date)
    }

    pub fn selected_date(&self) -> Option<NaiveDate> {
        *self.selected.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn start(&self, date: Option<NaiveDate>) {
        let client = self.client.clone();
        let cache = self.cache.clone();
        self.current.load(async move { fetch_cached(&client, &cache, date).await });
    }

    /// Fetch the last `days` pictures concurrently as one result
    pub fn load_recent(&self, days: u32) {
        let days = days.clamp(1, 30);
        *self.recent_days.lock().unwrap_or_else(|e| e.into_inner()) = days;

        let client = self.client.clone();
        let cache = self.cache.clone();
        self.recent.load(async move {
            let requests = trailing_days(today(), days)
                .into_iter()
                .map(|d| fetch_cached(&client, &cache, Some(d)));
            futures::future::try_join_all(requests).await
        });
    }

    /// Flip the favorite status of the loaded picture
    pub async fn toggle_favorite(&self) -> ApiResult<bool> {
        let apod = self
            .current
            .snapshot()
            .ready()
            .cloned()
            .ok_or_else(|| ApiError::InvalidInput("no picture is loaded".into()))?;
        let date = apod.date;
        let now_favorite = self.favorites.toggle(apod).await?;
        info!("APOD {} favorite: {}", date, now_favorite);
        Ok(now_favorite)
    }

    pub fn favorites(&self) -> &FavoritesRepo {
        &self.favorites
    }

    /// Re-issue the current loads
    pub fn reload(&self) {
        let selected = self.selected.lock().unwrap_or_else(|e| e.into_inner());
        self.start(*selected);
        drop(selected);

        if !self.recent.is_idle() {
            let days = *self.recent_days.lock().unwrap_or_else(|e| e.into_inner());
            self.load_recent(days);
        }
    }

    /// Current page; the first call starts loading today's picture
    pub async fn view(&self) -> ApodView {
        if self.current.is_idle() {
            let selected = self.selected.lock().unwrap_or_else(|e| e.into_inner());
            if self.current.is_idle() {
                self.start(*selected);
            }
        }
        self.render(self.current.snapshot()).await
    }

    /// Like `view`, but waits for the load to finish
    pub async fn settled_view(&self) -> ApodView {
        self.view().await;
        let state = self.current.settled().await;
        self.render(state).await
    }

    async fn render(&self, state: LoadState<Apod>) -> ApodView {
        let is_favorite = match state.ready() {
            Some(apod) => self.favorites.contains(apod.date).await,
            None => false,
        };

        ApodView {
            selected_date: self.selected_date(),
            first_date: APOD_FIRST_DATE,
            last_date: today(),
            loading_message: APOD_LOADING,
            reload_path: RELOAD_PATH,
            state: state.map(|apod| ApodContent {
                is_video: apod.is_video(),
                full_resolution_url: apod.full_resolution_url().to_string(),
                is_favorite,
                record: apod,
            }),
        }
    }

    pub fn recent_view(&self) -> RecentView {
        RecentView {
            days: *self.recent_days.lock().unwrap_or_else(|e| e.into_inner()),
            loading_message: APOD_LOADING,
            state: self.recent.snapshot(),
        }
    }

    pub async fn settled_recent_view(&self) -> RecentView {
        if self.recent.is_idle() {
            let days = *self.recent_days.lock().unwrap_or_else(|e| e.into_inner());
            self.load_recent(days);
        }
        self.recent.settled().await;
        self.recent_view()
    }
}

async fn fetch_cached(
    client: &NasaClient,
    cache: &BoundedCache<NaiveDate, Apod>,
    date: Option<NaiveDate>,
) -> ApiResult<Apod> {
    match date {
        Some(d) => cache.get_or_fetch(d, || client.fetch_apod(Some(d))).await,
        None => {
            // "Today" moves, so only the resolved date is remembered.
            let apod = client.fetch_apod(None).await?;
            cache.insert(apod.date, apod.clone()).await;
            Ok(apod)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::fake::{apod_json, FakeNasa};
    use crate::repo::tests::memory_store;
    use chrono::Days;
    use std::time::Duration;

    async fn service(fake: &FakeNasa) -> ApodService {
        let favorites = FavoritesRepo::load(memory_store().await).await.unwrap();
        ApodService::new(Arc::new(fake.client()), Arc::new(favorites), 16, 7)
    }

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_selected_date_is_sent_upstream() {
        let fake = FakeNasa::start().await;
        fake.respond_json("/planetary/apod?date=2001-09-11", apod_json("2001-09-11"));
        let svc = service(&fake).await;

        svc.select_date(Some(day("2001-09-11"))).unwrap();
        let view = svc.settled_view().await;

        let content = view.state.ready().unwrap();
        assert_eq!(content.record.date, day("2001-09-11"));
        assert!(content.full_resolution_url.ends_with("_hd.jpg"));
        let reqs = fake.requests_to("/planetary/apod");
        assert_eq!(reqs.len(), 1);
        assert!(reqs[0].contains("date=2001-09-11"));
    }

    #[tokio::test]
    async fn test_first_view_loads_today() {
        let fake = FakeNasa::start().await;
        fake.respond_json("/planetary/apod", apod_json("2024-06-01"));
        let svc = service(&fake).await;

        let view = svc.view().await;
        assert!(view.state.is_pending());
        assert_eq!(view.loading_message, APOD_LOADING);

        let view = svc.settled_view().await;
        assert!(view.state.ready().is_some());
        assert!(!fake.requests()[0].contains("date="));
    }

    #[tokio::test]
    async fn test_out_of_range_dates_are_rejected() {
        let fake = FakeNasa::start().await;
        let svc = service(&fake).await;

        let before = APOD_FIRST_DATE.checked_sub_days(Days::new(1)).unwrap();
        assert!(matches!(
            svc.select_date(Some(before)),
            Err(ApiError::InvalidInput(_))
        ));
        let tomorrow = today().checked_add_days(Days::new(1)).unwrap();
        assert!(svc.select_date(Some(tomorrow)).is_err());
        assert!(fake.requests().is_empty());
    }

    #[tokio::test]
    async fn test_upstream_failure_shows_fixed_message() {
        let fake = FakeNasa::start().await;
        fake.respond_status("/planetary/apod", 500);
        let svc = service(&fake).await;

        svc.select_date(Some(day("2010-01-01"))).unwrap();
        let view = svc.settled_view().await;
        assert!(matches!(view.state, LoadState::Failed(ref m) if m == APOD_FAILED));
        assert_eq!(view.reload_path, RELOAD_PATH);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["data"], APOD_FAILED);
    }

    #[tokio::test]
    async fn test_malformed_payload_becomes_failed_state() {
        let fake = FakeNasa::start().await;
        fake.respond_json("/planetary/apod", serde_json::json!({"date": "2010-01-01"}));
        let svc = service(&fake).await;

        svc.select_date(Some(day("2010-01-01"))).unwrap();
        let view = svc.settled_view().await;
        assert!(matches!(view.state, LoadState::Failed(ref m) if m == APOD_FAILED));
    }

    #[tokio::test]
    async fn test_slow_superseded_date_is_dropped() {
        let fake = FakeNasa::start().await;
        fake.respond_json_after(
            "/planetary/apod?date=2005-05-05",
            apod_json("2005-05-05"),
            Duration::from_millis(300),
        );
        fake.respond_json("/planetary/apod?date=2006-06-06", apod_json("2006-06-06"));
        let svc = service(&fake).await;

        svc.select_date(Some(day("2005-05-05"))).unwrap();
        svc.select_date(Some(day("2006-06-06"))).unwrap();

        let view = svc.settled_view().await;
        assert_eq!(view.state.ready().unwrap().record.date, day("2006-06-06"));

        tokio::time::sleep(Duration::from_millis(400)).await;
        let view = svc.view().await;
        assert_eq!(view.state.ready().unwrap().record.date, day("2006-06-06"));
        assert_eq!(view.selected_date, Some(day("2006-06-06")));
    }

    #[tokio::test]
    async fn test_revisiting_a_date_uses_cache() {
        let fake = FakeNasa::start().await;
        fake.respond_json("/planetary/apod?date=2012-12-12", apod_json("2012-12-12"));
        fake.respond_json("/planetary/apod?date=2013-01-01", apod_json("2013-01-01"));
        let svc = service(&fake).await;

        for d in ["2012-12-12", "2013-01-01", "2012-12-12"] {
            svc.select_date(Some(day(d))).unwrap();
            svc.settled_view().await;
        }
        assert_eq!(fake.requests_to("/planetary/apod").len(), 2);
    }

    #[tokio::test]
    async fn test_random_selection_in_archive_range() {
        let fake = FakeNasa::start().await;
        let svc = service(&fake).await;

        for _ in 0..20 {
            let d = svc.select_random().unwrap();
            assert!(in_range(d, APOD_FIRST_DATE, today()));
            assert_eq!(svc.selected_date(), Some(d));
        }
    }

    #[tokio::test]
    async fn test_toggle_favorite_on_loaded_record() {
        let fake = FakeNasa::start().await;
        fake.respond_json("/planetary/apod?date=2020-02-02", apod_json("2020-02-02"));
        let svc = service(&fake).await;

        assert!(svc.toggle_favorite().await.is_err());

        svc.select_date(Some(day("2020-02-02"))).unwrap();
        svc.settled_view().await;

        assert!(svc.toggle_favorite().await.unwrap());
        assert!(svc.view().await.state.ready().unwrap().is_favorite);
        assert_eq!(svc.favorites().list().await.len(), 1);

        assert!(!svc.toggle_favorite().await.unwrap());
        assert!(svc.favorites().list().await.is_empty());
    }

    #[tokio::test]
    async fn test_recent_fans_out_one_request_per_day() {
        let fake = FakeNasa::start().await;
        let days = trailing_days(today(), 7);
        for d in &days {
            let key = format!("/planetary/apod?date={}", d);
            fake.respond_json(&key, apod_json(&d.to_string()));
        }
        let svc = service(&fake).await;

        svc.load_recent(7);
        let view = svc.settled_recent_view().await;
        let got: Vec<_> = view.state.ready().unwrap().iter().map(|a| a.date).collect();
        assert_eq!(got, days);
        assert_eq!(fake.requests_to("/planetary/apod").len(), 7);
    }

    #[tokio::test]
    async fn test_recent_fails_when_any_day_fails() {
        let fake = FakeNasa::start().await;
        // Nothing canned: every day answers 404.
        let svc = service(&fake).await;

        svc.load_recent(3);
        let view = svc.settled_recent_view().await;
        assert!(matches!(view.state, LoadState::Failed(_)));
        assert_eq!(view.days, 3);
    }
}
