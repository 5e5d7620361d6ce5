use super::RELOAD_PATH;
use crate::cache::BoundedCache;
use crate::clients::NasaClient;
use crate::domain::{Rover, RoverInfo, RoverPhoto, Sol};
use crate::errors::{ApiError, ApiResult};
use crate::loader::{LoadState, Loader};
use serde::Serialize;
use std::sync::{Arc, Mutex};

pub const ROVER_LOADING: &str = "Loading Mars rover photos...";
pub const ROVER_FAILED: &str = "Failed to fetch Mars rover photos. Please try again later.";

/// Thumbnails shown per gallery
pub const GALLERY_PAGE: usize = 20;

#[derive(Debug, Serialize)]
pub struct RoverView {
    pub rover: RoverInfo,
    pub rovers: Vec<RoverInfo>,
    pub sol: Sol,
    pub sol_min: u32,
    pub sol_max: u32,
    pub loading_message: &'static str,
    pub reload_path: &'static str,
    #[serde(flatten)]
    pub state: LoadState<RoverGallery>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoverGallery {
    Photos {
        photos: Vec<RoverPhoto>,
        shown: usize,
        total: usize,
        active: Option<RoverPhoto>,
    },
    NoPhotos {
        message: String,
    },
}

struct RoverParams {
    rover: Rover,
    sol: Sol,
    focused: Option<u64>,
}

/// Mars rover gallery view model
pub struct RoverService {
    client: Arc<NasaClient>,
    cache: Arc<BoundedCache<(Rover, Sol), Vec<RoverPhoto>>>,
    params: Mutex<RoverParams>,
    photos: Arc<Loader<Vec<RoverPhoto>>>,
}

impl RoverService {
    pub fn new(client: Arc<NasaClient>, cache_capacity: usize) -> Self {
        Self {
            client,
            cache: Arc::new(BoundedCache::new("rover", cache_capacity)),
            params: Mutex::new(RoverParams {
                rover: Rover::Curiosity,
                sol: Sol::default(),
                focused: None,
            }),
            photos: Arc::new(Loader::new("rover", ROVER_FAILED)),
        }
    }

    pub fn select_rover(&self, rover: Rover) {
        let mut params = self.lock();
        params.rover = rover;
        params.focused = None;
        self.start(params.rover, params.sol);
    }

    /// Move the sol slider; the value is clamped to the slider range
    pub fn set_sol(&self, sol: i64) -> Sol {
        let mut params = self.lock();
        params.sol = Sol::new(sol);
        params.focused = None;
        self.start(params.rover, params.sol);
        params.sol
    }

    /// Promote one photo of the loaded set to the focus view
    pub fn focus_photo(&self, id: u64) -> ApiResult<()> {
        let known = self
            .photos
            .snapshot()
            .ready()
            .map(|photos| photos.iter().any(|p| p.id == id))
            .unwrap_or(false);
        if !known {
            return Err(ApiError::NotFound(format!("photo {} is not in the gallery", id)));
        }
        self.lock().focused = Some(id);
        Ok(())
    }

    pub fn clear_focus(&self) {
        self.lock().focused = None;
    }

    pub fn reload(&self) {
        let params = self.lock();
        self.start(params.rover, params.sol);
    }

    fn start(&self, rover: Rover, sol: Sol) {
        let client = self.client.clone();
        let cache = self.cache.clone();
        self.photos.load(async move {
            cache
                .get_or_fetch((rover, sol), || client.fetch_rover_photos(rover, sol))
                .await
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RoverParams> {
        self.params.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn view(&self) -> RoverView {
        if self.photos.is_idle() {
            let params = self.lock();
            if self.photos.is_idle() {
                self.start(params.rover, params.sol);
            }
        }
        self.render(self.photos.snapshot())
    }

    pub async fn settled_view(&self) -> RoverView {
        self.view();
        let state = self.photos.settled().await;
        self.render(state)
    }

    fn render(&self, state: LoadState<Vec<RoverPhoto>>) -> RoverView {
        let (rover, sol, focused) = {
            let params = self.lock();
            (params.rover, params.sol, params.focused)
        };

        RoverView {
            rover: rover.info(),
            rovers: Rover::ALL.iter().map(Rover::info).collect(),
            sol,
            sol_min: Sol::MIN,
            sol_max: Sol::MAX,
            loading_message: ROVER_LOADING,
            reload_path: RELOAD_PATH,
            state: state.map(|photos| gallery(photos, sol, focused)),
        }
    }
}

fn gallery(photos: Vec<RoverPhoto>, sol: Sol, focused: Option<u64>) -> RoverGallery {
    if photos.is_empty() {
        return RoverGallery::NoPhotos {
            message: format!("No photos found for this rover on Sol {}", sol),
        };
    }

    let total = photos.len();
    let active = focused.and_then(|id| photos.iter().find(|p| p.id == id).cloned());
    let page: Vec<RoverPhoto> = photos.into_iter().take(GALLERY_PAGE).collect();

    RoverGallery::Photos {
        shown: page.len(),
        photos: page,
        total,
        active,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::fake::{rover_photo_json, FakeNasa};
    use std::time::Duration;

    const CURIOSITY: &str = "/mars-photos/api/v1/rovers/curiosity/photos";

    fn photos_json(n: u64, sol: u32) -> serde_json::Value {
        let photos: Vec<_> = (1..=n).map(|id| rover_photo_json(id, sol)).collect();
        serde_json::json!({ "photos": photos })
    }

    #[tokio::test]
    async fn test_empty_sol_renders_no_photos_state() {
        let fake = FakeNasa::start().await;
        fake.respond_json(CURIOSITY, serde_json::json!({"photos": []}));
        let svc = RoverService::new(Arc::new(fake.client()), 8);

        let view = svc.settled_view().await;
        assert_eq!(view.rover.id, Rover::Curiosity);
        assert_eq!(view.sol.get(), 1000);
        match view.state {
            LoadState::Ready(RoverGallery::NoPhotos { message }) => {
                assert_eq!(message, "No photos found for this rover on Sol 1000");
            }
            other => panic!("unexpected state {:?}", other),
        }
        assert!(fake.requests()[0].contains("sol=1000"));
    }

    #[tokio::test]
    async fn test_gallery_shows_first_page_and_total() {
        let fake = FakeNasa::start().await;
        fake.respond_json(CURIOSITY, photos_json(25, 1000));
        let svc = RoverService::new(Arc::new(fake.client()), 8);

        let view = svc.settled_view().await;
        match view.state {
            LoadState::Ready(RoverGallery::Photos { photos, shown, total, active }) => {
                assert_eq!(photos.len(), GALLERY_PAGE);
                assert_eq!(shown, 20);
                assert_eq!(total, 25);
                assert!(active.is_none());
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sol_is_clamped_before_request() {
        let fake = FakeNasa::start().await;
        fake.respond_json(CURIOSITY, photos_json(1, 3000));
        let svc = RoverService::new(Arc::new(fake.client()), 8);

        assert_eq!(svc.set_sol(99_999).get(), 3000);
        svc.settled_view().await;
        assert_eq!(svc.set_sol(-5).get(), 1);
        svc.settled_view().await;

        let reqs = fake.requests_to(CURIOSITY);
        assert!(reqs[0].contains("sol=3000"));
        assert!(reqs[1].contains("sol=1&"));
    }

    #[tokio::test]
    async fn test_rover_change_keeps_sol_and_clears_focus() {
        let fake = FakeNasa::start().await;
        fake.respond_json(CURIOSITY, photos_json(3, 1200));
        fake.respond_json(
            "/mars-photos/api/v1/rovers/opportunity/photos",
            photos_json(2, 1200),
        );
        let svc = RoverService::new(Arc::new(fake.client()), 8);

        svc.set_sol(1200);
        svc.settled_view().await;
        svc.focus_photo(2).unwrap();

        svc.select_rover(Rover::Opportunity);
        let view = svc.settled_view().await;
        assert_eq!(view.rover.name, "Opportunity");
        assert_eq!(view.sol.get(), 1200);
        match view.state {
            LoadState::Ready(RoverGallery::Photos { active, .. }) => assert!(active.is_none()),
            other => panic!("unexpected state {:?}", other),
        }
        assert!(fake.requests_to("/mars-photos/api/v1/rovers/opportunity/photos")[0].contains("sol=1200"));
    }

    #[tokio::test]
    async fn test_focus_single_photo() {
        let fake = FakeNasa::start().await;
        fake.respond_json(CURIOSITY, photos_json(3, 1000));
        let svc = RoverService::new(Arc::new(fake.client()), 8);
        svc.settled_view().await;

        assert!(matches!(svc.focus_photo(42), Err(ApiError::NotFound(_))));

        svc.focus_photo(1).unwrap();
        svc.focus_photo(3).unwrap();
        match svc.view().state {
            LoadState::Ready(RoverGallery::Photos { active, .. }) => {
                let active = active.unwrap();
                assert_eq!(active.id, 3);
                assert_eq!(active.camera.full_name, "Front Hazard Avoidance Camera");
            }
            other => panic!("unexpected state {:?}", other),
        }

        svc.clear_focus();
        match svc.view().state {
            LoadState::Ready(RoverGallery::Photos { active, .. }) => assert!(active.is_none()),
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_upstream_error_is_failed_with_fixed_message() {
        let fake = FakeNasa::start().await;
        fake.respond_status(CURIOSITY, 429);
        let svc = RoverService::new(Arc::new(fake.client()), 8);

        let view = svc.settled_view().await;
        assert!(matches!(view.state, LoadState::Failed(ref m) if m == ROVER_FAILED));
    }

    #[tokio::test]
    async fn test_rapid_sol_changes_keep_latest() {
        let fake = FakeNasa::start().await;
        fake.respond_json_after(CURIOSITY, photos_json(4, 10), Duration::from_millis(200));
        let svc = RoverService::new(Arc::new(fake.client()), 8);

        svc.set_sol(10);
        svc.set_sol(11);
        svc.set_sol(12);
        let view = svc.settled_view().await;
        assert_eq!(view.sol.get(), 12);
        assert!(matches!(view.state, LoadState::Ready(_)));
    }
}
