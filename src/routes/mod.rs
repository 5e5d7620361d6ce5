/// Application routes configuration
use crate::handlers::{
    add_favorite, clear_epic_focus, clear_favorites, clear_rover_focus, earth_imagery, epic_image,
    focus_epic, focus_rover_photo, get_apod, get_epic, get_recent_apod, get_rover, health,
    list_favorites, next_epic, previous_epic, refresh_recent_apod, reload_all, remove_favorite,
    select_apod_date, select_epic_date, select_random_apod, select_rover, set_rover_sol,
    toggle_apod_favorite, AppState,
};
use axum::{
    routing::{delete, get, post},
    Router,
};

/// Build the application router with all routes
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health))
        // Picture of the day
        .route("/apod", get(get_apod))
        .route("/apod/date", post(select_apod_date))
        .route("/apod/random", post(select_random_apod))
        .route("/apod/recent", get(get_recent_apod).post(refresh_recent_apod))
        .route("/apod/favorite", post(toggle_apod_favorite))
        // Favorites list
        .route("/favorites", get(list_favorites).post(add_favorite).delete(clear_favorites))
        .route("/favorites/:date", delete(remove_favorite))
        // Mars rover gallery
        .route("/rover", get(get_rover))
        .route("/rover/select", post(select_rover))
        .route("/rover/sol", post(set_rover_sol))
        .route("/rover/focus", delete(clear_rover_focus))
        .route("/rover/focus/:id", post(focus_rover_photo))
        // EPIC gallery
        .route("/epic", get(get_epic))
        .route("/epic/date", post(select_epic_date))
        .route("/epic/next", post(next_epic))
        .route("/epic/previous", post(previous_epic))
        .route("/epic/focus", delete(clear_epic_focus))
        .route("/epic/focus/:index", post(focus_epic))
        .route("/epic/image", get(epic_image))
        // Landsat imagery
        .route("/earth/imagery", get(earth_imagery))
        // Error panels' "Try Again"
        .route("/reload", post(reload_all))
        .with_state(state)
}
