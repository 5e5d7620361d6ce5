/// View models: parameters in, load state and gallery state out
mod apod;
mod epic;
mod rover;

pub use apod::{ApodService, ApodView, RecentView};
pub use epic::{EpicService, EpicView};
pub use rover::{RoverService, RoverView};

/// Endpoint behind every error panel's "Try Again"
pub const RELOAD_PATH: &str = "/reload";

/// Image endpoint the EPIC frames point at
pub const EPIC_IMAGE_PATH: &str = "/epic/image";
