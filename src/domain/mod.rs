/// Domain models for the application
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// First day covered by the picture-of-the-day archive
pub const APOD_FIRST_DATE: NaiveDate = match NaiveDate::from_ymd_opt(1995, 6, 16) {
    Some(d) => d,
    None => panic!("invalid APOD start date"),
};

/// First day of EPIC natural-color captures
pub const EPIC_FIRST_DATE: NaiveDate = match NaiveDate::from_ymd_opt(2015, 6, 13) {
    Some(d) => d,
    None => panic!("invalid EPIC start date"),
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    #[serde(other)]
    Other,
}

/// Astronomy Picture of the Day record
///
/// Fields the viewer does not use are kept in `extra` so a stored record
/// serialises back exactly as it was received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Apod {
    pub date: NaiveDate,
    pub title: String,
    pub explanation: String,
    pub media_type: MediaType,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hdurl: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copyright: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Apod {
    /// Link opened when the image is clicked
    pub fn full_resolution_url(&self) -> &str {
        self.hdurl.as_deref().unwrap_or(&self.url)
    }

    pub fn is_video(&self) -> bool {
        self.media_type == MediaType::Video
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rover {
    Curiosity,
    Opportunity,
    Spirit,
    Perseverance,
}

/// Mission facts shown next to the gallery
#[derive(Debug, Clone, Serialize)]
pub struct RoverInfo {
    pub id: Rover,
    pub name: &'static str,
    pub launched: &'static str,
    pub landed: &'static str,
}

impl Rover {
    pub const ALL: [Rover; 4] = [
        Rover::Curiosity,
        Rover::Opportunity,
        Rover::Spirit,
        Rover::Perseverance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Rover::Curiosity => "curiosity",
            Rover::Opportunity => "opportunity",
            Rover::Spirit => "spirit",
            Rover::Perseverance => "perseverance",
        }
    }

    pub fn info(&self) -> RoverInfo {
        let (name, launched, landed) = match self {
            Rover::Curiosity => ("Curiosity", "November 26, 2011", "August 6, 2012"),
            Rover::Opportunity => ("Opportunity", "July 7, 2003", "January 25, 2004"),
            Rover::Spirit => ("Spirit", "June 10, 2003", "January 4, 2004"),
            Rover::Perseverance => ("Perseverance", "July 30, 2020", "February 18, 2021"),
        };
        RoverInfo {
            id: *self,
            name,
            launched,
            landed,
        }
    }
}

impl fmt::Display for Rover {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rover {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rover::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown rover '{}'", s))
    }
}

/// Martian mission day, always within the slider range
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "u32")]
pub struct Sol(u32);

impl Sol {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 3000;

    pub fn new(value: i64) -> Self {
        Sol(value.clamp(Self::MIN as i64, Self::MAX as i64) as u32)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for Sol {
    fn default() -> Self {
        Sol(1000)
    }
}

impl From<i64> for Sol {
    fn from(value: i64) -> Self {
        Sol::new(value)
    }
}

impl From<Sol> for u32 {
    fn from(sol: Sol) -> Self {
        sol.0
    }
}

impl fmt::Display for Sol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub name: String,
    pub full_name: String,
}

/// Mars rover photo record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoverPhoto {
    pub id: u64,
    pub sol: u32,
    pub camera: Camera,
    pub img_src: String,
    pub earth_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct RoverPhotosResponse {
    pub photos: Vec<RoverPhoto>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Centroid {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// EPIC full-disk capture metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpicImage {
    pub identifier: String,
    #[serde(default)]
    pub caption: String,
    pub image: String,
    #[serde(with = "epic_timestamp")]
    pub date: NaiveDateTime,
    pub centroid_coordinates: Centroid,
    pub sun_j2000_position: Position,
}

/// EPIC timestamps use a space separator: `2015-10-31 00:31:01`
mod epic_timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(dt: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&dt.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}

/// Which rendition of an EPIC capture to address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpicAsset {
    Full,
    Thumbnail,
}

/// Health check response
#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
    pub now: DateTime<Utc>,
}
