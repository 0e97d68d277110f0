//! Map and phone links, plus a naive multi-stop itinerary

use crate::error::{DispatchError, Result};
use crate::models::{CollectionRequest, Coordinates};
use std::str::FromStr;
use uuid::Uuid;

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Ios,
    Android,
    Web,
}

impl Platform {
    /// Platform this binary was built for
    pub fn current() -> Self {
        if cfg!(target_os = "ios") {
            Platform::Ios
        } else if cfg!(target_os = "android") {
            Platform::Android
        } else {
            Platform::Web
        }
    }
}

impl FromStr for Platform {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ios" => Ok(Platform::Ios),
            "android" => Ok(Platform::Android),
            "web" => Ok(Platform::Web),
            other => Err(DispatchError::InvalidInput(format!(
                "Plateforme inconnue: {}",
                other
            ))),
        }
    }
}

/// URL that opens the native maps app at `at`
pub fn map_link(platform: Platform, at: Coordinates) -> String {
    let scheme = match platform {
        Platform::Ios => "maps:",
        Platform::Android | Platform::Web => "geo:",
    };
    format!("{}{},{}", scheme, at.latitude, at.longitude)
}

pub fn dial_link(phone: Option<&str>) -> Result<String> {
    match phone.map(str::trim) {
        Some(number) if !number.is_empty() => Ok(format!("tel:{}", number)),
        _ => Err(DispatchError::InvalidInput(
            "Aucun numéro de téléphone disponible".to_string(),
        )),
    }
}

pub fn format_coordinates(at: Coordinates, decimals: usize) -> String {
    format!(
        "{:.prec$}, {:.prec$}",
        at.latitude,
        at.longitude,
        prec = decimals
    )
}

/// Great-circle distance in kilometres
pub fn distance_km(from: Coordinates, to: Coordinates) -> f64 {
    let (lat1, lat2) = (from.latitude.to_radians(), to.latitude.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (to.longitude - from.longitude).to_radians();
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stop {
    pub request_id: Uuid,
    pub at: Coordinates,
}

/// Stops visited in the order given. No route optimisation.
#[derive(Debug, Clone, PartialEq)]
pub struct Itinerary {
    pub start: Coordinates,
    pub stops: Vec<Stop>,
}

impl Itinerary {
    pub fn from_stops(start: Coordinates, requests: &[CollectionRequest]) -> Self {
        let stops = requests
            .iter()
            .map(|r| Stop {
                request_id: r.id,
                at: r.coordinates(),
            })
            .collect();
        Self { start, stops }
    }

    pub fn waypoints(&self) -> Vec<Coordinates> {
        std::iter::once(self.start)
            .chain(self.stops.iter().map(|s| s.at))
            .collect()
    }

    pub fn total_distance_km(&self) -> f64 {
        self.waypoints()
            .windows(2)
            .map(|leg| distance_km(leg[0], leg[1]))
            .sum()
    }
}
