//! Datatypes to better represent the domain of Merino.

use fake::{
    faker::address::en::{CityName, CountryCode, StateAbbr, ZipCode},
    Fake,
};
use serde::{Deserialize, Serialize};

/// Where a request came from, as reported by the geolocation collaborator.
///
/// Created once per request and never modified.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Country in ISO 3166-1 alpha-2 format, such as "MX" for Mexico or "IT" for Italy.
    pub country: Option<String>,

    /// Subdivision codes, ordered from most to least specific. For example
    /// `["MT", "77"]` for the province of Matera in the region of Basilicata.
    #[serde(default)]
    pub regions: Vec<String>,

    /// City, listed by name such as "Portland" or "Berlin".
    pub city: Option<String>,

    /// The postal code, in the format used by the country.
    pub postal_code: Option<String>,

    /// The approximate coordinates.
    pub coordinates: Option<Coordinates>,
}

/// A latitude and longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Degrees north of the equator.
    pub latitude: f64,
    /// Degrees east of the prime meridian.
    pub longitude: f64,
}

impl Location {
    /// The country code, if it is present and not blank.
    pub fn country(&self) -> Option<&str> {
        non_blank(self.country.as_deref())
    }

    /// The city name, if it is present and not blank.
    pub fn city(&self) -> Option<&str> {
        non_blank(self.city.as_deref())
    }

    /// The postal code, if it is present and not blank.
    pub fn postal_code(&self) -> Option<&str> {
        non_blank(self.postal_code.as_deref())
    }
}

/// Treat empty and whitespace-only strings as missing.
fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}

impl<F> fake::Dummy<F> for Location {
    fn dummy_with_rng<R: rand::Rng + ?Sized>(_config: &F, rng: &mut R) -> Self {
        Self {
            country: Some(CountryCode().fake_with_rng::<String, R>(rng)),
            regions: vec![StateAbbr().fake_with_rng::<String, R>(rng)],
            city: Some(CityName().fake_with_rng::<String, R>(rng)),
            postal_code: Some(ZipCode().fake_with_rng::<String, R>(rng)),
            coordinates: Some(Coordinates {
                latitude: rng.gen_range(-90.0..90.0),
                longitude: rng.gen_range(-180.0..180.0),
            }),
        }
    }
}
