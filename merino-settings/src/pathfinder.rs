use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Settings for turning a client location into upstream location candidates.
///
/// Country codes are stored in lists instead of maps, because map keys in
/// configuration files are lower cased when they are loaded.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathfinderSettings {
    /// How to order the regions of a location, per country.
    pub region_strategies: Vec<StrategyEntry>,

    /// Countries for which successful regions are never remembered.
    pub excluded_countries: HashSet<String>,

    /// Locations that are known to never resolve. These are never probed.
    pub skip_list: Vec<SkipEntry>,

    /// City names to replace before probing.
    pub city_corrections: Vec<CityCorrection>,
}

/// The order in which the regions of a location are tried.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionStrategy {
    /// Try the regions in the order they were supplied, most specific first.
    MostSpecific,
    /// Try the regions in reverse order, least specific first.
    LeastSpecific,
    /// Try only without a region.
    NoRegion,
}

/// The region strategy for one country.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StrategyEntry {
    /// ISO 3166-1 alpha-2 country code.
    pub country: String,
    /// The strategy to use for the country.
    pub strategy: RegionStrategy,
}

/// A location that should never be probed.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SkipEntry {
    /// ISO 3166-1 alpha-2 country code.
    pub country: String,
    /// Region code.
    pub region: String,
    /// City name.
    pub city: String,
}

/// A city name that the geolocation database and the upstream disagree on.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CityCorrection {
    /// The name as reported by geolocation.
    pub from: String,
    /// The name the upstream knows.
    pub to: String,
}

impl PathfinderSettings {
    /// The region strategies as a lookup table keyed by country.
    pub fn strategy_table(&self) -> HashMap<String, RegionStrategy> {
        self.region_strategies
            .iter()
            .map(|entry| (entry.country.clone(), entry.strategy))
            .collect()
    }

    /// The city corrections as a lookup table keyed by the geolocation name.
    pub fn correction_table(&self) -> HashMap<String, String> {
        self.city_corrections
            .iter()
            .map(|correction| (correction.from.clone(), correction.to.clone()))
            .collect()
    }
}
