//! Turning a client location into the region and city names the upstream
//! knows about.
//!
//! Geolocation reports several administrative regions per location, and the
//! upstream only resolves postal codes against one of them (or none). Which
//! one works differs per country, so [`Pathfinder::compass`] proposes
//! candidates in the order most likely to succeed, and [`Pathfinder::explore`]
//! tries them one at a time, remembering what worked.

use cadence::{Gauged, StatsdClient};
use dashmap::DashMap;
use merino_settings::{PathfinderSettings, RegionStrategy, SkipEntry};
use merino_suggest::Location;
use std::{
    collections::{HashMap, HashSet},
    future::Future,
};

/// One region/city combination to try against the upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// The region code, or `None` to search the whole country.
    pub region: Option<String>,
    /// The city name, after corrections.
    pub city: String,
}

impl Candidate {
    /// A candidate for `city` within `region`.
    pub fn new<S: Into<String>>(region: Option<S>, city: S) -> Self {
        Self {
            region: region.map(Into::into),
            city: city.into(),
        }
    }
}

/// How exploring a location ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ExploreOutcome<T> {
    /// A candidate resolved to a value.
    Found(T),
    /// The location is known not to resolve, and was not probed.
    Skipped,
    /// Every candidate was probed, and none resolved.
    Exhausted,
}

/// Proposes and tries location candidates, learning which region works for
/// each city.
pub struct Pathfinder {
    /// Candidate ordering per country.
    strategies: HashMap<String, RegionStrategy>,

    /// Countries whose successful regions are not remembered.
    excluded_countries: HashSet<String>,

    /// Locations that are never probed.
    skip_list: HashSet<SkipEntry>,

    /// City names to replace before probing.
    corrections: HashMap<String, String>,

    /// Learned `(country, city) -> region` pairs. Last write wins.
    region_mapping: DashMap<(String, String), String>,

    /// The metrics client to report the mapping size with.
    metrics_client: StatsdClient,
}

impl std::fmt::Debug for Pathfinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pathfinder")
            .field("strategies", &self.strategies)
            .field("excluded_countries", &self.excluded_countries)
            .field("skip_list", &self.skip_list)
            .field("region_mapping", &self.region_mapping.len())
            .finish_non_exhaustive()
    }
}

impl Pathfinder {
    /// Create a pathfinder with no learned mappings.
    pub fn new(settings: &PathfinderSettings, metrics_client: StatsdClient) -> Self {
        Self {
            strategies: settings.strategy_table(),
            excluded_countries: settings.excluded_countries.clone(),
            skip_list: settings.skip_list.iter().cloned().collect(),
            corrections: settings.correction_table(),
            region_mapping: DashMap::new(),
            metrics_client,
        }
    }

    /// The candidates to try for `location`, most promising first.
    ///
    /// Yields nothing if the location has no country or city. Every call
    /// starts a fresh sequence.
    pub fn compass(&self, location: &Location) -> impl Iterator<Item = Candidate> {
        let (regions, city) = match (location.country(), location.city()) {
            (Some(country), Some(city)) => {
                let city = self.correct_city(city);
                (self.regions_for(country, &city, &location.regions), city)
            }
            _ => (Vec::new(), String::new()),
        };
        regions.into_iter().map(move |region| Candidate {
            region,
            city: city.clone(),
        })
    }

    /// The regions to try for a city, in order.
    fn regions_for(&self, country: &str, city: &str, supplied: &[String]) -> Vec<Option<String>> {
        let learned = self
            .region_mapping
            .get(&(country.to_string(), city.to_string()))
            .map(|region| region.value().clone());
        if let Some(region) = learned {
            return vec![Some(region)];
        }

        // Without any supplied region, the whole country is the only option.
        if supplied.is_empty() {
            return vec![None];
        }

        let supplied = supplied.iter().cloned().map(Some);
        match self.strategies.get(country) {
            Some(RegionStrategy::MostSpecific) => supplied.collect(),
            Some(RegionStrategy::LeastSpecific) => supplied.rev().collect(),
            Some(RegionStrategy::NoRegion) => vec![None],
            None => supplied.chain(std::iter::once(None)).collect(),
        }
    }

    /// Probe the candidates for `location` in order until one resolves.
    ///
    /// Probing is strictly sequential. The first candidate that resolves to
    /// `Some` is remembered for the location's country and city, unless the
    /// country is excluded from learning.
    ///
    /// # Errors
    /// A probe error stops exploration and is returned unchanged.
    pub async fn explore<T, E, P, Fut>(
        &self,
        location: &Location,
        mut probe: P,
    ) -> Result<ExploreOutcome<T>, E>
    where
        P: FnMut(Candidate) -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let country = location.country().unwrap_or_default().to_string();

        for candidate in self.compass(location) {
            if self.is_skipped(&country, &candidate) {
                tracing::debug!(
                    r#type = "pathfinder.skipped",
                    %country,
                    ?candidate,
                    "Location is on the skip list"
                );
                return Ok(ExploreOutcome::Skipped);
            }

            let region = candidate.region.clone();
            let city = candidate.city.clone();
            if let Some(found) = probe(candidate).await? {
                if let Some(region) = region {
                    self.remember(&country, city, region);
                }
                return Ok(ExploreOutcome::Found(found));
            }
        }

        tracing::debug!(r#type = "pathfinder.exhausted", %country, "No candidate resolved");
        Ok(ExploreOutcome::Exhausted)
    }

    /// Forget every learned mapping.
    pub fn clear_region_mapping(&self) {
        self.region_mapping.clear();
        self.report_mapping_size();
    }

    /// A copy of the learned mappings.
    pub fn region_mapping_snapshot(&self) -> HashMap<(String, String), String> {
        self.region_mapping
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Apply the city name corrections.
    fn correct_city(&self, city: &str) -> String {
        self.corrections
            .get(city)
            .cloned()
            .unwrap_or_else(|| city.to_string())
    }

    /// Whether `candidate` in `country` is on the skip list.
    fn is_skipped(&self, country: &str, candidate: &Candidate) -> bool {
        match &candidate.region {
            Some(region) => self.skip_list.contains(&SkipEntry {
                country: country.to_string(),
                region: region.clone(),
                city: candidate.city.clone(),
            }),
            None => false,
        }
    }

    /// Record a region that resolved for a city.
    fn remember(&self, country: &str, city: String, region: String) {
        if self.excluded_countries.contains(country) {
            return;
        }
        tracing::debug!(
            r#type = "pathfinder.learned",
            %country,
            %city,
            %region,
            "Learned region for city"
        );
        self.region_mapping.insert((country.to_string(), city), region);
        self.report_mapping_size();
    }

    /// Report the number of learned mappings.
    fn report_mapping_size(&self) {
        self.metrics_client
            .gauge("pathfinder.region_mapping.size", self.region_mapping.len() as u64)
            .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::{Candidate, ExploreOutcome, Pathfinder};
    use cadence::{NopMetricSink, SpyMetricSink, StatsdClient};
    use merino_settings::{
        CityCorrection, PathfinderSettings, RegionStrategy, SkipEntry, StrategyEntry,
    };
    use merino_suggest::Location;
    use std::{cell::RefCell, convert::Infallible};

    fn settings() -> PathfinderSettings {
        let strategy = |country: &str, strategy| StrategyEntry {
            country: country.to_string(),
            strategy,
        };
        PathfinderSettings {
            region_strategies: vec![
                strategy("IT", RegionStrategy::LeastSpecific),
                strategy("GB", RegionStrategy::LeastSpecific),
                strategy("US", RegionStrategy::MostSpecific),
                strategy("PT", RegionStrategy::NoRegion),
            ],
            excluded_countries: ["US".to_string()].into_iter().collect(),
            skip_list: vec![SkipEntry {
                country: "CA".to_string(),
                region: "BC".to_string(),
                city: "Mount Pleasant".to_string(),
            }],
            city_corrections: vec![CityCorrection {
                from: "Montreal".to_string(),
                to: "Montréal".to_string(),
            }],
        }
    }

    fn pathfinder() -> Pathfinder {
        Pathfinder::new(
            &settings(),
            StatsdClient::from_sink("merino-test", NopMetricSink),
        )
    }

    fn location(country: &str, regions: &[&str], city: &str) -> Location {
        Location {
            country: Some(country.to_string()),
            regions: regions.iter().map(ToString::to_string).collect(),
            city: Some(city.to_string()),
            postal_code: Some("00000".to_string()),
            coordinates: None,
        }
    }

    fn candidates(pathfinder: &Pathfinder, location: &Location) -> Vec<Candidate> {
        pathfinder.compass(location).collect()
    }

    #[test]
    fn least_specific_region_first() {
        let matera = location("IT", &["MT", "77"], "Matera");
        assert_eq!(
            candidates(&pathfinder(), &matera),
            vec![
                Candidate::new(Some("77"), "Matera"),
                Candidate::new(Some("MT"), "Matera"),
            ]
        );
    }

    #[test]
    fn most_specific_region_first() {
        let portland = location("US", &["OR", "Multnomah"], "Portland");
        assert_eq!(
            candidates(&pathfinder(), &portland),
            vec![
                Candidate::new(Some("OR"), "Portland"),
                Candidate::new(Some("Multnomah"), "Portland"),
            ]
        );
    }

    #[test]
    fn no_region_countries_get_one_candidate() {
        let lisbon = location("PT", &["11"], "Lisbon");
        assert_eq!(
            candidates(&pathfinder(), &lisbon),
            vec![Candidate::new(None, "Lisbon")]
        );
    }

    #[test]
    fn unknown_countries_try_every_region_then_none() {
        let dublin = location("IE", &["L", "D"], "Dublin");
        assert_eq!(
            candidates(&pathfinder(), &dublin),
            vec![
                Candidate::new(Some("L"), "Dublin"),
                Candidate::new(Some("D"), "Dublin"),
                Candidate::new(None, "Dublin"),
            ]
        );
    }

    #[test]
    fn locations_without_regions_search_the_whole_country() {
        let pathfinder = pathfinder();
        for country in ["US", "IT", "PT", "IE"] {
            let springfield = location(country, &[], "Springfield");
            assert_eq!(
                candidates(&pathfinder, &springfield),
                vec![Candidate::new(None, "Springfield")],
                "country {}",
                country
            );
        }
    }

    #[tokio::test]
    async fn locations_without_regions_are_still_searched() {
        let pathfinder = pathfinder();
        let searched = RefCell::new(Vec::new());
        let springfield = location("US", &[], "Springfield");

        let outcome = pathfinder
            .explore(&springfield, |candidate| {
                searched.borrow_mut().push(candidate.clone());
                async { Ok::<_, Infallible>(Some(1)) }
            })
            .await
            .unwrap();

        assert_eq!(outcome, ExploreOutcome::Found(1));
        assert_eq!(*searched.borrow(), vec![Candidate::new(None, "Springfield")]);
        assert!(pathfinder.region_mapping_snapshot().is_empty());
    }

    #[test]
    fn city_names_are_corrected() {
        let montreal = location("CA", &["QC"], "Montreal");
        assert!(candidates(&pathfinder(), &montreal)
            .iter()
            .all(|c| c.city == "Montréal"));
    }

    #[test]
    fn incomplete_locations_have_no_candidates() {
        let no_city = Location {
            country: Some("GB".to_string()),
            ..Location::default()
        };
        assert!(candidates(&pathfinder(), &no_city).is_empty());
    }

    #[tokio::test]
    async fn learned_mapping_yields_one_candidate() {
        let pathfinder = pathfinder();
        let london = location("GB", &["ENG", "LND"], "London");

        let outcome = pathfinder
            .explore(&london, |candidate| async move {
                Ok::<_, Infallible>((candidate.region.as_deref() == Some("LND")).then(|| 1))
            })
            .await
            .unwrap();
        assert_eq!(outcome, ExploreOutcome::Found(1));

        assert_eq!(
            candidates(&pathfinder, &london),
            vec![Candidate::new(Some("LND"), "London")]
        );
    }

    #[tokio::test]
    async fn skip_listed_locations_are_never_probed() {
        let pathfinder = pathfinder();
        let probes = RefCell::new(0);
        let mount_pleasant = location("CA", &["BC"], "Mount Pleasant");

        let outcome = pathfinder
            .explore(&mount_pleasant, |_| {
                *probes.borrow_mut() += 1;
                async { Ok::<Option<u8>, Infallible>(Some(1)) }
            })
            .await
            .unwrap();

        assert_eq!(outcome, ExploreOutcome::Skipped);
        assert_eq!(*probes.borrow(), 0);
    }

    #[tokio::test]
    async fn first_success_stops_probing() {
        let pathfinder = pathfinder();
        let probed = RefCell::new(Vec::new());
        let dublin = location("IE", &["L", "D"], "Dublin");

        let outcome = pathfinder
            .explore(&dublin, |candidate| {
                probed.borrow_mut().push(candidate.clone());
                async { Ok::<_, Infallible>(Some("key")) }
            })
            .await
            .unwrap();

        assert_eq!(outcome, ExploreOutcome::Found("key"));
        assert_eq!(*probed.borrow(), vec![Candidate::new(Some("L"), "Dublin")]);
        assert_eq!(
            pathfinder
                .region_mapping_snapshot()
                .get(&("IE".to_string(), "Dublin".to_string())),
            Some(&"L".to_string())
        );
    }

    #[tokio::test]
    async fn excluded_countries_are_not_learned() {
        let pathfinder = pathfinder();
        let portland = location("US", &["OR"], "Portland");
        let outcome = pathfinder
            .explore(&portland, |_| async { Ok::<_, Infallible>(Some(())) })
            .await
            .unwrap();
        assert_eq!(outcome, ExploreOutcome::Found(()));
        assert!(pathfinder.region_mapping_snapshot().is_empty());
    }

    #[tokio::test]
    async fn exhausted_when_nothing_resolves() {
        let pathfinder = pathfinder();
        let probes = RefCell::new(0);
        let dublin = location("IE", &["L", "D"], "Dublin");

        let outcome = pathfinder
            .explore(&dublin, |_| {
                *probes.borrow_mut() += 1;
                async { Ok::<Option<u8>, Infallible>(None) }
            })
            .await
            .unwrap();

        assert_eq!(outcome, ExploreOutcome::Exhausted);
        assert_eq!(*probes.borrow(), 3);
    }

    #[tokio::test]
    async fn probe_errors_stop_exploration() {
        let pathfinder = pathfinder();
        let probes = RefCell::new(0);
        let dublin = location("IE", &["L", "D"], "Dublin");

        let outcome = pathfinder
            .explore(&dublin, |_| {
                *probes.borrow_mut() += 1;
                async { Err::<Option<u8>, _>("upstream down") }
            })
            .await;

        assert_eq!(outcome, Err("upstream down"));
        assert_eq!(*probes.borrow(), 1);
    }

    #[tokio::test]
    async fn clearing_reports_the_mapping_size() {
        let (rx, sink) = SpyMetricSink::new();
        let pathfinder = Pathfinder::new(&settings(), StatsdClient::from_sink("merino-test", sink));
        let dublin = location("IE", &["L"], "Dublin");
        pathfinder
            .explore(&dublin, |_| async { Ok::<_, Infallible>(Some(())) })
            .await
            .unwrap();
        pathfinder.clear_region_mapping();

        let sent: Vec<String> = rx
            .try_iter()
            .map(|bytes| String::from_utf8(bytes).unwrap())
            .collect();
        assert_eq!(
            sent,
            vec![
                "merino-test.pathfinder.region_mapping.size:1|g",
                "merino-test.pathfinder.region_mapping.size:0|g",
            ]
        );
        assert!(pathfinder.region_mapping_snapshot().is_empty());
    }
}
