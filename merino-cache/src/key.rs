//! Deterministic cache keys for upstream requests.

use std::collections::{BTreeMap, HashSet};

/// The version segment of every cache key. Bump it whenever the hashing
/// scheme or the stored payload shape changes, so stale entries are ignored.
const KEY_VERSION: &str = "v1";

/// Everything that identifies an upstream request for caching purposes.
///
/// Two requests with the same operation, path, and parameters produce the
/// same key, regardless of the order parameters were added in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeyInputs {
    /// A short name for the kind of request, such as `locations`. It appears
    /// in the key and as the `operation` tag on cache metrics.
    operation: String,

    /// The URL path of the request.
    path: String,

    /// Query parameters. Sorted by name.
    params: BTreeMap<String, String>,
}

impl CacheKeyInputs {
    /// Describe a request to `path` for `operation`, with no parameters yet.
    pub fn new<O: Into<String>, P: Into<String>>(operation: O, path: P) -> Self {
        Self {
            operation: operation.into(),
            path: path.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add a query parameter.
    #[must_use]
    pub fn param<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// The operation name.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// The URL path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The query parameters, sorted by name.
    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Generate the cache key, in the form `{prefix}:{operation}:v1:{hash}`.
    ///
    /// Parameters named in `excluded` do not contribute to the hash. This
    /// keeps credentials out of the key, and lets rotating them reuse
    /// existing entries.
    pub fn cache_key(&self, prefix: &str, excluded: &HashSet<String>) -> String {
        let mut hasher = blake3::Hasher::new();
        update_framed(&mut hasher, self.path.as_bytes());
        for (name, value) in self.params.iter().filter(|(k, _)| !excluded.contains(*k)) {
            update_framed(&mut hasher, name.as_bytes());
            update_framed(&mut hasher, value.as_bytes());
        }
        let hash = hasher.finalize().to_hex();
        format!("{}:{}:{}:{}", prefix, self.operation, KEY_VERSION, hash)
    }
}

/// Feed `bytes` to the hasher with a length prefix, so that adjacent fields
/// cannot run together.
fn update_framed(hasher: &mut blake3::Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

#[cfg(test)]
mod tests {
    use super::CacheKeyInputs;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn api_key_excluded() -> HashSet<String> {
        ["apikey".to_string()].into_iter().collect()
    }

    #[test]
    fn same_request_same_key() {
        let a = CacheKeyInputs::new("locations", "/locations/v1/postalcodes/US/search.json")
            .param("q", "97201")
            .param("apikey", "secret");
        let b = a.clone();
        assert_eq!(
            a.cache_key("merino", &api_key_excluded()),
            b.cache_key("merino", &api_key_excluded())
        );
    }

    #[test]
    fn excluded_params_do_not_affect_the_key() {
        let excluded = api_key_excluded();
        let with_one = CacheKeyInputs::new("forecasts", "/forecasts/v1/daily/1day/39376.json")
            .param("apikey", "one");
        let with_other = CacheKeyInputs::new("forecasts", "/forecasts/v1/daily/1day/39376.json")
            .param("apikey", "other");
        assert_eq!(
            with_one.cache_key("merino", &excluded),
            with_other.cache_key("merino", &excluded)
        );
        assert!(!with_one.cache_key("merino", &excluded).contains("one"));
    }

    #[test]
    fn different_paths_different_keys() {
        let excluded = HashSet::new();
        let a = CacheKeyInputs::new("currentconditions", "/currentconditions/v1/1.json");
        let b = CacheKeyInputs::new("currentconditions", "/currentconditions/v1/2.json");
        assert_ne!(a.cache_key("m", &excluded), b.cache_key("m", &excluded));
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        let excluded = HashSet::new();
        let a = CacheKeyInputs::new("locations", "/p").param("ab", "c");
        let b = CacheKeyInputs::new("locations", "/p").param("a", "bc");
        assert_ne!(a.cache_key("m", &excluded), b.cache_key("m", &excluded));
    }

    proptest! {
        /// The key format holds for any operation name and parameters.
        #[test]
        // "[a-z]{1,12}" keeps the operation free of the `:` separator.
        fn key_format(operation in "[a-z]{1,12}", path in "\\PC*", value in "\\PC*") {
            let inputs = CacheKeyInputs::new(operation.clone(), path).param("q", value);
            let key = inputs.cache_key("merino", &HashSet::new());
            static HEX_DIGITS: &str = "0123456789abcdef";
            let parts: Vec<&str> = key.split(':').collect();
            prop_assert_eq!(parts.len(), 4);
            prop_assert_eq!(parts[0], "merino");
            prop_assert_eq!(parts[1], operation.as_str());
            prop_assert_eq!(parts[2], "v1");
            prop_assert!(parts[3].chars().all(|c| HEX_DIGITS.contains(c)));
            prop_assert_eq!(parts[3].len(), 64);
        }

        /// Parameter insertion order never changes the key.
        #[test]
        fn param_order_is_irrelevant(
            params in proptest::collection::btree_map("[a-z]{1,8}", "\\PC{0,16}", 0..6)
        ) {
            let forward = params
                .iter()
                .fold(CacheKeyInputs::new("op", "/path"), |acc, (k, v)| acc.param(k.clone(), v.clone()));
            let backward = params
                .iter()
                .rev()
                .fold(CacheKeyInputs::new("op", "/path"), |acc, (k, v)| acc.param(k.clone(), v.clone()));
            prop_assert_eq!(
                forward.cache_key("merino", &HashSet::new()),
                backward.cache_key("merino", &HashSet::new())
            );
        }

        /// Two requests that differ only in one parameter's value never share a key.
        #[test]
        fn distinct_values_distinct_keys(
            name in "[a-z]{1,8}",
            (first, second) in ("\\PC{0,16}", "\\PC{0,16}").prop_filter("values must differ", |(a, b)| a != b)
        ) {
            let excluded = api_key_excluded();
            prop_assume!(!excluded.contains(&name));
            let a = CacheKeyInputs::new("locations", "/locations/v1/postalcodes/CA/search.json")
                .param(name.clone(), first);
            let b = CacheKeyInputs::new("locations", "/locations/v1/postalcodes/CA/search.json")
                .param(name, second);
            prop_assert_ne!(a.cache_key("merino", &excluded), b.cache_key("merino", &excluded));
        }

        /// The API key's value never reaches the key, whatever it is.
        #[test]
        fn excluded_values_never_matter(secret in "\\PC*", postal_code in "[A-Z0-9]{3,7}") {
            let excluded = api_key_excluded();
            let request = |apikey: String| {
                CacheKeyInputs::new("locations", "/locations/v1/postalcodes/CA/search.json")
                    .param("q", postal_code.clone())
                    .param("apikey", apikey)
            };
            prop_assert_eq!(
                request(secret).cache_key("merino", &excluded),
                request("a different key".to_string()).cache_key("merino", &excluded)
            );
            let without_apikey = CacheKeyInputs::new("locations", "/locations/v1/postalcodes/CA/search.json")
                .param("q", postal_code.clone());
            prop_assert_eq!(
                request("anything".to_string()).cache_key("merino", &excluded),
                without_apikey.cache_key("merino", &excluded)
            );
        }
    }
}
