//! Constructors for the engine's preferred map types.
//!
//! Flow data maps use [`FxHashMap`] throughout for cheap, deterministic-ish
//! hashing of short string keys.

use rustc_hash::FxHashMap;
use serde_json::Value;

/// Create an empty flow-data map.
#[must_use]
pub fn new_data_map() -> FxHashMap<String, Value> {
    FxHashMap::default()
}

/// Create a flow-data map from an iterator of key/value pairs.
#[must_use]
pub fn data_map_from<I, K>(pairs: I) -> FxHashMap<String, Value>
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v))
        .collect()
}
