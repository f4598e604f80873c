//! TOML table keys are always strings; chains are keyed by numeric id.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;

pub fn deserialize_chain_map<'de, D, T>(deserializer: D) -> Result<HashMap<u64, T>, D::Error>
where
	D: Deserializer<'de>,
	T: Deserialize<'de>,
{
	let map = HashMap::<String, T>::deserialize(deserializer)?;

	map.into_iter()
		.map(|(k, v)| {
			k.parse::<u64>()
				.map(|id| (id, v))
				.map_err(|_| serde::de::Error::custom(format!("Invalid chain ID: {}", k)))
		})
		.collect()
}

pub fn serialize_chain_map<S, T>(map: &HashMap<u64, T>, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
	T: Serialize,
{
	let string_map: HashMap<String, &T> = map.iter().map(|(k, v)| (k.to_string(), v)).collect();
	string_map.serialize(serializer)
}
