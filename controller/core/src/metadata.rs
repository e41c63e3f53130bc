use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Per-filter metadata attached to clusters and routes.
///
/// Each top-level key names the proxy filter that reads the section.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filter_metadata: BTreeMap<String, Map<String, Value>>,
}

impl Metadata {
    pub fn is_empty(&self) -> bool {
        self.filter_metadata.is_empty()
    }

    /// Returns a writable handle to the named filter's section, creating it if
    /// needed.
    pub fn section(&mut self, filter: &str) -> &mut Map<String, Value> {
        self.filter_metadata.entry(filter.to_string()).or_default()
    }

    /// Returns a writable handle to the object at `path` below the named
    /// filter's section. Missing levels are created; a non-object value in the
    /// way is replaced by an empty object.
    pub fn section_path(&mut self, filter: &str, path: &[&str]) -> &mut Map<String, Value> {
        path.iter()
            .fold(self.section(filter), |map, key| child_object(map, key))
    }

    pub fn get(&self, filter: &str, path: &[&str]) -> Option<&Value> {
        let (last, parents) = path.split_last()?;
        let mut map = self.filter_metadata.get(filter)?;
        for key in parents {
            map = map.get(*key)?.as_object()?;
        }
        map.get(*last)
    }
}

fn child_object<'m>(map: &'m mut Map<String, Value>, key: &str) -> &'m mut Map<String, Value> {
    let slot = map
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(m) => m,
        _ => unreachable!("slot was just set to an object"),
    }
}
