use serde::Serialize;
use std::hash::{BuildHasher, Hash, Hasher};

// Fixed seeds keep hashes comparable across restarts and processes.
const SEEDS: (u64, u64, u64, u64) = (
    0x6d65_7269_6469_616e,
    0x636f_6e74_726f_6c00,
    0x736e_6170_7368_6f74,
    0x7265_736f_7572_6365,
);

/// Computes a structural hash of a serializable value.
///
/// The value is first lowered to a `serde_json::Value`, whose objects are
/// ordered maps, so the result does not depend on map iteration order or on
/// how the value was originally encoded.
pub fn stable_hash<T: Serialize + ?Sized>(value: &T) -> u64 {
    let mut hasher =
        ahash::RandomState::with_seeds(SEEDS.0, SEEDS.1, SEEDS.2, SEEDS.3).build_hasher();
    match serde_json::to_value(value) {
        Ok(v) => hash_value(&v, &mut hasher),
        // Only maps with non-string keys fail to lower.
        Err(_) => "<unhashable>".hash(&mut hasher),
    }
    hasher.finish()
}

fn hash_value<H: Hasher>(value: &serde_json::Value, state: &mut H) {
    use serde_json::Value;

    match value {
        Value::Null => 0u8.hash(state),
        Value::Bool(b) => {
            1u8.hash(state);
            b.hash(state);
        }
        Value::Number(n) => {
            2u8.hash(state);
            n.to_string().hash(state);
        }
        Value::String(s) => {
            3u8.hash(state);
            s.hash(state);
        }
        Value::Array(items) => {
            4u8.hash(state);
            items.len().hash(state);
            for item in items {
                hash_value(item, state);
            }
        }
        Value::Object(map) => {
            5u8.hash(state);
            map.len().hash(state);
            // `serde_json::Map` is a BTreeMap unless `preserve_order` is
            // enabled; sort explicitly so the feature flag can't change hashes.
            let mut entries = map.iter().collect::<Vec<_>>();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            for (k, v) in entries {
                k.hash(state);
                hash_value(v, state);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::{btreemap, hashmap};

    #[test]
    fn map_order_does_not_matter() {
        let a = hashmap! { "a" => 1, "b" => 2, "c" => 3 };
        let b = btreemap! { "c" => 3, "a" => 1, "b" => 2 };
        assert_eq!(stable_hash(&a), stable_hash(&b));
    }

    #[test]
    fn content_changes_the_hash() {
        let a = btreemap! { "a" => 1 };
        let b = btreemap! { "a" => 2 };
        assert_ne!(stable_hash(&a), stable_hash(&b));
        assert_ne!(stable_hash(&vec![1, 2]), stable_hash(&vec![2, 1]));
    }

    #[test]
    fn hash_is_repeatable() {
        let v = serde_json::json!({ "region": "us-east-1", "secretRef": "aws" });
        assert_eq!(stable_hash(&v), stable_hash(&v.clone()));
    }
}
