//! Property-based tests for persistent hash map laws.

use proptest::prelude::*;
use seqtrie::hashmap::PersistentHashMap;
use seqtrie::value::Value;

fn map_from(pairs: &[(i64, i64)]) -> PersistentHashMap {
    pairs
        .iter()
        .map(|(key, value)| (Value::Int(*key), Value::Int(*value)))
        .collect()
}

proptest! {
    /// Insert-Get Law: the inserted value reads back.
    #[test]
    fn prop_insert_then_get(
        pairs in prop::collection::vec((any::<i64>(), any::<i64>()), 0..300),
        key in any::<i64>(),
        value in any::<i64>(),
    ) {
        let map = map_from(&pairs).insert(Value::Int(key), Value::Int(value));
        prop_assert_eq!(map.get(&Value::Int(key)), Some(&Value::Int(value)));
    }

    /// Remove Law: a removed key is gone; everything else survives.
    #[test]
    fn prop_remove_then_absent(
        pairs in prop::collection::vec((0_i64..500, any::<i64>()), 1..300),
        selector in any::<usize>(),
    ) {
        let map = map_from(&pairs);
        let (victim, _) = pairs[selector % pairs.len()];
        let removed = map.remove(&Value::Int(victim));

        prop_assert!(!removed.contains_key(&Value::Int(victim)));
        prop_assert!(map.contains_key(&Value::Int(victim)));
        prop_assert_eq!(removed.len(), map.len() - 1);
        for (key, _) in &pairs {
            if *key != victim {
                prop_assert_eq!(removed.get(&Value::Int(*key)), map.get(&Value::Int(*key)));
            }
        }
    }

    /// Removing an absent key is a no-op that changes nothing observable.
    #[test]
    fn prop_remove_absent_is_identity(
        pairs in prop::collection::vec((0_i64..500, any::<i64>()), 0..200),
        absent in 1000_i64..2000,
    ) {
        let map = map_from(&pairs);
        let removed = map.remove(&Value::Int(absent));
        prop_assert_eq!(removed.len(), map.len());
        prop_assert_eq!(&removed, &map);
    }

    /// Insertion order never matters for equality or hashing.
    #[test]
    fn prop_insertion_order_is_irrelevant(
        pairs in prop::collection::hash_map(any::<i64>(), any::<i64>(), 0..200),
    ) {
        let entries: Vec<(i64, i64)> = pairs.into_iter().collect();
        let forward = map_from(&entries);
        let reversed: PersistentHashMap = entries
            .iter()
            .rev()
            .map(|(key, value)| (Value::Int(*key), Value::Int(*value)))
            .collect();

        prop_assert_eq!(&forward, &reversed);
        prop_assert_eq!(
            seqtrie::equality::hash_value(&Value::from(forward)),
            seqtrie::equality::hash_value(&Value::from(reversed))
        );
    }

    /// Count equals the number of distinct keys.
    #[test]
    fn prop_count_tracks_distinct_keys(
        pairs in prop::collection::vec((any::<i64>(), any::<i64>()), 0..300),
    ) {
        let map = map_from(&pairs);
        let distinct: std::collections::HashSet<i64> =
            pairs.iter().map(|(key, _)| *key).collect();
        prop_assert_eq!(map.len(), distinct.len());
    }

    /// Transient batches land on the same value as persistent edits.
    #[test]
    fn prop_transient_matches_persistent(
        pairs in prop::collection::vec((0_i64..200, any::<i64>()), 0..300),
        removals in prop::collection::vec(0_i64..200, 0..100),
    ) {
        let mut persistent = PersistentHashMap::new();
        let mut transient = PersistentHashMap::new().transient();
        for (key, value) in &pairs {
            persistent = persistent.insert(Value::Int(*key), Value::Int(*value));
            transient.insert(Value::Int(*key), Value::Int(*value));
        }
        for key in &removals {
            persistent = persistent.remove(&Value::Int(*key));
            transient.remove(&Value::Int(*key));
        }
        prop_assert_eq!(transient.persistent(), persistent);
    }
}
