//! Sequence and mapping containers.
//!
//! Sequences become runtime tables with keys `1..=n`; maps become tables
//! keyed by the converted keys. Pulling a map inserts entries in table order
//! and keeps the first value when two runtime keys convert to the same
//! native key.

use lualite_core::{ConversionError, NativeError, TableRef, Value};

use super::{FromValue, IntoValue, Marshal, mismatch};

fn pull_sequence<T: FromValue>(
    value: &Value,
    cx: &mut Marshal<'_>,
    limit: Option<usize>,
    mut sink: impl FnMut(usize, T),
) -> Result<(), ConversionError> {
    let Value::Table(table) = value else {
        return Err(mismatch("table", value));
    };
    let len = table.len();
    let count = limit.map_or(len, |limit| limit.min(len));
    for i in 0..count {
        let element = table.get_index(i as i64 + 1);
        sink(i, T::from_value(&element, cx)?);
    }
    Ok(())
}

fn push_sequence<I>(items: I, cx: &mut Marshal<'_>) -> Result<Value, NativeError>
where
    I: IntoIterator,
    I::Item: IntoValue,
{
    let values = items
        .into_iter()
        .map(|item| item.into_value(cx))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Table(TableRef::from_sequence(values)))
}

#[cfg_attr(not(feature = "std-containers"), allow(dead_code))]
fn pull_map<K: FromValue, V: FromValue>(
    value: &Value,
    cx: &mut Marshal<'_>,
    mut insert: impl FnMut(K, V),
) -> Result<(), ConversionError> {
    let Value::Table(table) = value else {
        return Err(mismatch("table", value));
    };
    for (key, element) in table.pairs() {
        let key = K::from_value(&key, cx)?;
        let element = V::from_value(&element, cx)?;
        insert(key, element);
    }
    Ok(())
}

#[cfg_attr(not(feature = "std-containers"), allow(dead_code))]
fn push_map<K, V, I>(entries: I, cx: &mut Marshal<'_>) -> Result<Value, NativeError>
where
    K: IntoValue,
    V: IntoValue,
    I: IntoIterator<Item = (K, V)>,
{
    let table = TableRef::new();
    for (key, element) in entries {
        let key = key.into_value(cx)?;
        let element = element.into_value(cx)?;
        table.raw_set(&key, element)?;
    }
    Ok(Value::Table(table))
}

// ============================================================================
// Fixed arrays and Vec
// ============================================================================

/// Reads up to `N` elements; positions the runtime sequence does not cover
/// keep `T::default()`.
impl<T: FromValue + Default, const N: usize> FromValue for [T; N] {
    fn from_value(value: &Value, cx: &mut Marshal<'_>) -> Result<Self, ConversionError> {
        let mut out: [T; N] = std::array::from_fn(|_| T::default());
        pull_sequence(value, cx, Some(N), |i, element| out[i] = element)?;
        Ok(out)
    }
}

impl<T: IntoValue, const N: usize> IntoValue for [T; N] {
    fn into_value(self, cx: &mut Marshal<'_>) -> Result<Value, NativeError> {
        push_sequence(self, cx)
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value, cx: &mut Marshal<'_>) -> Result<Self, ConversionError> {
        let mut out = Vec::new();
        pull_sequence(value, cx, None, |_, element| out.push(element))?;
        Ok(out)
    }
}

impl<T: IntoValue> IntoValue for Vec<T> {
    fn into_value(self, cx: &mut Marshal<'_>) -> Result<Value, NativeError> {
        push_sequence(self, cx)
    }
}

// ============================================================================
// Standard containers
// ============================================================================

#[cfg(feature = "std-containers")]
mod std_containers {
    use std::collections::{BTreeMap, HashMap, LinkedList, VecDeque};
    use std::hash::{BuildHasher, Hash};

    use indexmap::IndexMap;

    use super::*;

    impl<T: FromValue> FromValue for VecDeque<T> {
        fn from_value(value: &Value, cx: &mut Marshal<'_>) -> Result<Self, ConversionError> {
            let mut out = VecDeque::new();
            pull_sequence(value, cx, None, |_, element| out.push_back(element))?;
            Ok(out)
        }
    }

    impl<T: IntoValue> IntoValue for VecDeque<T> {
        fn into_value(self, cx: &mut Marshal<'_>) -> Result<Value, NativeError> {
            push_sequence(self, cx)
        }
    }

    impl<T: FromValue> FromValue for LinkedList<T> {
        fn from_value(value: &Value, cx: &mut Marshal<'_>) -> Result<Self, ConversionError> {
            let mut out = LinkedList::new();
            pull_sequence(value, cx, None, |_, element| out.push_back(element))?;
            Ok(out)
        }
    }

    impl<T: IntoValue> IntoValue for LinkedList<T> {
        fn into_value(self, cx: &mut Marshal<'_>) -> Result<Value, NativeError> {
            push_sequence(self, cx)
        }
    }

    impl<K: FromValue + Ord, V: FromValue> FromValue for BTreeMap<K, V> {
        fn from_value(value: &Value, cx: &mut Marshal<'_>) -> Result<Self, ConversionError> {
            let mut out = BTreeMap::new();
            pull_map(value, cx, |k, v| {
                out.entry(k).or_insert(v);
            })?;
            Ok(out)
        }
    }

    impl<K: IntoValue, V: IntoValue> IntoValue for BTreeMap<K, V> {
        fn into_value(self, cx: &mut Marshal<'_>) -> Result<Value, NativeError> {
            push_map(self, cx)
        }
    }

    impl<K, V, S> FromValue for HashMap<K, V, S>
    where
        K: FromValue + Eq + Hash,
        V: FromValue,
        S: BuildHasher + Default,
    {
        fn from_value(value: &Value, cx: &mut Marshal<'_>) -> Result<Self, ConversionError> {
            let mut out = HashMap::with_hasher(S::default());
            pull_map(value, cx, |k, v| {
                out.entry(k).or_insert(v);
            })?;
            Ok(out)
        }
    }

    impl<K: IntoValue, V: IntoValue, S> IntoValue for HashMap<K, V, S> {
        fn into_value(self, cx: &mut Marshal<'_>) -> Result<Value, NativeError> {
            push_map(self, cx)
        }
    }

    impl<K, V, S> FromValue for IndexMap<K, V, S>
    where
        K: FromValue + Eq + Hash,
        V: FromValue,
        S: BuildHasher + Default,
    {
        fn from_value(value: &Value, cx: &mut Marshal<'_>) -> Result<Self, ConversionError> {
            let mut out = IndexMap::with_hasher(S::default());
            pull_map(value, cx, |k, v| {
                out.entry(k).or_insert(v);
            })?;
            Ok(out)
        }
    }

    impl<K: IntoValue, V: IntoValue, S> IntoValue for IndexMap<K, V, S> {
        fn into_value(self, cx: &mut Marshal<'_>) -> Result<Value, NativeError> {
            push_map(self, cx)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use lualite_core::State;

    use super::*;
    use crate::registry::ClassRegistry;

    fn with_cx<R>(f: impl FnOnce(&mut Marshal<'_>) -> R) -> R {
        let mut state = State::new();
        let classes = Rc::new(ClassRegistry::new());
        let mut cx = Marshal::new(&mut state, &classes);
        f(&mut cx)
    }

    #[test]
    fn vec_becomes_sequence_table() {
        with_cx(|cx| {
            let value = vec![10, 20, 30].into_value(cx).unwrap();
            let table = value.as_table().unwrap();
            assert_eq!(table.len(), 3);
            assert_eq!(table.get_index(1), Value::Int(10));
            assert_eq!(table.get_index(3), Value::Int(30));
        });
    }

    #[test]
    fn vec_round_trip() {
        with_cx(|cx| {
            let value = vec!["a".to_string(), "b".to_string()].into_value(cx).unwrap();
            let back = Vec::<String>::from_value(&value, cx).unwrap();
            assert_eq!(back, vec!["a", "b"]);
        });
    }

    #[test]
    fn nested_vec_round_trip() {
        with_cx(|cx| {
            let value = vec![vec![1, 2], vec![3]].into_value(cx).unwrap();
            let back = Vec::<Vec<i64>>::from_value(&value, cx).unwrap();
            assert_eq!(back, vec![vec![1, 2], vec![3]]);
        });
    }

    #[test]
    fn array_round_trip() {
        with_cx(|cx| {
            let value = [1.5f64, 2.5, 3.5].into_value(cx).unwrap();
            let back = <[f64; 3]>::from_value(&value, cx).unwrap();
            assert_eq!(back, [1.5, 2.5, 3.5]);
        });
    }

    #[test]
    fn smaller_array_truncates() {
        with_cx(|cx| {
            let value = [1, 2, 3, 4].into_value(cx).unwrap();
            let back = <[i32; 2]>::from_value(&value, cx).unwrap();
            assert_eq!(back, [1, 2]);
        });
    }

    #[test]
    fn larger_array_keeps_defaults() {
        with_cx(|cx| {
            let value = vec![7, 8].into_value(cx).unwrap();
            let back = <[i32; 4]>::from_value(&value, cx).unwrap();
            assert_eq!(back, [7, 8, 0, 0]);
        });
    }

    #[test]
    fn sequence_pull_rejects_non_table() {
        with_cx(|cx| {
            let err = Vec::<i32>::from_value(&Value::Int(1), cx).unwrap_err();
            assert!(matches!(err, ConversionError::TypeMismatch { expected: "table", .. }));
        });
    }

    #[test]
    fn sequence_pull_reports_bad_element() {
        with_cx(|cx| {
            let value = Value::Table(TableRef::from_sequence([Value::Int(1), Value::from("x")]));
            assert!(Vec::<i32>::from_value(&value, cx).is_err());
        });
    }

    #[cfg(feature = "std-containers")]
    mod std_containers {
        use std::collections::{BTreeMap, HashMap, LinkedList, VecDeque};

        use indexmap::IndexMap;

        use super::*;

        #[test]
        fn deque_and_list_round_trip() {
            with_cx(|cx| {
                let deque: VecDeque<i32> = [1, 2, 3].into_iter().collect();
                let value = deque.clone().into_value(cx).unwrap();
                assert_eq!(VecDeque::<i32>::from_value(&value, cx).unwrap(), deque);

                let list: LinkedList<i32> = [4, 5].into_iter().collect();
                let value = list.clone().into_value(cx).unwrap();
                assert_eq!(LinkedList::<i32>::from_value(&value, cx).unwrap(), list);
            });
        }

        #[test]
        fn btree_map_round_trip() {
            with_cx(|cx| {
                let mut map = BTreeMap::new();
                map.insert("one".to_string(), 1);
                map.insert("two".to_string(), 2);
                let value = map.clone().into_value(cx).unwrap();
                let table = value.as_table().unwrap();
                assert_eq!(table.get_str("two"), Value::Int(2));
                assert_eq!(BTreeMap::<String, i32>::from_value(&value, cx).unwrap(), map);
            });
        }

        #[test]
        fn hash_map_round_trip() {
            with_cx(|cx| {
                let mut map = HashMap::new();
                map.insert(1i64, "a".to_string());
                map.insert(2i64, "b".to_string());
                let value = map.clone().into_value(cx).unwrap();
                assert_eq!(HashMap::<i64, String>::from_value(&value, cx).unwrap(), map);
            });
        }

        #[test]
        fn index_map_keeps_table_order() {
            with_cx(|cx| {
                let table = TableRef::new();
                table.set_str("z", 1i64);
                table.set_str("a", 2i64);
                let map = IndexMap::<String, i32>::from_value(&Value::Table(table), cx).unwrap();
                let keys: Vec<_> = map.keys().cloned().collect();
                assert_eq!(keys, vec!["z", "a"]);
            });
        }

        #[test]
        fn colliding_keys_keep_first_value() {
            with_cx(|cx| {
                let table = TableRef::new();
                table.raw_set(&Value::Float(1.25), Value::from("first")).unwrap();
                table.raw_set(&Value::Float(1.75), Value::from("second")).unwrap();
                let map = BTreeMap::<i32, String>::from_value(&Value::Table(table), cx).unwrap();
                assert_eq!(map.len(), 1);
                assert_eq!(map[&1], "first");
            });
        }
    }
}
