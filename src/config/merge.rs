//! Deep merging of partial configuration trees.

use serde_json::{Map, Value};

/// Merges the given sources into a single tree. Later sources take precedence.
///
/// Objects are merged recursively, arrays and primitives are replaced wholesale and `null`
/// values never override anything. Sources which are not objects are ignored.
pub fn deep_merge<'a>(sources: impl IntoIterator<Item = &'a Value>) -> Value {
    let mut result = Map::new();

    for source in sources {
        if let Value::Object(source) = source {
            merge_into(&mut result, source);
        }
    }

    Value::Object(result)
}

fn merge_into(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        match value {
            Value::Null => {}
            Value::Object(nested) => {
                let slot = target
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !slot.is_object() {
                    *slot = Value::Object(Map::new());
                }
                if let Value::Object(slot) = slot {
                    merge_into(slot, nested);
                }
            }
            other => {
                target.insert(key.clone(), other.clone());
            }
        }
    }
}

/// Recursively removes all `null` entries from objects. Array elements are left untouched.
pub fn remove_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, value)| !value.is_null())
                .map(|(key, value)| (key, remove_nulls(value)))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn later_sources_win_for_primitives() {
        let defaults = json!({"api": {"baseUrl": "http://localhost:3000", "timeout": 60000}});
        let env = json!({"api": {"baseUrl": "https://api.x.com"}});

        let merged = deep_merge([&defaults, &env]);

        assert_eq!(
            merged,
            json!({"api": {"baseUrl": "https://api.x.com", "timeout": 60000}})
        );
    }

    #[test]
    fn null_values_do_not_override() {
        let defaults = json!({"aws": {"region": "us-west-2"}});
        let env = json!({"aws": {"region": null, "sqsQueueUrl": "https://sqs"}});

        let merged = deep_merge([&defaults, &env]);

        assert_eq!(
            merged,
            json!({"aws": {"region": "us-west-2", "sqsQueueUrl": "https://sqs"}})
        );
    }

    #[test]
    fn arrays_are_replaced_not_merged() {
        let first = json!({"list": [1, 2, 3]});
        let second = json!({"list": [4]});

        assert_eq!(deep_merge([&first, &second]), json!({"list": [4]}));
    }

    #[test]
    fn objects_replace_primitives() {
        let first = json!({"aws": "oops"});
        let second = json!({"aws": {"region": "eu-west-1"}});

        assert_eq!(
            deep_merge([&first, &second]),
            json!({"aws": {"region": "eu-west-1"}})
        );
    }

    #[test]
    fn non_object_sources_are_skipped() {
        let first = json!({"a": 1});
        let second = json!(42);

        assert_eq!(deep_merge([&first, &second]), json!({"a": 1}));
    }

    #[test]
    fn remove_nulls_strips_nested_nulls() {
        let value = json!({"a": null, "b": {"c": null, "d": 1}, "e": [null]});

        assert_eq!(remove_nulls(value), json!({"b": {"d": 1}, "e": [null]}));
    }
}
