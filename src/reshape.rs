//! Reshaping of flat result rows into nested JSON.
//!
//! Joins flatten related rows into prefixed columns. Two naming conventions
//! are recognized:
//!
//! - `a___b___c` (three underscores) nests into objects: `{"a": {"b": {"c": ..}}}`;
//! - `items__name` (two underscores after an alphanumeric prefix) collects one
//!   object per row into a list: `{"items": [{"name": ..}, ..]}`.

use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

pub type JsonRow = Map<String, JsonValue>;

const NEST_SEPARATOR: &str = "___";
const LIST_SEPARATOR: &str = "__";

/// Nest every `___`-separated key into objects. Plain keys are kept as is.
pub fn group_dict(row: &JsonRow) -> JsonRow {
    let mut out = JsonRow::new();
    for (key, value) in row {
        let path: Vec<&str> = key.split(NEST_SEPARATOR).collect();
        insert_path(&mut out, &path, value.clone());
    }
    out
}

fn insert_path(target: &mut JsonRow, path: &[&str], value: JsonValue) {
    match path {
        [] => {}
        [last] => {
            target.insert((*last).to_string(), value);
        }
        [head, rest @ ..] => {
            let slot = target
                .entry((*head).to_string())
                .or_insert_with(|| JsonValue::Object(JsonRow::new()));
            if !slot.is_object() {
                *slot = JsonValue::Object(JsonRow::new());
            }
            if let JsonValue::Object(inner) = slot {
                insert_path(inner, rest, value);
            }
        }
    }
}

/// `items__name` -> `("items", "name")`; `None` for keys that do not collect.
fn split_list_key(key: &str) -> Option<(&str, &str)> {
    let (prefix, rest) = key.split_once(LIST_SEPARATOR)?;
    let prefix_ok = !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_alphanumeric());
    let rest_ok = !rest.is_empty() && !rest.starts_with('_');
    (prefix_ok && rest_ok).then_some((prefix, rest))
}

/// Merge rows that repeat the same parent columns.
///
/// Columns with a list prefix become a list holding one object per row; all
/// other columns are taken from the first row. With `nest_dicts` the result
/// and every list item also go through [`group_dict`].
pub fn group_list(rows: &[JsonRow], nest_dicts: bool) -> JsonRow {
    reduce_rows(rows.iter(), nest_dicts)
}

fn reduce_rows<'r>(rows: impl Iterator<Item = &'r JsonRow>, nest_dicts: bool) -> JsonRow {
    let mut scalars = JsonRow::new();
    let mut lists: Vec<(String, Vec<JsonValue>)> = Vec::new();

    for (index, row) in rows.enumerate() {
        let mut groups: Vec<(&str, JsonRow)> = Vec::new();
        for (key, value) in row {
            match split_list_key(key) {
                Some((group, field)) => {
                    let position = match groups.iter().position(|(name, _)| *name == group) {
                        Some(position) => position,
                        None => {
                            groups.push((group, JsonRow::new()));
                            groups.len() - 1
                        }
                    };
                    groups[position].1.insert(field.to_string(), value.clone());
                }
                None if index == 0 => {
                    scalars.insert(key.clone(), value.clone());
                }
                None => {}
            }
        }

        for (group, item) in groups {
            let item = if nest_dicts { group_dict(&item) } else { item };
            match lists.iter_mut().find(|(name, _)| name == group) {
                Some((_, items)) => items.push(JsonValue::Object(item)),
                None => lists.push((group.to_string(), vec![JsonValue::Object(item)])),
            }
        }
    }

    let mut result = if nest_dicts {
        group_dict(&scalars)
    } else {
        scalars
    };
    for (group, items) in lists {
        result.insert(group, JsonValue::Array(items));
    }
    result
}

fn key_part(value: Option<&JsonValue>) -> String {
    match value {
        Some(JsonValue::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => JsonValue::Null.to_string(),
    }
}

/// Partition rows by the `-`-joined values of `keys` and merge each
/// partition with [`group_list`].
pub fn group_list_by_keys(
    keys: &[&str],
    rows: &[JsonRow],
    nest_dicts: bool,
) -> BTreeMap<String, JsonRow> {
    let mut partitions: BTreeMap<String, Vec<&JsonRow>> = BTreeMap::new();
    for row in rows {
        let key = keys
            .iter()
            .map(|k| key_part(row.get(*k)))
            .collect::<Vec<_>>()
            .join("-");
        partitions.entry(key).or_default().push(row);
    }

    partitions
        .into_iter()
        .map(|(key, rows)| (key, reduce_rows(rows.into_iter(), nest_dicts)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(value: JsonValue) -> Vec<JsonRow> {
        match value {
            JsonValue::Array(items) => items
                .into_iter()
                .filter_map(|v| match v {
                    JsonValue::Object(map) => Some(map),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    fn object(value: JsonValue) -> JsonRow {
        match value {
            JsonValue::Object(map) => map,
            _ => JsonRow::new(),
        }
    }

    #[test]
    fn test_group_dict() {
        let row = object(json!({"a": 1, "b": 2, "c___a": 3, "c___b___bb": 4, "c___b___cc": 5}));
        assert_eq!(
            JsonValue::Object(group_dict(&row)),
            json!({"a": 1, "b": 2, "c": {"a": 3, "b": {"bb": 4, "cc": 5}}})
        );
    }

    #[test]
    fn test_group_list() {
        let input = rows(json!([
            {"a": 1, "b": 2, "c__a": 3, "c__b": 4},
            {"a": 1, "b": 2, "c__a": 5, "c__b": 6},
            {"a": 1, "b": 2, "c__a": 7, "c__b": 8}
        ]));
        assert_eq!(
            JsonValue::Object(group_list(&input, true)),
            json!({"a": 1, "b": 2, "c": [{"a": 3, "b": 4}, {"a": 5, "b": 6}, {"a": 7, "b": 8}]})
        );
    }

    #[test]
    fn test_group_list_nests_items() {
        let input = rows(json!([
            {"id": 1, "tags__name": "x", "tags__meta___color": "red"},
            {"id": 1, "tags__name": "y", "tags__meta___color": "blue"}
        ]));
        assert_eq!(
            JsonValue::Object(group_list(&input, true)),
            json!({"id": 1, "tags": [
                {"name": "x", "meta": {"color": "red"}},
                {"name": "y", "meta": {"color": "blue"}}
            ]})
        );
        let flat = group_list(&input, false);
        assert_eq!(flat["tags"][0]["meta___color"], json!("red"));
    }

    #[test]
    fn test_list_key_pattern() {
        assert_eq!(split_list_key("c__a"), Some(("c", "a")));
        assert_eq!(split_list_key("c___a"), None);
        assert_eq!(split_list_key("user_id__x"), None);
        assert_eq!(split_list_key("c__"), None);
        assert_eq!(split_list_key("plain"), None);
    }

    #[test]
    fn test_group_list_by_keys() {
        let input = rows(json!([
            {"a": 1, "b": 2, "c__a": 33, "c__b": 44},
            {"a": 1, "b": 2, "c__a": 55, "c__b": 66},
            {"a": 2, "b": 2, "c__a": 7, "c__b": 88},
            {"a": 2, "b": 2, "c__a": 77, "c__b": 99}
        ]));

        let by_a = group_list_by_keys(&["a"], &input, true);
        assert_eq!(by_a.len(), 2);
        assert_eq!(
            JsonValue::Object(by_a["1"].clone()),
            json!({"a": 1, "b": 2, "c": [{"a": 33, "b": 44}, {"a": 55, "b": 66}]})
        );

        let by_ab = group_list_by_keys(&["a", "b"], &input, true);
        assert_eq!(
            JsonValue::Object(by_ab["2-2"].clone()),
            json!({"a": 2, "b": 2, "c": [{"a": 7, "b": 88}, {"a": 77, "b": 99}]})
        );
    }

    #[test]
    fn test_string_keys_are_not_quoted() {
        let input = rows(json!([{"code": "EU", "n": 1}, {"code": "US", "n": 2}]));
        let grouped = group_list_by_keys(&["code"], &input, false);
        assert!(grouped.contains_key("EU"));
        assert!(grouped.contains_key("US"));
    }
}
