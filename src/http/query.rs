//! Bracket-notation query string decoding
//!
//! Rebuilds nested maps and lists from flat `key=value` pairs following the
//! `field[a][b]=x` / `items[]=x` / `items[0][x]=y` convention used by most
//! browser and HTTP client serializers. Leaf values always stay strings;
//! type coercion is left to whoever consumes the tree.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use url::form_urlencoded;

/// Value that decodes to an explicit `null` leaf instead of a string.
pub const NULL_SENTINEL: &str = "__null__";

/// Numeric segments above this index are dropped rather than padded.
pub const MAX_LIST_INDEX: usize = 10_000;

/// Value slots, list padding included, one decoded query may allocate.
pub const MAX_QUERY_NODES: usize = 50_000;

pub type QueryMap = BTreeMap<String, QueryValue>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum QueryValue {
    Null,
    String(String),
    List(Vec<QueryValue>),
    Map(QueryMap),
}

impl QueryValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::String(value) => Value::String(value.clone()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(map) => query_to_json(map),
        }
    }

    fn container(list: bool) -> Self {
        if list {
            Self::List(Vec::new())
        } else {
            Self::Map(QueryMap::new())
        }
    }

    fn is_container_kind(&self, list: bool) -> bool {
        matches!(
            (self, list),
            (Self::List(_), true) | (Self::Map(_), false)
        )
    }
}

pub fn query_to_json(map: &QueryMap) -> Value {
    Value::Object(
        map.iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect(),
    )
}

/// Decodes a raw query string (with or without the leading `?`).
///
/// Pairs that would push the tree past [`MAX_QUERY_NODES`] are dropped.
pub fn decode(query: &str) -> QueryMap {
    let query = query.strip_prefix('?').unwrap_or(query);
    let mut root = QueryMap::new();
    let mut remaining = MAX_QUERY_NODES;

    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        if key.is_empty() {
            continue;
        }

        let leaf = if value == NULL_SENTINEL {
            QueryValue::Null
        } else {
            QueryValue::String(value.into_owned())
        };

        let segments = split_key(&key);
        if let Some(index) = oversized_index(&segments) {
            debug!(key = %key, index, "dropping query pair with oversized list index");
            continue;
        }

        let cost = map_growth(&root, &segments);
        if cost > remaining {
            debug!(key = %key, cost, remaining, "dropping query pair over the node budget");
            continue;
        }
        remaining -= cost;
        insert_into_map(&mut root, &segments, leaf);
    }

    root
}

/// `a[b][]` -> `["a", "b", ""]`. Malformed bracket syntax keeps the key whole.
pub fn split_key(key: &str) -> Vec<String> {
    let Some(open) = key.find('[') else {
        return vec![key.to_string()];
    };
    if open == 0 {
        return vec![key.to_string()];
    }

    let mut segments = vec![key[..open].to_string()];
    let mut rest = &key[open..];
    while !rest.is_empty() {
        let Some(inner) = rest.strip_prefix('[') else {
            return vec![key.to_string()];
        };
        let Some(close) = inner.find(']') else {
            return vec![key.to_string()];
        };
        let segment = &inner[..close];
        if segment.contains('[') {
            return vec![key.to_string()];
        }
        segments.push(segment.to_string());
        rest = &inner[close + 1..];
    }

    segments
}

pub fn is_array_segment(segment: &str) -> bool {
    segment.bytes().all(|byte| byte.is_ascii_digit())
}

fn oversized_index(segments: &[String]) -> Option<usize> {
    segments
        .iter()
        .skip(1)
        .filter(|segment| !segment.is_empty() && is_array_segment(segment))
        .map(|segment| list_index(segment))
        .find(|index| *index > MAX_LIST_INDEX)
}

fn slot_cost(segment: &str) -> usize {
    if segment.is_empty() || !is_array_segment(segment) {
        1
    } else {
        list_index(segment).saturating_add(1)
    }
}

// Cost of building `segments` inside a brand new empty container.
fn fresh_growth(segments: &[String]) -> usize {
    segments
        .iter()
        .fold(0_usize, |total, segment| total.saturating_add(slot_cost(segment)))
}

// Slots `insert_into_map` would allocate for `segments`, without mutating.
fn map_growth(map: &QueryMap, segments: &[String]) -> usize {
    match map.get(&segments[0]) {
        None => 1_usize.saturating_add(fresh_growth(&segments[1..])),
        Some(_) if segments.len() == 1 => 0,
        Some(child) => nested_growth(child, &segments[1..]),
    }
}

fn nested_growth(slot: &QueryValue, segments: &[String]) -> usize {
    let wants_list = is_array_segment(&segments[0]);
    match slot {
        QueryValue::Map(map) if !wants_list => map_growth(map, segments),
        QueryValue::List(list) if wants_list => list_growth(list, segments),
        _ => fresh_growth(segments),
    }
}

fn list_growth(list: &[QueryValue], segments: &[String]) -> usize {
    let segment = &segments[0];
    if segment.is_empty() {
        return 1_usize.saturating_add(fresh_growth(&segments[1..]));
    }

    let index = list_index(segment);
    if index >= list.len() {
        return (index.saturating_add(1) - list.len()).saturating_add(fresh_growth(&segments[1..]));
    }
    if segments.len() == 1 {
        return 0;
    }
    nested_growth(&list[index], &segments[1..])
}

fn list_index(segment: &str) -> usize {
    segment.parse::<usize>().unwrap_or(usize::MAX)
}

fn insert_into_map(map: &mut QueryMap, segments: &[String], leaf: QueryValue) {
    let key = &segments[0];
    if segments.len() == 1 {
        map.insert(key.clone(), leaf);
        return;
    }

    let wants_list = is_array_segment(&segments[1]);
    let child = map
        .entry(key.clone())
        .or_insert_with(|| QueryValue::container(wants_list));
    if !child.is_container_kind(wants_list) {
        *child = QueryValue::container(wants_list);
    }

    insert_into_container(child, &segments[1..], leaf)
}

fn insert_into_list(list: &mut Vec<QueryValue>, segments: &[String], leaf: QueryValue) {
    let segment = &segments[0];
    let index = if segment.is_empty() {
        list.push(QueryValue::Null);
        list.len() - 1
    } else {
        // bounded by oversized_index before we get here
        let index = list_index(segment).min(MAX_LIST_INDEX);
        if list.len() <= index {
            list.resize(index + 1, QueryValue::Null);
        }
        index
    };

    if segments.len() == 1 {
        list[index] = leaf;
        return;
    }

    let wants_list = is_array_segment(&segments[1]);
    let slot = &mut list[index];
    if !slot.is_container_kind(wants_list) {
        *slot = QueryValue::container(wants_list);
    }

    insert_into_container(slot, &segments[1..], leaf)
}

fn insert_into_container(container: &mut QueryValue, segments: &[String], leaf: QueryValue) {
    match container {
        QueryValue::Map(map) => insert_into_map(map, segments, leaf),
        QueryValue::List(list) => insert_into_list(list, segments, leaf),
        QueryValue::Null | QueryValue::String(_) => {}
    }
}

/// Inverse of [`decode`]. Lists are written with explicit indices so that
/// padding and nested containers survive a round trip; empty containers have
/// no representation and are skipped.
pub fn encode(map: &QueryMap) -> String {
    let mut pairs = Vec::new();
    for (key, value) in map {
        encode_value(&urlencoding::encode(key), value, &mut pairs);
    }
    pairs.join("&")
}

fn encode_value(prefix: &str, value: &QueryValue, pairs: &mut Vec<String>) {
    match value {
        QueryValue::Null => pairs.push(format!("{prefix}={NULL_SENTINEL}")),
        QueryValue::String(text) => {
            pairs.push(format!("{prefix}={}", urlencoding::encode(text)))
        }
        QueryValue::List(items) => {
            for (index, item) in items.iter().enumerate() {
                encode_value(&format!("{prefix}[{index}]"), item, pairs);
            }
        }
        QueryValue::Map(map) => {
            for (key, item) in map {
                encode_value(
                    &format!("{prefix}[{}]", urlencoding::encode(key)),
                    item,
                    pairs,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn s(value: &str) -> QueryValue {
        QueryValue::String(value.to_string())
    }

    #[test]
    fn duplicate_scalar_keys_last_write_wins() {
        let decoded = decode("a=1&a=2");
        assert_eq!(query_to_json(&decoded), json!({"a": "2"}));
    }

    #[test]
    fn empty_brackets_append() {
        let decoded = decode("items[]=a&items[]=b");
        assert_eq!(query_to_json(&decoded), json!({"items": ["a", "b"]}));
    }

    #[test]
    fn indexed_maps_build_list_of_maps() {
        let decoded = decode("items[0][x]=1&items[1][x]=2");
        assert_eq!(
            query_to_json(&decoded),
            json!({"items": [{"x": "1"}, {"x": "2"}]})
        );
    }

    #[test]
    fn map_segments_merge_across_pairs() {
        let decoded = decode("reference[id]=123&reference[type]=Component");
        assert_eq!(
            query_to_json(&decoded),
            json!({"reference": {"id": "123", "type": "Component"}})
        );
    }

    #[test]
    fn null_sentinel_decodes_to_null() {
        let decoded = decode("v=__null__");
        assert_eq!(decoded.get("v"), Some(&QueryValue::Null));
        assert_eq!(query_to_json(&decoded), json!({"v": null}));
    }

    #[test]
    fn leading_question_mark_and_empty_segments_are_ignored() {
        let decoded = decode("?&a=1&&b=2&");
        assert_eq!(query_to_json(&decoded), json!({"a": "1", "b": "2"}));
    }

    #[test]
    fn plus_is_space_and_percent_escapes_decode() {
        let decoded = decode("name=hello+world&sym=%2B1&path=a%2Fb&k%5Bx%5D=v");
        assert_eq!(decoded.get("name"), Some(&s("hello world")));
        assert_eq!(decoded.get("sym"), Some(&s("+1")));
        assert_eq!(decoded.get("path"), Some(&s("a/b")));
        // encoded brackets in the key still nest once decoded
        assert_eq!(query_to_json(&decoded)["k"], json!({"x": "v"}));
    }

    #[test]
    fn value_splits_on_first_equals_only() {
        let decoded = decode("expr=a=b&flag");
        assert_eq!(decoded.get("expr"), Some(&s("a=b")));
        assert_eq!(decoded.get("flag"), Some(&s("")));
    }

    #[test]
    fn empty_key_is_dropped() {
        let decoded = decode("=orphan&a=1");
        assert_eq!(query_to_json(&decoded), json!({"a": "1"}));
    }

    #[test]
    fn numeric_index_pads_with_null() {
        let decoded = decode("items[2]=c");
        assert_eq!(query_to_json(&decoded), json!({"items": [null, null, "c"]}));
    }

    #[test]
    fn oversized_index_is_dropped() {
        let decoded = decode("items[99999999]=x&ok=1");
        assert_eq!(query_to_json(&decoded), json!({"ok": "1"}));
    }

    fn node_count(value: &QueryValue) -> usize {
        1 + match value {
            QueryValue::List(items) => items.iter().map(node_count).sum(),
            QueryValue::Map(map) => map.values().map(node_count).sum(),
            QueryValue::Null | QueryValue::String(_) => 0,
        }
    }

    #[test]
    fn padding_across_many_lists_stays_within_node_budget() {
        let mut query = String::new();
        let mut pairs = 0;
        while query.len() < 60 * 1024 {
            query.push_str(&format!("a[k{pairs}][{MAX_LIST_INDEX}]=&"));
            pairs += 1;
        }
        query.push_str("ok=1");

        let decoded = decode(&query);
        let nodes: usize = decoded.values().map(node_count).sum();
        assert!(nodes <= MAX_QUERY_NODES, "decoded {nodes} nodes");

        let kept = decoded["a"].to_json();
        let kept = kept.as_object().expect("map of lists");
        assert!(!kept.is_empty());
        assert!(kept.len() < pairs);
        assert_eq!(kept["k0"].as_array().map(Vec::len), Some(MAX_LIST_INDEX + 1));
    }

    #[test]
    fn pairs_that_reuse_existing_slots_cost_nothing_extra() {
        let mut query = String::new();
        for round in 0..(MAX_QUERY_NODES / 2) {
            query.push_str(&format!("items[0]={round}&"));
        }
        query.push_str("last=1");

        let decoded = decode(&query);
        assert_eq!(decoded.get("last"), Some(&s("1")));
        assert_eq!(
            query_to_json(&decoded)["items"],
            json!([(MAX_QUERY_NODES / 2 - 1).to_string()])
        );
    }

    #[test]
    fn type_mismatch_replaces_container() {
        let decoded = decode("a[x]=1&a[]=2");
        assert_eq!(query_to_json(&decoded), json!({"a": ["2"]}));

        let decoded = decode("a=1&a[x]=2");
        assert_eq!(query_to_json(&decoded), json!({"a": {"x": "2"}}));

        let decoded = decode("a[x]=1&a=2");
        assert_eq!(query_to_json(&decoded), json!({"a": "2"}));
    }

    #[test]
    fn empty_segment_after_list_appends_new_container() {
        let decoded = decode("rows[][id]=1&rows[][id]=2");
        assert_eq!(
            query_to_json(&decoded),
            json!({"rows": [{"id": "1"}, {"id": "2"}]})
        );
    }

    #[test]
    fn nested_lists() {
        let decoded = decode("grid[0][]=a&grid[0][]=b&grid[1][0]=c");
        assert_eq!(
            query_to_json(&decoded),
            json!({"grid": [["a", "b"], ["c"]]})
        );
    }

    #[test]
    fn malformed_brackets_keep_key_whole() {
        assert_eq!(split_key("a[b"), vec!["a[b"]);
        assert_eq!(split_key("a[b]c"), vec!["a[b]c"]);
        assert_eq!(split_key("[a]"), vec!["[a]"]);
        assert_eq!(split_key("field[a][b]"), vec!["field", "a", "b"]);
        assert_eq!(split_key("items[]"), vec!["items", ""]);
    }

    #[test]
    fn array_segment_classification() {
        assert!(is_array_segment(""));
        assert!(is_array_segment("0"));
        assert!(is_array_segment("42"));
        assert!(!is_array_segment("x1"));
        assert!(!is_array_segment("-1"));
    }

    #[test]
    fn encode_then_decode_reproduces_structure() {
        let mut reference = QueryMap::new();
        reference.insert("id".to_string(), s("123"));
        reference.insert("type".to_string(), s("Game Object"));

        let mut first = QueryMap::new();
        first.insert("x".to_string(), s("1"));
        let mut second = QueryMap::new();
        second.insert("x".to_string(), s("2&3"));
        second.insert("tags".to_string(), QueryValue::List(vec![s("a"), s("b")]));

        let mut original = QueryMap::new();
        original.insert("reference".to_string(), QueryValue::Map(reference));
        original.insert(
            "items".to_string(),
            QueryValue::List(vec![QueryValue::Map(first), QueryValue::Map(second)]),
        );
        original.insert("missing".to_string(), QueryValue::Null);
        original.insert(
            "sparse".to_string(),
            QueryValue::List(vec![QueryValue::Null, s("z")]),
        );
        original.insert("plain".to_string(), s("a+b=c"));

        let encoded = encode(&original);
        assert_eq!(decode(&encoded), original);
    }
}
