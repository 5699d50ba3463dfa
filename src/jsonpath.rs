//! Slash-separated path queries against a JSON tree.
use json::JsonValue;

/// Returns clones of all values at the given /-separated key path.
///
/// A leading "//" means the first path segment may match at any depth;
/// the remaining segments are then resolved beneath each match.  Hits
/// that themselves resolve to arrays are flattened into the output.
/// Missing segments yield an empty result, not an error.
///
/// ```
/// let v = json::object! {a: {b: {c: 1}}};
/// let hits = busrpc::jsonpath::find(&v, "/a/b/c");
/// assert_eq!(hits.len(), 1);
/// assert_eq!(hits[0].as_u8().unwrap(), 1u8);
/// assert!(busrpc::jsonpath::find(&v, "/a/x").is_empty());
/// ```
pub fn find(value: &JsonValue, path: &str) -> Vec<JsonValue> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if segments.is_empty() {
        return Vec::new();
    }

    if path.starts_with("//") {
        return find_any_depth(value, &segments);
    }

    match descend(value, &segments) {
        Some(v) => vec![v],
        None => Vec::new(),
    }
}

/// Resolve a simple key path from the root, cloning the final value.
fn descend(value: &JsonValue, segments: &[&str]) -> Option<JsonValue> {
    let mut cur = value;

    for seg in segments {
        cur = &cur[*seg]; // JsonValue::Null when the key is not found.
    }

    if cur.is_null() {
        None
    } else {
        Some(cur.clone())
    }
}

fn find_any_depth(value: &JsonValue, segments: &[&str]) -> Vec<JsonValue> {
    let root = segments[0];
    let rest = &segments[1..];

    // Collect every value stored under the root key, at any depth.
    let mut candidates = Vec::new();
    collect_key_matches(value, root, &mut candidates);

    if rest.is_empty() {
        return candidates;
    }

    // Resolve the remaining path beneath each candidate, flattening
    // array-valued hits into the output.
    let mut matches = Vec::new();
    for cand in candidates.iter() {
        if let Some(hit) = descend(cand, rest) {
            if hit.is_array() {
                for item in hit.members() {
                    matches.push(item.clone());
                }
            } else {
                matches.push(hit);
            }
        }
    }

    matches
}

/// Depth-first collection of all values stored under `key`.
fn collect_key_matches(value: &JsonValue, key: &str, matches: &mut Vec<JsonValue>) {
    if value.is_object() {
        if !value[key].is_null() {
            matches.push(value[key].clone());
        }
        for (_, child) in value.entries() {
            collect_key_matches(child, key, matches);
        }
    } else if value.is_array() {
        for child in value.members() {
            collect_key_matches(child, key, matches);
        }
    }
}
