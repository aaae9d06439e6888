//! Dot-notation path helpers over configuration trees

use glob::Pattern;
use serde_json::{Map, Value};

use crate::error::{ConfigError, ConfigResult};

/// Join a parent path and a key
pub fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|s| !s.is_empty())
}

/// Look up a value by dot-path; numeric segments index into lists
pub fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in segments(path) {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Write a value at a dot-path
///
/// Missing intermediate maps are created only when `create_missing` is set.
/// Writing through a non-map value is always an error.
pub fn set_path(root: &mut Value, path: &str, value: Value, create_missing: bool) -> ConfigResult<()> {
    let parts: Vec<&str> = segments(path).collect();
    let (last, parents) = parts
        .split_last()
        .ok_or_else(|| ConfigError::invalid_path(path, "path is empty"))?;

    if !root.is_object() {
        return Err(ConfigError::invalid_path(path, "root is not a map"));
    }

    let mut current = root;
    for (idx, segment) in parents.iter().enumerate() {
        let map = current
            .as_object_mut()
            .ok_or_else(|| ConfigError::invalid_path(path, format!("'{}' is not a map", parents[..idx].join("."))))?;
        if !map.contains_key(*segment) {
            if !create_missing {
                return Err(ConfigError::invalid_path(
                    path,
                    format!("missing key '{}'", parents[..=idx].join(".")),
                ));
            }
            map.insert(segment.to_string(), Value::Object(Map::new()));
        }
        current = map
            .get_mut(*segment)
            .ok_or_else(|| ConfigError::internal("key vanished during path walk"))?;
    }

    let map = current
        .as_object_mut()
        .ok_or_else(|| ConfigError::invalid_path(path, format!("'{}' is not a map", parents.join("."))))?;
    map.insert(last.to_string(), value);
    Ok(())
}

/// Remove the value at a dot-path, returning it
pub fn remove_path(root: &mut Value, path: &str) -> Option<Value> {
    let parts: Vec<&str> = segments(path).collect();
    let (last, parents) = parts.split_last()?;
    let mut current = root;
    for segment in parents {
        current = current.as_object_mut()?.get_mut(*segment)?;
    }
    current.as_object_mut()?.remove(*last)
}

/// Every map path in the tree, intermediate and leaf, sorted
pub fn flatten_paths(root: &Value) -> Vec<String> {
    let mut paths = Vec::new();
    let mut stack: Vec<(String, &Value)> = vec![(String::new(), root)];
    while let Some((prefix, value)) = stack.pop() {
        if let Value::Object(map) = value {
            for (key, child) in map {
                let path = join(&prefix, key);
                stack.push((path.clone(), child));
                paths.push(path);
            }
        }
    }
    paths.sort();
    paths
}

/// Glob matcher over dot-paths; `*` crosses segment boundaries
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    pattern: Pattern,
}

impl PathPattern {
    pub fn new(raw: &str) -> ConfigResult<Self> {
        let pattern =
            Pattern::new(raw).map_err(|e| ConfigError::invalid_rule(raw, e.to_string()))?;
        Ok(Self {
            raw: raw.to_string(),
            pattern,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, path: &str) -> bool {
        self.raw == path || self.pattern.matches(path)
    }
}

/// One-off glob test; invalid patterns only match literally
pub fn glob_matches(pattern: &str, path: &str) -> bool {
    match Pattern::new(pattern) {
        Ok(p) => pattern == path || p.matches(path),
        Err(_) => pattern == path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_nested_and_indexed() {
        let doc = json!({"settings": {"paths": ["a", "b"], "debug": true}});
        assert_eq!(get_path(&doc, "settings.debug"), Some(&json!(true)));
        assert_eq!(get_path(&doc, "settings.paths.1"), Some(&json!("b")));
        assert_eq!(get_path(&doc, "settings.missing"), None);
    }

    #[test]
    fn test_set_requires_create_missing() {
        let mut doc = json!({"settings": {}});
        assert!(set_path(&mut doc, "tools.git.enabled", json!(true), false).is_err());
        set_path(&mut doc, "tools.git.enabled", json!(true), true).unwrap();
        assert_eq!(doc["tools"]["git"]["enabled"], json!(true));
        set_path(&mut doc, "settings.debug", json!(false), false).unwrap();
        assert_eq!(doc["settings"]["debug"], json!(false));
    }

    #[test]
    fn test_set_through_scalar_fails() {
        let mut doc = json!({"settings": 3});
        assert!(set_path(&mut doc, "settings.debug", json!(true), true).is_err());
    }

    #[test]
    fn test_remove_path() {
        let mut doc = json!({"a": {"b": 1, "c": 2}});
        assert_eq!(remove_path(&mut doc, "a.b"), Some(json!(1)));
        assert_eq!(doc, json!({"a": {"c": 2}}));
        assert_eq!(remove_path(&mut doc, "a.zzz"), None);
    }

    #[test]
    fn test_flatten_paths() {
        let doc = json!({"a": {"b": 1}, "c": [1]});
        assert_eq!(flatten_paths(&doc), vec!["a", "a.b", "c"]);
    }

    #[test]
    fn test_pattern_crosses_segments() {
        let p = PathPattern::new("*.debug").unwrap();
        assert!(p.matches("settings.debug"));
        assert!(p.matches("tools.git.debug"));
        assert!(!p.matches("settings.debugger"));
        assert!(glob_matches("security.*", "security.tls.verify"));
    }
}
