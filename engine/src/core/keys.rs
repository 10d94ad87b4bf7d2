//! Dotted-path key updates for JSON and YAML documents.
//!
//! Missing intermediate maps are created; descending through a scalar or a
//! list is an error rather than a silent overwrite.

use serde_json::Value as Json;
use serde_yaml::{Mapping, Value as Yaml};

use crate::core::edit::{EditError, EditOutcome};

fn split_path(key_path: &str) -> Result<Vec<&str>, EditError> {
    let segments: Vec<&str> = key_path
        .split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if segments.is_empty() {
        return Err(EditError::EmptyKeyPath);
    }
    Ok(segments)
}

/// Set `key_path` (e.g. `a.b.c`) to `value` in a JSON document.
///
/// Output is pretty-printed with the original key order kept.
pub fn update_json_key(content: &str, key_path: &str, value: Json) -> Result<EditOutcome, EditError> {
    let segments = split_path(key_path)?;
    let mut doc: Json = if content.trim().is_empty() {
        Json::Object(serde_json::Map::new())
    } else {
        serde_json::from_str(content).map_err(|err| EditError::Parse {
            format: "json",
            message: err.to_string(),
        })?
    };

    let (last, parents) = segments
        .split_last()
        .ok_or(EditError::EmptyKeyPath)?;
    let mut node = &mut doc;
    let mut walked = String::new();
    for segment in parents {
        let Json::Object(map) = node else {
            return Err(EditError::NonMapIntermediate(display_path(&walked)));
        };
        push_segment(&mut walked, segment);
        node = map
            .entry(segment.to_string())
            .or_insert_with(|| Json::Object(serde_json::Map::new()));
    }
    let Json::Object(map) = node else {
        return Err(EditError::NonMapIntermediate(display_path(&walked)));
    };
    let previous = map.insert(last.to_string(), value.clone());

    let mut rendered = serde_json::to_string_pretty(&doc).map_err(|err| EditError::Parse {
        format: "json",
        message: err.to_string(),
    })?;
    rendered.push('\n');
    Ok(EditOutcome::new(rendered, format!("set {key_path}"))
        .with("key_path", key_path)
        .with("value", value)
        .with("previous", previous.unwrap_or(Json::Null)))
}

/// Set `key_path` to `value` in a YAML document.
pub fn update_yaml_key(content: &str, key_path: &str, value: Json) -> Result<EditOutcome, EditError> {
    let segments = split_path(key_path)?;
    let mut doc: Yaml = if content.trim().is_empty() {
        Yaml::Mapping(Mapping::new())
    } else {
        serde_yaml::from_str(content).map_err(|err| EditError::Parse {
            format: "yaml",
            message: err.to_string(),
        })?
    };
    if doc.is_null() {
        doc = Yaml::Mapping(Mapping::new());
    }
    let yaml_value = serde_yaml::to_value(&value).map_err(|err| EditError::Parse {
        format: "yaml",
        message: err.to_string(),
    })?;

    let (last, parents) = segments
        .split_last()
        .ok_or(EditError::EmptyKeyPath)?;
    let mut node = &mut doc;
    let mut walked = String::new();
    for segment in parents {
        let Yaml::Mapping(map) = node else {
            return Err(EditError::NonMapIntermediate(display_path(&walked)));
        };
        push_segment(&mut walked, segment);
        node = map
            .entry(Yaml::String(segment.to_string()))
            .or_insert_with(|| Yaml::Mapping(Mapping::new()));
    }
    let Yaml::Mapping(map) = node else {
        return Err(EditError::NonMapIntermediate(display_path(&walked)));
    };
    map.insert(Yaml::String(last.to_string()), yaml_value);

    let rendered = serde_yaml::to_string(&doc).map_err(|err| EditError::Parse {
        format: "yaml",
        message: err.to_string(),
    })?;
    Ok(EditOutcome::new(rendered, format!("set {key_path}"))
        .with("key_path", key_path)
        .with("value", value))
}

fn push_segment(walked: &mut String, segment: &str) {
    if !walked.is_empty() {
        walked.push('.');
    }
    walked.push_str(segment);
}

fn display_path(walked: &str) -> String {
    if walked.is_empty() {
        "<root>".to_string()
    } else {
        walked.to_string()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn json_adds_sibling_key() {
        let out = update_json_key(r#"{"a":{"b":1}}"#, "a.c", json!(42)).expect("update");
        let parsed: Json = serde_json::from_str(&out.content).expect("parse");
        assert_eq!(parsed, json!({"a": {"b": 1, "c": 42}}));
    }

    #[test]
    fn json_preserves_key_order() {
        let out = update_json_key(r#"{"z":1,"a":2}"#, "m", json!(true)).expect("update");
        assert_eq!(out.content, "{\n  \"z\": 1,\n  \"a\": 2,\n  \"m\": true\n}\n");
    }

    #[test]
    fn json_creates_missing_intermediates() {
        let out = update_json_key("{}", "x.y.z", json!("v")).expect("update");
        let parsed: Json = serde_json::from_str(&out.content).expect("parse");
        assert_eq!(parsed, json!({"x": {"y": {"z": "v"}}}));
    }

    #[test]
    fn json_refuses_non_map_intermediate() {
        let err = update_json_key(r#"{"a":5}"#, "a.b", json!(1)).expect_err("non-map");
        assert_eq!(err, EditError::NonMapIntermediate("a".to_string()));
        let err = update_json_key("[1,2]", "a", json!(1)).expect_err("root list");
        assert_eq!(err, EditError::NonMapIntermediate("<root>".to_string()));
    }

    #[test]
    fn empty_path_and_bad_json_fail() {
        assert_eq!(update_json_key("{}", " . ", json!(1)), Err(EditError::EmptyKeyPath));
        assert!(matches!(
            update_json_key("{not json", "a", json!(1)),
            Err(EditError::Parse { format: "json", .. })
        ));
    }

    #[test]
    fn yaml_update_nested() {
        let out = update_yaml_key("server:\n  port: 80\n", "server.host", json!("localhost"))
            .expect("update");
        let parsed: Yaml = serde_yaml::from_str(&out.content).expect("parse");
        assert_eq!(parsed["server"]["port"], Yaml::from(80));
        assert_eq!(parsed["server"]["host"], Yaml::from("localhost"));
    }

    #[test]
    fn yaml_refuses_scalar_intermediate() {
        let err = update_yaml_key("name: app\n", "name.first", json!("x")).expect_err("scalar");
        assert_eq!(err, EditError::NonMapIntermediate("name".to_string()));
    }
}
