//! Job parameters applied onto an API-format graph.
//!
//! `params` is the open-ended map a caller sends with a job. Known keys are
//! matched to node inputs of the same name; `sets` addresses exact paths.
use serde_json::{json, Map, Value};

use crate::error::{AppError, AppResult};

pub const DEFAULT_FILENAME_PREFIX: &str = "ComfyEdit";

// Keys written to every node input carrying the same name.
const KNOWN_PARAM_KEYS: &[&str] = &[
    "seed",
    "steps",
    "cfg",
    "sampler_name",
    "scheduler",
    "denoise",
    "width",
    "height",
    "batch_size",
    "ckpt_name",
    "text",
    "prompt",
];

/// Apply a job's params to `graph`.
///
/// - `text_positive` / `text_negative` follow the first KSampler's
///   conditioning links to the encoder nodes feeding it.
/// - every key in [`KNOWN_PARAM_KEYS`] overwrites the matching input on all
///   nodes that already have it.
/// - `sets` is an object of dotted paths (`"3.inputs.seed"`) to values.
/// - `filename_prefix` sets SaveImage prefixes; a default is filled in when
///   the workflow leaves one unset.
pub fn apply_params(graph: &mut Value, params: &Map<String, Value>) -> AppResult<()> {
    let text_pos = params.get("text_positive");
    let text_neg = params.get("text_negative");
    if text_pos.is_some() || text_neg.is_some() {
        apply_text_pos_neg(graph, text_pos, text_neg);
    }

    let kvs: Vec<(&str, &Value)> = KNOWN_PARAM_KEYS
        .iter()
        .filter_map(|k| params.get(*k).map(|v| (*k, v)))
        .collect();
    if !kvs.is_empty() {
        if let Some(nodes) = graph.as_object_mut() {
            for node in nodes.values_mut() {
                if let Some(inputs) = node.get_mut("inputs").and_then(|v| v.as_object_mut()) {
                    for (k, v) in &kvs {
                        // Linked inputs ([node_id, slot]) are wiring, not values.
                        if inputs.get(*k).map_or(false, |cur| !cur.is_array()) {
                            inputs.insert((*k).to_string(), (*v).clone());
                        }
                    }
                }
            }
        }
    }

    if let Some(sets) = params.get("sets") {
        let sets = sets
            .as_object()
            .ok_or_else(|| AppError::Workflow("'sets' must be an object of path -> value".into()))?;
        for (path, value) in sets {
            let segments: Vec<String> = path.split('.').map(String::from).collect();
            if !apply_set_path(graph, &segments, value.clone()) {
                return Err(AppError::Workflow(format!("cannot set path '{}'", path)));
            }
        }
    }

    match params.get("filename_prefix").and_then(|v| v.as_str()) {
        Some(prefix) => set_filename_prefix(graph, prefix, true),
        None => set_filename_prefix(graph, DEFAULT_FILENAME_PREFIX, false),
    }
    Ok(())
}

/// Parse CLI style `KEY=VALUE` overrides into a params map. Keys with a dot
/// are collected under `sets`.
pub fn parse_set_pairs(items: &[String]) -> AppResult<Map<String, Value>> {
    let mut params = Map::new();
    let mut sets = Map::new();
    for s in items {
        let Some((k, val)) = s.split_once('=') else {
            return Err(AppError::Validation(format!("Invalid --set '{}', expected KEY=VALUE", s)));
        };
        if k.contains('.') {
            sets.insert(k.to_string(), parse_value(val));
        } else {
            params.insert(k.to_string(), parse_value(val));
        }
    }
    if !sets.is_empty() {
        params.insert("sets".to_string(), Value::Object(sets));
    }
    Ok(params)
}

pub fn parse_value(src: &str) -> Value {
    if let Ok(v) = serde_json::from_str::<Value>(src) {
        return v;
    }
    if src.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    if src.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if src.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if let Ok(f) = src.parse::<f64>() {
        return json!(f);
    }
    Value::String(src.to_string())
}

/// Write `new_val` at `path`; every segment but the last must exist.
pub fn apply_set_path(root: &mut Value, path: &[String], new_val: Value) -> bool {
    let Some((last, parents)) = path.split_last() else {
        return false;
    };
    let mut cur = root;
    for key in parents {
        match cur.get_mut(key.as_str()) {
            Some(next) => cur = next,
            None => return false,
        }
    }
    match cur {
        Value::Object(map) => {
            map.insert(last.clone(), new_val);
            true
        }
        _ => false,
    }
}

fn set_filename_prefix(graph: &mut Value, prefix: &str, overwrite: bool) {
    let Some(nodes) = graph.as_object_mut() else {
        return;
    };
    for node in nodes.values_mut() {
        if node.get("class_type").and_then(|v| v.as_str()) != Some("SaveImage") {
            continue;
        }
        if let Some(inputs) = node.get_mut("inputs").and_then(|v| v.as_object_mut()) {
            if overwrite || !inputs.contains_key("filename_prefix") {
                inputs.insert("filename_prefix".to_string(), Value::String(prefix.to_string()));
            }
        }
    }
}

fn apply_text_pos_neg(graph: &mut Value, text_pos: Option<&Value>, text_neg: Option<&Value>) {
    let Some(ks_id) = first_node_id_by_class(graph, "KSampler") else {
        tracing::warn!("text_positive/text_negative given but workflow has no KSampler");
        return;
    };
    for (input_name, text) in [("positive", text_pos), ("negative", text_neg)] {
        let Some(text) = text else { continue };
        let Some(src) = linked_source(graph, &ks_id, input_name) else {
            continue;
        };
        if let Some(inputs) = graph
            .get_mut(src.as_str())
            .and_then(|n| n.get_mut("inputs"))
            .and_then(|i| i.as_object_mut())
        {
            // Qwen edit encoders take `prompt`; CLIPTextEncode takes `text`.
            let key = if inputs.contains_key("prompt") { "prompt" } else { "text" };
            inputs.insert(key.to_string(), text.clone());
        }
    }
}

fn first_node_id_by_class(graph: &Value, class_type: &str) -> Option<String> {
    let mut ids: Vec<&String> = graph
        .as_object()?
        .iter()
        .filter(|(_, node)| node.get("class_type").and_then(|ct| ct.as_str()) == Some(class_type))
        .map(|(id, _)| id)
        .collect();
    ids.sort_by(|a, b| super::graph::compare_node_ids(a, b));
    ids.first().map(|id| (*id).clone())
}

fn linked_source(graph: &Value, node_id: &str, input_name: &str) -> Option<String> {
    let link = graph.get(node_id)?.get("inputs")?.get(input_name)?.as_array()?;
    match link.first()? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> Value {
        json!({
            "3": {"class_type": "KSampler", "inputs": {
                "seed": 1, "steps": 20, "cfg": 2.5,
                "positive": ["6", 0], "negative": ["7", 0], "model": ["4", 0]
            }},
            "4": {"class_type": "CheckpointLoaderSimple", "inputs": {"ckpt_name": "a.safetensors"}},
            "6": {"class_type": "TextEncodeQwenImageEditPlus", "inputs": {"prompt": "old", "clip": ["4", 1]}},
            "7": {"class_type": "CLIPTextEncode", "inputs": {"text": "", "clip": ["4", 1]}},
            "9": {"class_type": "SaveImage", "inputs": {"images": ["8", 0]}}
        })
    }

    fn params(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn known_keys_overwrite_matching_inputs_only() {
        let mut g = graph();
        apply_params(&mut g, &params(json!({"seed": 42, "ckpt_name": "b.safetensors", "unknown": 1}))).unwrap();
        assert_eq!(g["3"]["inputs"]["seed"], 42);
        assert_eq!(g["4"]["inputs"]["ckpt_name"], "b.safetensors");
        assert!(g["3"]["inputs"].get("unknown").is_none());
    }

    #[test]
    fn links_are_not_overwritten() {
        let mut g = graph();
        g["3"]["inputs"]["prompt"] = json!(["6", 0]);
        apply_params(&mut g, &params(json!({"prompt": "make it blue"}))).unwrap();
        assert_eq!(g["3"]["inputs"]["prompt"], json!(["6", 0]));
        assert_eq!(g["6"]["inputs"]["prompt"], "make it blue");
    }

    #[test]
    fn positive_and_negative_follow_ksampler_links() {
        let mut g = graph();
        apply_params(&mut g, &params(json!({"text_positive": "sunset", "text_negative": "blurry"}))).unwrap();
        assert_eq!(g["6"]["inputs"]["prompt"], "sunset");
        assert_eq!(g["7"]["inputs"]["text"], "blurry");
    }

    #[test]
    fn sets_write_exact_paths_and_reject_missing_parents() {
        let mut g = graph();
        apply_params(&mut g, &params(json!({"sets": {"3.inputs.steps": 8}}))).unwrap();
        assert_eq!(g["3"]["inputs"]["steps"], 8);

        let err = apply_params(&mut g, &params(json!({"sets": {"99.inputs.steps": 8}}))).unwrap_err();
        assert!(matches!(err, AppError::Workflow(_)));
    }

    #[test]
    fn filename_prefix_defaults_then_overrides() {
        let mut g = graph();
        apply_params(&mut g, &Map::new()).unwrap();
        assert_eq!(g["9"]["inputs"]["filename_prefix"], DEFAULT_FILENAME_PREFIX);

        apply_params(&mut g, &params(json!({"filename_prefix": "job42"}))).unwrap();
        assert_eq!(g["9"]["inputs"]["filename_prefix"], "job42");
    }

    #[test]
    fn parse_set_pairs_splits_paths_into_sets() {
        let items = vec!["seed=5".to_string(), "3.inputs.cfg=1.5".to_string(), "prompt=a cat".to_string()];
        let p = parse_set_pairs(&items).unwrap();
        assert_eq!(p["seed"], 5);
        assert_eq!(p["prompt"], "a cat");
        assert_eq!(p["sets"]["3.inputs.cfg"], 1.5);

        assert!(parse_set_pairs(&["novalue".to_string()]).is_err());
    }

    #[test]
    fn parse_value_falls_back_to_string() {
        assert_eq!(parse_value("TRUE"), Value::Bool(true));
        assert_eq!(parse_value("[1,2]"), json!([1, 2]));
        assert_eq!(parse_value("euler"), json!("euler"));
    }
}
