//! Loading API-format graphs, wiring input images and reading outputs back.
use std::cmp::Ordering;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tokio::fs;

use crate::error::{AppError, AppResult};

/// An image reference as ComfyUI reports it in history outputs and uploads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImageRef {
    #[serde(alias = "name")]
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default = "default_image_type")]
    pub kind: String,
}

fn default_image_type() -> String {
    "output".to_string()
}

/// Read a workflow file and return the bare node graph.
///
/// Accepts both `{"prompt": {...}}` and the bare graph. UI exports (the
/// `nodes`/`links` layout) are rejected since ComfyUI cannot queue them.
pub async fn load_graph(path: &Path) -> AppResult<Value> {
    let raw = fs::read_to_string(path)
        .await
        .map_err(|e| AppError::Workflow(format!("failed to read {}: {}", path.display(), e)))?;
    let mut wf: Value = serde_json::from_str(&raw)
        .map_err(|e| AppError::Workflow(format!("failed to parse {}: {}", path.display(), e)))?;
    if wf.get("prompt").map_or(false, Value::is_object) {
        wf = wf["prompt"].take();
    }
    let graph = wf;
    if !is_probably_graph(&graph) {
        return Err(AppError::Workflow(format!(
            "{} is not an API-format workflow (export it with 'Save (API Format)')",
            path.display()
        )));
    }
    Ok(graph)
}

pub fn is_probably_graph(graph: &Value) -> bool {
    graph.as_object().map_or(false, |nodes| {
        nodes
            .values()
            .any(|node| node.get("class_type").and_then(|ct| ct.as_str()).is_some())
    })
}

/// Numeric ids sort numerically, anything else falls back to string order.
pub(crate) fn compare_node_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

pub fn load_image_node_ids(graph: &Value) -> Vec<String> {
    let mut ids: Vec<String> = graph
        .as_object()
        .into_iter()
        .flat_map(|nodes| nodes.iter())
        .filter(|(_, node)| node.get("class_type").and_then(|ct| ct.as_str()) == Some("LoadImage"))
        .map(|(id, _)| id.clone())
        .collect();
    ids.sort_by(|a, b| compare_node_ids(a, b));
    ids
}

/// Point the first two `LoadImage` nodes (in id order) at the given images.
pub fn wire_input_images(graph: &mut Value, images: [&str; 2]) -> AppResult<()> {
    let ids = load_image_node_ids(graph);
    if ids.len() < 2 {
        return Err(AppError::Workflow(format!(
            "workflow has {} LoadImage node(s), two are required",
            ids.len()
        )));
    }
    for (id, image) in ids.iter().zip(images) {
        let inputs = graph
            .get_mut(id.as_str())
            .and_then(|node| node.get_mut("inputs"))
            .and_then(|inputs| inputs.as_object_mut())
            .ok_or_else(|| AppError::Workflow(format!("LoadImage node {} has no inputs", id)))?;
        inputs.insert("image".to_string(), Value::String(image.to_string()));
    }
    Ok(())
}

/// Collect every image listed under a history entry's `outputs`, saved
/// outputs ahead of previews.
pub fn collect_output_images(entry: &Value) -> Vec<ImageRef> {
    let mut out = Vec::new();
    if let Some(outputs) = entry.get("outputs") {
        collect_images(outputs, &mut out);
    }
    out.sort_by_key(|img| img.kind != "output");
    out
}

fn collect_images(v: &Value, out: &mut Vec<ImageRef>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map {
                if k == "images" {
                    if let Some(arr) = vv.as_array() {
                        out.extend(arr.iter().filter_map(|img| ImageRef::deserialize(img).ok()));
                        continue;
                    }
                }
                collect_images(vv, out);
            }
        }
        Value::Array(arr) => {
            for vv in arr {
                collect_images(vv, out);
            }
        }
        _ => {}
    }
}
