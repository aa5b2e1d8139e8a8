//! JSON Patch construction for annotation mutations.
//!
//! Operations are built as [`PatchOperation`] values with a typed payload and
//! converted into `json_patch` operations when attached to a response.

use std::collections::BTreeMap;

use jsonptr::PointerBuf;
use serde::Serialize;
use serde_json::Value;

/// JSON Patch verb
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Replace,
    Remove,
}

/// Payload of a patch operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PatchValue {
    /// A single annotation value
    Text(String),
    /// A whole annotations object
    Map(BTreeMap<String, String>),
}

impl From<PatchValue> for Value {
    fn from(value: PatchValue) -> Self {
        match value {
            PatchValue::Text(text) => Value::String(text),
            PatchValue::Map(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::String(v)))
                    .collect(),
            ),
        }
    }
}

/// One `{op, path, value}` entry of a JSON Patch document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchOperation {
    pub op: PatchOp,
    pub path: PointerBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<PatchValue>,
}

impl PatchOperation {
    pub fn add(path: PointerBuf, value: PatchValue) -> Self {
        Self {
            op: PatchOp::Add,
            path,
            value: Some(value),
        }
    }

    pub fn replace(path: PointerBuf, value: PatchValue) -> Self {
        Self {
            op: PatchOp::Replace,
            path,
            value: Some(value),
        }
    }

    pub fn remove(path: PointerBuf) -> Self {
        Self {
            op: PatchOp::Remove,
            path,
            value: None,
        }
    }
}

impl From<PatchOperation> for json_patch::PatchOperation {
    fn from(operation: PatchOperation) -> Self {
        use json_patch::{AddOperation, RemoveOperation, ReplaceOperation};

        let path = operation.path;
        let value = operation.value.map(Value::from).unwrap_or(Value::Null);
        match operation.op {
            PatchOp::Add => json_patch::PatchOperation::Add(AddOperation { path, value }),
            PatchOp::Replace => {
                json_patch::PatchOperation::Replace(ReplaceOperation { path, value })
            }
            PatchOp::Remove => json_patch::PatchOperation::Remove(RemoveOperation { path }),
        }
    }
}

/// Collect operations into a `json_patch::Patch`
pub fn to_json_patch(operations: Vec<PatchOperation>) -> json_patch::Patch {
    json_patch::Patch(operations.into_iter().map(Into::into).collect())
}

fn annotations_path() -> PointerBuf {
    PointerBuf::from_tokens(["metadata", "annotations"])
}

fn annotation_path(key: &str) -> PointerBuf {
    PointerBuf::from_tokens(["metadata", "annotations", key])
}

/// Build the operations that bring `added` into the target's annotations.
///
/// Keys missing from `target` (or present with an empty value) are written by
/// a single `add` on `/metadata/annotations` whose map keeps the existing
/// annotations. Keys already set are rewritten with `replace` carrying the new
/// value. The `add` is emitted first so a later `replace` is never undone.
pub fn mutate_annotations(
    target: Option<&BTreeMap<String, String>>,
    added: &BTreeMap<String, String>,
) -> Vec<PatchOperation> {
    let mut merged = target.cloned().unwrap_or_default();
    let mut missing = false;
    let mut replacements = Vec::new();

    for (key, value) in added {
        let present = target
            .and_then(|annotations| annotations.get(key))
            .is_some_and(|current| !current.is_empty());
        if present {
            replacements.push(PatchOperation::replace(
                annotation_path(key),
                PatchValue::Text(value.clone()),
            ));
        } else {
            merged.insert(key.clone(), value.clone());
            missing = true;
        }
    }

    let mut operations = Vec::with_capacity(replacements.len() + 1);
    if missing {
        operations.push(PatchOperation::add(
            annotations_path(),
            PatchValue::Map(merged),
        ));
    }
    operations.extend(replacements);
    operations
}
