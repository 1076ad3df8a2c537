use json_patch::{Patch, PatchOperation, ReplaceOperation, TestOperation};
use serde_json::Value;

use crate::error::{DogmaError, Result};

/// Apply an RFC 6902 patch document to `target`, returning the patched
/// value. A patch that can't apply (bad pointer, failed `test`) becomes
/// a `change-conflict`, never a panic.
pub fn apply_json_patch(target: &Value, patch_doc: &Value) -> Result<Value> {
    let patch: Patch = serde_json::from_value(patch_doc.clone())
        .map_err(|e| DogmaError::ChangeConflict {
            path: String::new(),
            reason: format!("invalid JSON patch document: {e}"),
        })?;
    let mut result = target.clone();
    json_patch::patch(&mut result, &patch).map_err(|e| DogmaError::ChangeConflict {
        path: String::new(),
        reason: format!("patch did not apply: {e}"),
    })?;
    Ok(result)
}

/// Compute an RFC 6902 patch from `old` to `new`, then inject a `test`
/// of the prior value immediately before every `replace`, so a patch
/// produced by `diff` can never silently clobber a value it wasn't
/// diffed against (§4.C's "safe-replace" rule).
pub fn safe_diff_json(old: &Value, new: &Value) -> Value {
    let raw = json_patch::diff(old, new);
    let mut safe_ops = Vec::with_capacity(raw.0.len());
    for op in raw.0 {
        if let PatchOperation::Replace(ReplaceOperation { path, value }) = &op {
            if let Some(prior) = pointer_get(old, path) {
                safe_ops.push(PatchOperation::Test(TestOperation {
                    path: path.clone(),
                    value: prior.clone(),
                }));
            }
        }
        safe_ops.push(op);
    }
    serde_json::to_value(Patch(safe_ops)).expect("patch serializes")
}

fn pointer_get<'a>(value: &'a Value, pointer: &json_patch::jsonptr::PointerBuf) -> Option<&'a Value> {
    value.pointer(pointer.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn apply_replace_patch() {
        let target = json!({"a": 1});
        let patch = json!([{"op": "replace", "path": "/a", "value": 2}]);
        let result = apply_json_patch(&target, &patch).unwrap();
        assert_eq!(result, json!({"a": 2}));
    }

    #[test]
    fn apply_rejects_patch_with_bad_test() {
        let target = json!({"a": 1});
        let patch = json!([
            {"op": "test", "path": "/a", "value": 99},
            {"op": "replace", "path": "/a", "value": 2}
        ]);
        assert!(apply_json_patch(&target, &patch).is_err());
    }

    #[test]
    fn safe_diff_guards_every_replace_with_a_test() {
        let old = json!({"a": 1, "b": 2});
        let new = json!({"a": 5, "b": 2});
        let patch_value = safe_diff_json(&old, &new);
        let ops = patch_value.as_array().unwrap();
        let has_test = ops.iter().any(|op| op["op"] == "test");
        assert!(has_test);
        // The diff's own output must re-apply cleanly against `old`.
        assert_eq!(apply_json_patch(&old, &patch_value).unwrap(), new);
    }
}
