use crate::error::{DogmaError, Result};

/// Apply a unified diff to `original`, producing the patched text. A
/// patch whose context no longer matches becomes `change-conflict`.
pub fn apply_text_patch(original: &str, unified_diff: &str) -> Result<String> {
    let patch = diffy::Patch::from_str(unified_diff).map_err(|e| DogmaError::ChangeConflict {
        path: String::new(),
        reason: format!("invalid unified diff: {e}"),
    })?;
    diffy::apply(original, &patch).map_err(|e| DogmaError::ChangeConflict {
        path: String::new(),
        reason: format!("patch did not apply: {e}"),
    })
}

/// Unified diff between two text revisions, used both to show a preview
/// diff and as the payload of an `ApplyTextPatch` change.
pub fn diff_text(old: &str, new: &str) -> String {
    diffy::create_patch(old, new).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_diff_and_apply() {
        let old = "line one\nline two\nline three\n";
        let new = "line one\nline TWO\nline three\n";
        let diff = diff_text(old, new);
        let patched = apply_text_patch(old, &diff).unwrap();
        assert_eq!(patched, new);
    }

    #[test]
    fn apply_rejects_patch_against_mismatched_original() {
        let old = "line one\nline two\n";
        let new = "line one\nline TWO\n";
        let diff = diff_text(old, new);
        let result = apply_text_patch("totally different\ncontent\n", &diff);
        assert!(result.is_err());
    }
}
