//! Patch application (§4.C): RFC 6902 JSON Patch for json/yaml entries,
//! unified-diff text patches for text entries, and the "safe-replace"
//! diff emission used when the repository engine computes a preview
//! diff for `diff`/`normalizing_push`.

mod json_patch_ops;
mod text_patch_ops;

pub use json_patch_ops::{apply_json_patch, safe_diff_json};
pub use text_patch_ops::{apply_text_patch, diff_text};
