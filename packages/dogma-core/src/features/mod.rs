//! One vertical slice per subsystem of §2's component table. Each slice
//! owns its `domain`/`ports`/`infrastructure` split where it talks to
//! the outside world; slices with nothing to store (e.g. `patch`) skip
//! the split entirely.

pub mod cache;
pub mod command;
pub mod commit_index;
pub mod encryption;
pub mod object_store;
pub mod patch;
pub mod repo_engine;
pub mod watch;
