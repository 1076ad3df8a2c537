//! dogma-core: the storage and mutation engine of a versioned,
//! replicated configuration repository server.
//!
//! Layering mirrors the feature-first hexagonal style this crate grew
//! from: `domain` holds pure data and invariants, `features::*` holds
//! one vertical slice per subsystem (object store, commit index, repo
//! engine, cache, watch, command, encryption), each with its own
//! `domain`/`ports`/`infrastructure` split where the subsystem talks to
//! the outside world.

pub mod config;
pub mod domain;
pub mod error;
pub mod features;

pub use error::{DogmaError, Result};
