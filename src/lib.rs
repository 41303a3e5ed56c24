//! Two-tier task lists with drag-and-drop restructuring.
//!
//! Tasks live in SQLite ([`db`], [`store`]); every structural change goes
//! through the [`engine`], after which [`reconcile`] rewrites the flat display
//! order. The [`gesture`] classifier turns pointer movement into at most one
//! engine call per drag, and [`service`] wraps it all behind ownership and
//! revision checks.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod gesture;
pub mod model;
pub mod paths;
pub mod reconcile;
pub mod service;
pub mod store;
pub mod validate;

pub use error::{Error, Result};
