//! Command-line driver for the redline suggestion engine.
//!
//! `redline init` writes a default `redline.config.json`; `redline replay`
//! runs a JSON edit script through an [`redline_suggest::Editor`] and prints
//! the annotated document with its suggestion records.

pub mod commands;
pub mod render;
pub mod script;
