//! Configuration and constants
//!
//! - [`defaults`] - File names, label keys and fixed values
//! - [`settings`] - Repository-level settings (`stackforge.toml`)

pub mod defaults;
pub mod settings;
