//! slm-core: persistent settings for the Switch library manager
//!
//! This crate owns `settings.json`:
//! - the settings model and its two default profiles (baseline, full defaults)
//! - a shared [`SettingsStore`] handle that loads once and saves atomically
//! - names of the companion title/version databases and naming-template tokens
//!
//! The HTTP layer, organiser and database fetcher consume these types.

pub mod constants;
pub mod error;
pub mod settings;
pub mod store;
pub mod template;

pub use error::{Error, Result};
pub use settings::{decode_lenient, AppSettings, Decoded, OrganizePolicy};
pub use store::{LoadOutcome, SaveReport, SettingsStore};
pub use template::TemplateToken;
