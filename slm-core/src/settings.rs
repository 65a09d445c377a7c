//! Application settings model
//!
//! The on-disk key names are fixed by existing `settings.json` files, so
//! several fields carry a `rename` to their historical key.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::{
    DEFAULT_LIBRARY_ROOT, DEFAULT_PORT, DEFAULT_TITLES_ETAG, DEFAULT_VERSIONS_ETAG,
    SEEDED_IGNORED_DLC_ID,
};
use crate::error::{Error, Result};
use crate::template::{default_file_template, default_folder_template};

/// Persisted application settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Cache tag of the last versions database download
    #[serde(rename = "versions_etag")]
    pub versions_cache_tag: String,
    /// Cache tag of the last titles database download
    #[serde(rename = "titles_etag")]
    pub titles_cache_tag: String,
    /// Location of the `prod.keys` file
    #[serde(rename = "prod_keys")]
    pub credentials_path: PathBuf,
    /// Primary managed library folder
    #[serde(rename = "folder")]
    pub library_root: PathBuf,
    /// Extra folders to scan, in order
    #[serde(rename = "scan_folders")]
    pub scan_roots: Vec<PathBuf>,
    #[serde(rename = "port")]
    pub service_port: u16,
    #[serde(rename = "debug")]
    pub debug_enabled: bool,
    #[serde(rename = "organize_options")]
    pub organize_policy: OrganizePolicy,
    /// DLC title ids excluded from processing
    #[serde(rename = "ignore_dlc_title_ids")]
    pub ignored_content_ids: BTreeSet<String>,
}

/// Switches and name templates for the library organiser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizePolicy {
    #[serde(rename = "create_folder_per_game")]
    pub create_folder_per_item: bool,
    pub rename_files: bool,
    pub delete_empty_folders: bool,
    #[serde(rename = "delete_old_update_files")]
    pub delete_outdated_update_files: bool,
    pub folder_name_template: String,
    /// Keep generated names valid on the console's FAT32/exFAT cards
    #[serde(rename = "switch_safe_file_names")]
    pub sanitize_file_names: bool,
    pub file_name_template: String,
}

impl Default for OrganizePolicy {
    fn default() -> Self {
        Self {
            create_folder_per_item: false,
            rename_files: false,
            delete_empty_folders: false,
            delete_outdated_update_files: false,
            folder_name_template: String::new(),
            sanitize_file_names: true,
            file_name_template: String::new(),
        }
    }
}

impl OrganizePolicy {
    /// Policy written into a freshly created settings file
    pub fn defaults() -> Self {
        Self {
            folder_name_template: default_folder_template(),
            file_name_template: default_file_template(),
            ..Self::default()
        }
    }
}

/// The baseline: values held before any file content is applied.
impl Default for AppSettings {
    fn default() -> Self {
        Self {
            versions_cache_tag: String::new(),
            titles_cache_tag: String::new(),
            credentials_path: PathBuf::new(),
            library_root: PathBuf::new(),
            scan_roots: Vec::new(),
            service_port: 0,
            debug_enabled: false,
            organize_policy: OrganizePolicy::default(),
            ignored_content_ids: BTreeSet::from([SEEDED_IGNORED_DLC_ID.to_string()]),
        }
    }
}

impl AppSettings {
    /// Fields a partially readable file falls back to
    pub fn baseline() -> Self {
        Self::default()
    }

    /// Settings written when no file exists in `data_folder`
    pub fn defaults_for(data_folder: &Path) -> Self {
        Self {
            versions_cache_tag: DEFAULT_VERSIONS_ETAG.to_string(),
            titles_cache_tag: DEFAULT_TITLES_ETAG.to_string(),
            credentials_path: data_folder.to_path_buf(),
            library_root: PathBuf::from(DEFAULT_LIBRARY_ROOT),
            scan_roots: Vec::new(),
            service_port: DEFAULT_PORT,
            debug_enabled: false,
            organize_policy: OrganizePolicy::defaults(),
            ignored_content_ids: BTreeSet::new(),
        }
    }

    /// Serialize as written to disk: one-space indentation, no trailing newline
    pub fn to_json_pretty(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(512);
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b" ");
        let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut ser)?;
        Ok(out)
    }

    /// Replace one field addressed by its on-disk key, e.g. `port` or
    /// `organize_options.rename_files`. The value must decode to the
    /// field's type; on error `self` is left untouched.
    pub fn set_field(&mut self, key: &str, value: Value) -> Result<()> {
        let mut doc = serde_json::to_value(&*self)?;
        let pointer = key_to_pointer(key);

        let slot = doc.pointer_mut(&pointer).ok_or_else(|| Error::Decode {
            key: key.to_string(),
            message: "unknown settings key".into(),
        })?;
        *slot = value;

        *self = AppSettings::deserialize(&doc).map_err(|e| Error::Decode {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }
}

/// Result of decoding a settings file onto the baseline
#[derive(Debug)]
pub struct Decoded {
    pub settings: AppSettings,
    /// Keys whose values could not be applied; their baseline value was kept
    pub rejected: Vec<Error>,
}

/// Decode `bytes` key by key on top of [`AppSettings::baseline`].
///
/// Unknown keys and `null` values are skipped. A key whose value has the
/// wrong shape is reported in [`Decoded::rejected`] and keeps its baseline
/// value, neighbouring keys still load. Malformed JSON or a non-object root
/// is an error; the caller decides what to fall back to.
pub fn decode_lenient(bytes: &[u8]) -> Result<Decoded> {
    let file: Value = serde_json::from_slice(bytes)?;
    let fields = match file {
        Value::Object(fields) => fields,
        other => {
            return Err(Error::Decode {
                key: "<root>".into(),
                message: format!("expected a JSON object, found {}", json_kind(&other)),
            })
        }
    };

    let mut merged = serde_json::to_value(AppSettings::baseline())?;
    let mut rejected = Vec::new();
    overlay(&mut merged, "", fields, &mut rejected);

    let settings = AppSettings::deserialize(&merged)?;
    Ok(Decoded { settings, rejected })
}

fn overlay(
    merged: &mut Value,
    pointer: &str,
    incoming: Map<String, Value>,
    rejected: &mut Vec<Error>,
) {
    for (key, value) in incoming {
        let child = format!("{}/{}", pointer, escape_pointer(&key));
        let slot_is_object = match merged.pointer(&child) {
            Some(slot) => slot.is_object(),
            None => continue,
        };

        match value {
            Value::Null => {}
            Value::Object(nested) if slot_is_object => overlay(merged, &child, nested, rejected),
            value => {
                let Some(slot) = merged.pointer_mut(&child) else {
                    continue;
                };
                let previous = std::mem::replace(slot, value);

                if let Err(e) = AppSettings::deserialize(&*merged) {
                    if let Some(slot) = merged.pointer_mut(&child) {
                        *slot = previous;
                    }
                    rejected.push(Error::Decode {
                        key: pointer_to_key(&child),
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}

fn key_to_pointer(key: &str) -> String {
    key.split('.')
        .map(|part| format!("/{}", escape_pointer(part)))
        .collect()
}

fn pointer_to_key(pointer: &str) -> String {
    pointer
        .trim_start_matches('/')
        .split('/')
        .map(|part| part.replace("~1", "/").replace("~0", "~"))
        .collect::<Vec<_>>()
        .join(".")
}

fn escape_pointer(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
