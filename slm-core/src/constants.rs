//! File names, remote database locations and product versions
//!
//! The title and version databases are downloaded and parsed elsewhere; this
//! crate only owns their names and the cache tags stored in the settings.

use std::path::{Path, PathBuf};

pub const SETTINGS_FILENAME: &str = "settings.json";
pub const TITLES_JSON_FILENAME: &str = "titles.json";
pub const VERSIONS_JSON_FILENAME: &str = "versions.json";

pub const SLM_VERSION: &str = "1.4.0";
pub const SLM_WEB_VERSION: &str = "1.0.12";

pub const TITLES_JSON_URL: &str = "https://tinfoil.io/repo/db/titles.json";
pub const VERSIONS_JSON_URL: &str =
    "https://raw.githubusercontent.com/blawar/titledb/master/versions.json";

/// Cache tags shipped with a fresh settings file
pub const DEFAULT_TITLES_ETAG: &str = "W/\"a5b02845cf6bd61:0\"";
pub const DEFAULT_VERSIONS_ETAG: &str = "W/\"2ef50d1cb6bd61:0\"";

pub const DEFAULT_LIBRARY_ROOT: &str = "/mnt/roms";
pub const DEFAULT_PORT: u16 = 3000;

/// DLC excluded from processing until a settings file says otherwise
pub const SEEDED_IGNORED_DLC_ID: &str = "01007F600B135007";

pub fn settings_path(data_folder: &Path) -> PathBuf {
    data_folder.join(SETTINGS_FILENAME)
}

pub fn titles_db_path(data_folder: &Path) -> PathBuf {
    data_folder.join(TITLES_JSON_FILENAME)
}

pub fn versions_db_path(data_folder: &Path) -> PathBuf {
    data_folder.join(VERSIONS_JSON_FILENAME)
}
