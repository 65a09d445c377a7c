//! Settings store backed by `settings.json` in a data folder
//!
//! The file is read once when the store is opened; afterwards the cached
//! copy is authoritative for this process and only [`SettingsStore::save`]
//! replaces it. Clones of a store share the same cached copy.
//!
//! Loading never fails:
//! - no file: full defaults are created and written
//! - file present but not openable: warning, full defaults written
//! - file opened but (partly) undecodable: baseline values kept for the
//!   affected keys, nothing written
//!
//! Each path is reported through [`LoadOutcome`] so callers can tell them
//! apart.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::constants::settings_path;
use crate::error::{Error, Result};
use crate::settings::{decode_lenient, AppSettings};

/// How the settings held by a store were obtained
#[derive(Debug)]
pub enum LoadOutcome {
    /// Every key in the file was applied
    Loaded,
    /// The file was read but some or all of it could not be decoded;
    /// affected fields hold baseline values
    PartiallyDecoded { rejected: Vec<Error> },
    /// No file existed; defaults were created
    Created { persist_error: Option<Error> },
    /// The file existed but could not be opened; defaults were created
    RecoveredWithDefaults {
        cause: Error,
        persist_error: Option<Error>,
    },
}

impl LoadOutcome {
    /// True when the settings came from the existing file
    pub fn from_disk(&self) -> bool {
        matches!(self, LoadOutcome::Loaded | LoadOutcome::PartiallyDecoded { .. })
    }

    /// Error from writing defaults, if defaults were written
    pub fn persist_error(&self) -> Option<&Error> {
        match self {
            LoadOutcome::Created { persist_error }
            | LoadOutcome::RecoveredWithDefaults { persist_error, .. } => persist_error.as_ref(),
            _ => None,
        }
    }
}

/// Result of a save. The in-memory settings are replaced even when
/// writing failed.
#[derive(Debug)]
#[must_use]
pub struct SaveReport {
    pub settings: Arc<AppSettings>,
    pub error: Option<Error>,
}

impl SaveReport {
    pub fn is_persisted(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<Arc<AppSettings>> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.settings),
        }
    }
}

struct Shared {
    data_folder: PathBuf,
    current: RwLock<Arc<AppSettings>>,
    outcome: LoadOutcome,
}

/// Shared handle to the process settings
#[derive(Clone)]
pub struct SettingsStore {
    shared: Arc<Shared>,
}

impl SettingsStore {
    /// Load settings from `data_folder/settings.json`, creating the file
    /// with defaults when it does not exist.
    pub fn open<P: AsRef<Path>>(data_folder: P) -> Self {
        let data_folder = data_folder.as_ref().to_path_buf();
        let path = settings_path(&data_folder);

        let (settings, outcome) = match open_settings_file(&path) {
            Ok(file) => load_from(file, &path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let defaults = AppSettings::defaults_for(&data_folder);
                let persist_error = write_settings(&path, &defaults).err();
                match &persist_error {
                    None => info!("Created default settings at {:?}", path),
                    Some(err) => warn!("Could not write default settings: {}", err),
                }
                (defaults, LoadOutcome::Created { persist_error })
            }
            Err(e) => {
                warn!("Missing or corrupted config file, creating a new one: {}", e);
                let defaults = AppSettings::defaults_for(&data_folder);
                let persist_error = write_settings(&path, &defaults).err();
                if let Some(err) = &persist_error {
                    warn!("Could not write default settings: {}", err);
                }
                let cause = Error::io(&path, e);
                (defaults, LoadOutcome::RecoveredWithDefaults { cause, persist_error })
            }
        };

        Self {
            shared: Arc::new(Shared {
                data_folder,
                current: RwLock::new(Arc::new(settings)),
                outcome,
            }),
        }
    }

    /// The cached settings. Never touches disk; returns the same `Arc`
    /// until the next save.
    pub fn current(&self) -> Arc<AppSettings> {
        Arc::clone(&self.read_guard())
    }

    pub fn outcome(&self) -> &LoadOutcome {
        &self.shared.outcome
    }

    pub fn data_folder(&self) -> &Path {
        &self.shared.data_folder
    }

    pub fn settings_path(&self) -> PathBuf {
        settings_path(&self.shared.data_folder)
    }

    /// Overwrite the settings file with `settings` and make it the cached copy
    pub fn save(&self, settings: AppSettings) -> SaveReport {
        let settings = Arc::new(settings);
        let path = self.settings_path();

        let error = match write_settings(&path, &settings) {
            Ok(()) => {
                debug!("Saved settings to {:?}", path);
                None
            }
            Err(e) => {
                warn!("Failed to persist settings: {}", e);
                Some(e)
            }
        };

        *self.write_guard() = Arc::clone(&settings);
        SaveReport { settings, error }
    }

    /// Clone the cached settings, apply `edit`, and save the result
    pub fn update<F>(&self, edit: F) -> SaveReport
    where
        F: FnOnce(&mut AppSettings),
    {
        let mut next = AppSettings::clone(&self.current());
        edit(&mut next);
        self.save(next)
    }

    /// Save the full defaults for this store's data folder
    pub fn reset_to_defaults(&self) -> SaveReport {
        self.save(AppSettings::defaults_for(&self.shared.data_folder))
    }

    /// Literal content of the settings file. Writes defaults first when
    /// the file is missing.
    pub fn read_raw_text(&self) -> Result<String> {
        let path = self.settings_path();

        let bytes = match fs::read(&path).map_err(|e| Error::io(&path, e)) {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => {
                self.reset_to_defaults().into_result()?;
                fs::read(&path).map_err(|e| Error::io(&path, e))?
            }
            Err(e) => return Err(e),
        };

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Like [`read_raw_text`](Self::read_raw_text) but returns an empty
    /// string on failure, for display-only callers.
    pub fn raw_text_lossy(&self) -> String {
        self.read_raw_text().unwrap_or_else(|e| {
            warn!("Could not read settings file: {}", e);
            String::new()
        })
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, Arc<AppSettings>> {
        self.shared.current.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, Arc<AppSettings>> {
        self.shared.current.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Open the settings file; a directory in its place counts as unopenable
fn open_settings_file(path: &Path) -> io::Result<File> {
    let file = File::open(path)?;
    if file.metadata()?.is_dir() {
        return Err(io::Error::new(io::ErrorKind::Other, "settings path is a directory"));
    }
    Ok(file)
}

fn load_from(mut file: File, path: &Path) -> (AppSettings, LoadOutcome) {
    let mut bytes = Vec::new();
    if let Err(e) = file.read_to_end(&mut bytes) {
        warn!("Failed to read {:?}: {}", path, e);
        let rejected = vec![Error::io(path, e)];
        return (AppSettings::baseline(), LoadOutcome::PartiallyDecoded { rejected });
    }

    match decode_lenient(&bytes) {
        Ok(decoded) if decoded.rejected.is_empty() => {
            debug!("Loaded settings from {:?}", path);
            (decoded.settings, LoadOutcome::Loaded)
        }
        Ok(decoded) => {
            for e in &decoded.rejected {
                warn!("Ignoring settings value: {}", e);
            }
            (decoded.settings, LoadOutcome::PartiallyDecoded { rejected: decoded.rejected })
        }
        Err(e) => {
            warn!("Settings file {:?} could not be decoded, using baseline values: {}", path, e);
            (AppSettings::baseline(), LoadOutcome::PartiallyDecoded { rejected: vec![e] })
        }
    }
}

/// Write through a temp file next to the real file and rename it into
/// place, so readers never observe a half-written file. A symlinked
/// `settings.json` is written through, and an existing file keeps its mode.
fn write_settings(path: &Path, settings: &AppSettings) -> Result<()> {
    let bytes = settings.to_json_pretty()?;
    let target = resolve_target(path);
    let dir = match target.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
    tmp.write_all(&bytes).map_err(|e| Error::io(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| Error::io(tmp.path(), e))?;

    let permissions = match fs::metadata(&target) {
        Ok(meta) => Some(meta.permissions()),
        Err(_) => new_file_permissions(),
    };
    if let Some(permissions) = permissions {
        fs::set_permissions(tmp.path(), permissions).map_err(|e| Error::io(tmp.path(), e))?;
    }

    tmp.persist(&target).map_err(|e| Error::Persist {
        path: target.clone(),
        source: e.error,
    })?;
    Ok(())
}

/// Follow `path` to the file it names, including dangling symlinks
fn resolve_target(path: &Path) -> PathBuf {
    if let Ok(real) = fs::canonicalize(path) {
        return real;
    }
    match fs::read_link(path) {
        Ok(link) => match path.parent() {
            Some(parent) if link.is_relative() => parent.join(link),
            _ => link,
        },
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(unix)]
fn new_file_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn new_file_permissions() -> Option<fs::Permissions> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn read_back(store: &SettingsStore) -> AppSettings {
        let bytes = fs::read(store.settings_path()).unwrap();
        decode_lenient(&bytes).unwrap().settings
    }

    fn customized(folder: &Path) -> AppSettings {
        let mut s = AppSettings::defaults_for(folder);
        s.library_root = "/srv/switch".into();
        s.scan_roots = vec!["/mnt/a".into(), "/mnt/b".into(), "/mnt/a".into()];
        s.service_port = 8443;
        s.debug_enabled = true;
        s.titles_cache_tag = "W/\"abc\"".into();
        s.organize_policy.rename_files = true;
        s.organize_policy.delete_outdated_update_files = true;
        s.organize_policy.file_name_template = "{TITLE_NAME} [{REGION}]".into();
        s.ignored_content_ids.insert("0100000000001001".into());
        s.ignored_content_ids.insert("01007F600B135007".into());
        s
    }

    #[test]
    fn test_bootstrap_without_file() {
        let tmp = TempDir::new().unwrap();
        let store = SettingsStore::open(tmp.path());

        assert!(matches!(store.outcome(), LoadOutcome::Created { persist_error: None }));
        assert_eq!(*store.current(), AppSettings::defaults_for(tmp.path()));
        assert!(store.settings_path().exists());
        assert_eq!(read_back(&store), *store.current());
    }

    #[test]
    fn test_save_then_reopen_round_trips() {
        let tmp = TempDir::new().unwrap();
        let store = SettingsStore::open(tmp.path());
        let wanted = customized(tmp.path());

        store.save(wanted.clone()).into_result().unwrap();

        let reopened = SettingsStore::open(tmp.path());
        assert!(matches!(reopened.outcome(), LoadOutcome::Loaded));
        assert_eq!(*reopened.current(), wanted);
    }

    #[test]
    fn test_current_is_stable_and_shared() {
        let tmp = TempDir::new().unwrap();
        let store = SettingsStore::open(tmp.path());
        let other = store.clone();

        let a = store.current();
        let b = other.current();
        assert!(Arc::ptr_eq(&a, &b));

        let report = other.update(|s| s.service_port = 9000);
        assert!(report.is_persisted());
        assert!(Arc::ptr_eq(&store.current(), &report.settings));
        assert_eq!(store.current().service_port, 9000);
    }

    #[test]
    fn test_current_does_not_reread_disk() {
        let tmp = TempDir::new().unwrap();
        let store = SettingsStore::open(tmp.path());

        fs::write(store.settings_path(), r#"{"port": 1234}"#).unwrap();
        assert_eq!(store.current().service_port, 3000);
    }

    #[test]
    fn test_partial_file_keeps_baseline() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        fs::write(&path, r#"{"port": 8080}"#).unwrap();

        let store = SettingsStore::open(tmp.path());

        let mut expected = AppSettings::baseline();
        expected.service_port = 8080;
        assert!(matches!(store.outcome(), LoadOutcome::Loaded));
        assert_eq!(*store.current(), expected);
        assert_eq!(fs::read_to_string(&path).unwrap(), r#"{"port": 8080}"#);
    }

    #[test]
    fn test_malformed_file_falls_back_to_baseline() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        fs::write(&path, "{\"port\": 80,, ").unwrap();

        let store = SettingsStore::open(tmp.path());

        assert!(matches!(store.outcome(), LoadOutcome::PartiallyDecoded { .. }));
        assert!(store.outcome().from_disk());
        assert_eq!(*store.current(), AppSettings::baseline());
        // nothing is written over a file we failed to decode
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"port\": 80,, ");
    }

    #[test]
    fn test_unopenable_file_recovers_with_defaults() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("settings.json")).unwrap();

        let store = SettingsStore::open(tmp.path());

        match store.outcome() {
            LoadOutcome::RecoveredWithDefaults { persist_error, .. } => {
                assert!(persist_error.is_some())
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(*store.current(), AppSettings::defaults_for(tmp.path()));
    }

    #[test]
    fn test_raw_text_matches_saved_settings() {
        let tmp = TempDir::new().unwrap();
        let store = SettingsStore::open(tmp.path());
        let wanted = customized(tmp.path());
        store.save(wanted.clone()).into_result().unwrap();

        let raw = store.read_raw_text().unwrap();
        let parsed = decode_lenient(raw.as_bytes()).unwrap();
        assert!(parsed.rejected.is_empty());
        assert_eq!(parsed.settings, wanted);
    }

    #[test]
    fn test_raw_text_recreates_missing_file() {
        let tmp = TempDir::new().unwrap();
        let store = SettingsStore::open(tmp.path());
        store.update(|s| s.service_port = 4000).into_result().unwrap();
        fs::remove_file(store.settings_path()).unwrap();

        let raw = store.raw_text_lossy();

        assert!(store.settings_path().exists());
        let parsed = decode_lenient(raw.as_bytes()).unwrap().settings;
        assert_eq!(parsed, AppSettings::defaults_for(tmp.path()));
        assert_eq!(store.current().service_port, 3000);
    }

    #[test]
    fn test_resave_is_byte_stable() {
        let tmp = TempDir::new().unwrap();
        let store = SettingsStore::open(tmp.path());
        let wanted = customized(tmp.path());

        store.save(wanted.clone()).into_result().unwrap();
        let first = fs::read(store.settings_path()).unwrap();
        store.save(wanted).into_result().unwrap();
        let second = fs::read(store.settings_path()).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_failed_save_still_updates_cache() {
        let tmp = TempDir::new().unwrap();
        let folder = tmp.path().join("data");
        fs::create_dir(&folder).unwrap();
        let store = SettingsStore::open(&folder);
        fs::remove_dir_all(&folder).unwrap();

        let report = store.update(|s| s.debug_enabled = true);

        assert!(!report.is_persisted());
        assert!(store.current().debug_enabled);
        assert!(store.raw_text_lossy().is_empty());
    }

    #[test]
    fn test_reset_to_defaults() {
        let tmp = TempDir::new().unwrap();
        let store = SettingsStore::open(tmp.path());
        store.save(customized(tmp.path())).into_result().unwrap();

        let settings = store.reset_to_defaults().into_result().unwrap();

        assert_eq!(*settings, AppSettings::defaults_for(tmp.path()));
        assert_eq!(read_back(&store), *settings);
    }

    #[cfg(unix)]
    #[test]
    fn test_save_keeps_existing_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let store = SettingsStore::open(tmp.path());
        let path = store.settings_path();
        let mode = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(path.as_path()), 0o644);

        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();
        store.update(|s| s.service_port = 3001).into_result().unwrap();

        assert_eq!(mode(path.as_path()), 0o600);
        assert_eq!(read_back(&store).service_port, 3001);
    }

    #[cfg(unix)]
    #[test]
    fn test_save_writes_through_symlink() {
        let tmp = TempDir::new().unwrap();
        let real = tmp.path().join("real.json");
        fs::write(&real, "{}").unwrap();
        std::os::unix::fs::symlink("real.json", tmp.path().join("settings.json")).unwrap();

        let store = SettingsStore::open(tmp.path());
        assert!(matches!(store.outcome(), LoadOutcome::Loaded));
        let wanted = customized(tmp.path());
        store.save(wanted.clone()).into_result().unwrap();

        let link_meta = fs::symlink_metadata(store.settings_path()).unwrap();
        assert!(link_meta.file_type().is_symlink());
        let bytes = fs::read(&real).unwrap();
        assert_eq!(decode_lenient(&bytes).unwrap().settings, wanted);
    }

    #[cfg(unix)]
    #[test]
    fn test_save_creates_target_of_dangling_symlink() {
        let tmp = TempDir::new().unwrap();
        std::os::unix::fs::symlink("missing.json", tmp.path().join("settings.json")).unwrap();

        let store = SettingsStore::open(tmp.path());

        assert!(matches!(store.outcome(), LoadOutcome::Created { persist_error: None }));
        assert!(fs::symlink_metadata(store.settings_path()).unwrap().file_type().is_symlink());
        assert!(tmp.path().join("missing.json").is_file());
    }
}
