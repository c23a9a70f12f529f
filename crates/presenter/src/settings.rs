use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use tempfile::NamedTempFile;

use crate::observe::Observable;

pub const SETTINGS_DIRECTORY_NAME: &str = "parley";
pub const SETTINGS_FILE_NAME: &str = "presenter.json";
pub const SETTINGS_ENV_PREFIX: &str = "PARLEY_";

pub const DEFAULT_GROUP_THRESHOLD_SECS: u64 = 60;
pub const DEFAULT_PREFETCH_DISTANCE: usize = 10;
pub const DEFAULT_PAGE_SIZE: usize = 25;
pub const DEFAULT_ARM_DELAY_MS: u64 = 500;
pub const DEFAULT_LOCK_OFFSET: f32 = -60.0;
pub const DEFAULT_CANCEL_OFFSET: f32 = -120.0;
pub const DEFAULT_CANCEL_FADE_START: f32 = -10.0;
pub const DEFAULT_LOCK_INDICATOR_INITIAL_OFFSET: f32 = -70.0;
pub const DEFAULT_LOCK_INDICATOR_MAX_OFFSET: f32 = -110.0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupingSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_group_threshold_secs")]
    pub threshold_secs: u64,
}

impl Default for GroupingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_secs: DEFAULT_GROUP_THRESHOLD_SECS,
        }
    }
}

impl GroupingSettings {
    pub fn threshold(&self) -> Duration {
        Duration::from_secs(self.threshold_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadSettings {
    #[serde(default = "default_true")]
    pub show_separator: bool,
}

impl Default for UnreadSettings {
    fn default() -> Self {
        Self {
            show_separator: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSettings {
    #[serde(default = "default_prefetch_distance")]
    pub prefetch_distance: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            prefetch_distance: DEFAULT_PREFETCH_DISTANCE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Gesture thresholds for the voice recording button.
///
/// Offsets are in points relative to the press location; negative `y` is up and
/// negative `x` is towards the slide-to-cancel side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingSettings {
    #[serde(default = "default_arm_delay_ms")]
    pub arm_delay_ms: u64,
    #[serde(default = "default_lock_offset")]
    pub lock_offset: f32,
    #[serde(default = "default_cancel_offset")]
    pub cancel_offset: f32,
    #[serde(default = "default_cancel_fade_start")]
    pub cancel_fade_start: f32,
    #[serde(default = "default_lock_indicator_initial_offset")]
    pub lock_indicator_initial_offset: f32,
    #[serde(default = "default_lock_indicator_max_offset")]
    pub lock_indicator_max_offset: f32,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            arm_delay_ms: DEFAULT_ARM_DELAY_MS,
            lock_offset: DEFAULT_LOCK_OFFSET,
            cancel_offset: DEFAULT_CANCEL_OFFSET,
            cancel_fade_start: DEFAULT_CANCEL_FADE_START,
            lock_indicator_initial_offset: DEFAULT_LOCK_INDICATOR_INITIAL_OFFSET,
            lock_indicator_max_offset: DEFAULT_LOCK_INDICATOR_MAX_OFFSET,
        }
    }
}

impl RecordingSettings {
    pub fn arm_delay(&self) -> Duration {
        Duration::from_millis(self.arm_delay_ms)
    }

    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();
        if self.lock_offset.is_nan() || self.lock_offset >= 0.0 {
            self.lock_offset = defaults.lock_offset;
        }
        if self.cancel_offset.is_nan() || self.cancel_offset >= 0.0 {
            self.cancel_offset = defaults.cancel_offset;
        }
        // The fade has to start before the cancel point or the opacity math divides the wrong way.
        let fade_in_range =
            self.cancel_fade_start <= 0.0 && self.cancel_fade_start > self.cancel_offset;
        if !fade_in_range {
            self.cancel_fade_start = defaults.cancel_fade_start.max(self.cancel_offset / 2.0);
        }
        if self.lock_indicator_initial_offset.is_nan() || self.lock_indicator_initial_offset > 0.0 {
            self.lock_indicator_initial_offset = defaults.lock_indicator_initial_offset;
        }
        let max_in_range = self.lock_indicator_max_offset <= self.lock_indicator_initial_offset;
        if !max_in_range {
            self.lock_indicator_max_offset = self.lock_indicator_initial_offset;
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PresenterSettings {
    #[serde(default)]
    pub grouping: GroupingSettings,
    #[serde(default)]
    pub unread: UnreadSettings,
    #[serde(default)]
    pub media: MediaSettings,
    #[serde(default)]
    pub recording: RecordingSettings,
}

impl PresenterSettings {
    pub fn normalized(mut self) -> Self {
        self.media.page_size = self.media.page_size.max(1);
        self.recording = self.recording.normalized();
        self
    }
}

pub struct SettingsStore {
    settings: Arc<ArcSwap<PresenterSettings>>,
    changes: Observable<Arc<PresenterSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".parley"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Arc::new(Self::load_from_disk(&config_path));
        Self {
            settings: Arc::new(ArcSwap::new(Arc::clone(&settings))),
            changes: Observable::new(settings),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn settings(&self) -> Arc<PresenterSettings> {
        self.settings.load_full()
    }

    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<Arc<PresenterSettings>> {
        self.changes.subscribe()
    }

    /// Normalizes, writes and publishes `settings`; nothing changes in memory if the
    /// write fails.
    pub fn update(&mut self, settings: PresenterSettings) -> SettingsResult<()> {
        let settings = Arc::new(settings.normalized());
        write_settings_file(&self.config_path, &settings)?;
        self.settings.store(Arc::clone(&settings));
        self.changes.publish(settings);
        Ok(())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn load_from_disk(path: &Path) -> PresenterSettings {
        let file_present = path.is_file();
        if !file_present {
            tracing::info!(path = %path.display(), "no settings file; starting from defaults");
        }

        let layered = layered_sources(path, file_present);
        layered
            .extract::<PresenterSettings>()
            .map(PresenterSettings::normalized)
            .unwrap_or_else(|error| {
                tracing::warn!(path = %path.display(), %error, "ignoring unreadable settings");
                PresenterSettings::default()
            })
    }
}

/// Defaults, then the JSON file, then `PARLEY_`-prefixed environment overrides.
fn layered_sources(path: &Path, file_present: bool) -> Figment {
    let defaults = Figment::from(Serialized::defaults(PresenterSettings::default()));
    let with_file = if file_present {
        defaults.merge(Json::file(path))
    } else {
        defaults
    };
    with_file.merge(Env::prefixed(SETTINGS_ENV_PREFIX).split("__"))
}

/// Stages the encoded settings next to `path` and swaps them in with one rename.
fn write_settings_file(path: &Path, settings: &PresenterSettings) -> SettingsResult<()> {
    let directory = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(directory).context(SettingsDirectorySnafu {
        stage: "prepare-settings-directory",
        directory: directory.to_path_buf(),
    })?;

    let mut encoded = serde_json::to_vec_pretty(settings).context(EncodeSettingsSnafu {
        stage: "encode-presenter-settings",
    })?;
    encoded.push(b'\n');

    let mut staged = NamedTempFile::new_in(directory).context(StageSettingsSnafu {
        stage: "create-staged-settings",
        path: directory.to_path_buf(),
    })?;
    staged
        .write_all(&encoded)
        .and_then(|()| staged.as_file().sync_all())
        .context(StageSettingsSnafu {
            stage: "write-staged-settings",
            path: staged.path().to_path_buf(),
        })?;
    staged.persist(path).context(SwapSettingsSnafu {
        stage: "swap-in-settings",
        path: path.to_path_buf(),
    })?;

    tracing::info!(path = %path.display(), bytes = encoded.len(), "presenter settings saved");
    Ok(())
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("settings directory {} unusable on `{stage}`: {source}", directory.display()))]
    SettingsDirectory {
        stage: &'static str,
        directory: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("presenter settings could not be encoded on `{stage}`: {source}"))]
    EncodeSettings {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("staging settings at {} failed on `{stage}`: {source}", path.display()))]
    StageSettings {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("settings at {} were not replaced on `{stage}`: {source}", path.display()))]
    SwapSettings {
        stage: &'static str,
        path: PathBuf,
        source: tempfile::PersistError,
    },
}

pub type SettingsResult<T> = Result<T, SettingsError>;

fn default_true() -> bool {
    true
}

fn default_group_threshold_secs() -> u64 {
    DEFAULT_GROUP_THRESHOLD_SECS
}

fn default_prefetch_distance() -> usize {
    DEFAULT_PREFETCH_DISTANCE
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_arm_delay_ms() -> u64 {
    DEFAULT_ARM_DELAY_MS
}

fn default_lock_offset() -> f32 {
    DEFAULT_LOCK_OFFSET
}

fn default_cancel_offset() -> f32 {
    DEFAULT_CANCEL_OFFSET
}

fn default_cancel_fade_start() -> f32 {
    DEFAULT_CANCEL_FADE_START
}

fn default_lock_indicator_initial_offset() -> f32 {
    DEFAULT_LOCK_INDICATOR_INITIAL_OFFSET
}

fn default_lock_indicator_max_offset() -> f32 {
    DEFAULT_LOCK_INDICATOR_MAX_OFFSET
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    // Every test reads the process environment through `Env`, so all of them run
    // inside a jail to serialize against the override test.

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|jail| {
            let store = SettingsStore::new(jail.directory().join("absent.json"));
            let settings = store.settings();

            assert_eq!(settings.grouping.threshold(), Duration::from_secs(60));
            assert_eq!(settings.media.prefetch_distance, 10);
            assert_eq!(settings.recording.arm_delay(), Duration::from_millis(500));
            Ok(())
        });
    }

    #[test]
    fn partial_file_is_merged_over_defaults_and_normalized() {
        Jail::expect_with(|jail| {
            jail.create_file(
                SETTINGS_FILE_NAME,
                r#"{ "grouping": { "threshold_secs": 120 }, "media": { "page_size": 0 },
                     "recording": { "lock_offset": 40.0 } }"#,
            )
            .expect("write fixture");

            let settings = SettingsStore::new(jail.directory().join(SETTINGS_FILE_NAME)).settings();
            assert_eq!(settings.grouping.threshold_secs, 120);
            assert!(settings.grouping.enabled);
            assert_eq!(settings.media.page_size, 1);
            assert_eq!(settings.recording.lock_offset, DEFAULT_LOCK_OFFSET);
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_the_settings_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                SETTINGS_FILE_NAME,
                r#"{ "grouping": { "threshold_secs": 120 } }"#,
            )
            .expect("write fixture");
            jail.set_env("PARLEY_GROUPING__THRESHOLD_SECS", "90");
            jail.set_env("PARLEY_MEDIA__PREFETCH_DISTANCE", "4");

            let settings = SettingsStore::new(jail.directory().join(SETTINGS_FILE_NAME)).settings();
            assert_eq!(settings.grouping.threshold(), Duration::from_secs(90));
            assert_eq!(settings.media.prefetch_distance, 4);
            assert_eq!(settings.media.page_size, DEFAULT_PAGE_SIZE);
            Ok(())
        });
    }

    #[test]
    fn unparsable_file_falls_back_to_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(SETTINGS_FILE_NAME, "{ not json").expect("write fixture");

            let settings = SettingsStore::new(jail.directory().join(SETTINGS_FILE_NAME)).settings();
            assert_eq!(*settings, PresenterSettings::default());
            Ok(())
        });
    }

    #[test]
    fn update_persists_and_notifies_subscribers() {
        Jail::expect_with(|jail| {
            let path = jail.directory().join("nested").join(SETTINGS_FILE_NAME);
            let mut store = SettingsStore::new(path.clone());
            let receiver = store.subscribe();

            let mut settings = (*store.settings()).clone();
            settings.unread.show_separator = false;
            settings.media.page_size = 0;
            store.update(settings).expect("persist settings");

            assert!(!store.settings().unread.show_separator);
            assert_eq!(store.settings().media.page_size, 1);
            assert!(receiver.has_changed().expect("store alive"));

            let reloaded = SettingsStore::new(path).settings();
            assert!(!reloaded.unread.show_separator);
            assert_eq!(reloaded.media.page_size, 1);
            Ok(())
        });
    }
}
