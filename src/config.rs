//! Persistent configuration model and defaults.

use std::path::PathBuf;

use crate::text_template::{RenderOptions, DEFAULT_SONG_FORMAT};

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Tick rate and placeholder text.
    pub general: GeneralConfig,
    #[serde(default)]
    /// Where song snapshots come from.
    pub source: SourceConfig,
    #[serde(default)]
    /// Cover download and placeholder paths.
    pub cover: CoverConfig,
    #[serde(default)]
    /// Lyrics download.
    pub lyrics: LyricsConfig,
    #[serde(default)]
    /// Timeouts applied to every cover/lyrics download.
    pub network: NetworkConfig,
    #[serde(default)]
    /// User-defined output files.
    pub outputs: Vec<OutputConfig>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct GeneralConfig {
    #[serde(default = "default_refresh_rate_ms")]
    pub refresh_rate_ms: u32,
    /// Written instead of the rendered format while nothing plays. `%s` is a literal space.
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
    #[serde(default = "default_artist_separator")]
    pub artist_separator: String,
    #[serde(default = "default_explicit_marker")]
    pub explicit_marker: String,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SourceConfig {
    /// JSON snapshot written by a player bridge.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CoverConfig {
    #[serde(default = "default_true")]
    pub download: bool,
    #[serde(default = "default_cover_path")]
    pub path: PathBuf,
    #[serde(default = "default_cover_placeholder_path")]
    pub placeholder_path: PathBuf,
    /// Reject fetched covers that don't decode as images.
    #[serde(default = "default_true")]
    pub validate_image: bool,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LyricsConfig {
    #[serde(default)]
    pub download: bool,
    #[serde(default = "default_lyrics_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct NetworkConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u32,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u32,
    /// Upper bound on a whole fetch, body included.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u32,
    /// Larger downloads are abandoned.
    #[serde(default = "default_max_artifact_bytes")]
    pub max_artifact_bytes: u64,
}

/// One output file: the format rendered into it and how it's written.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct OutputConfig {
    #[serde(default = "default_song_format")]
    pub format: String,
    pub path: PathBuf,
    /// Append one line per change instead of overwriting.
    #[serde(default)]
    pub log_mode: bool,
}

impl GeneralConfig {
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            artist_separator: self.artist_separator.clone(),
            explicit_marker: self.explicit_marker.clone(),
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            refresh_rate_ms: default_refresh_rate_ms(),
            placeholder: default_placeholder(),
            artist_separator: default_artist_separator(),
            explicit_marker: default_explicit_marker(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
        }
    }
}

impl Default for CoverConfig {
    fn default() -> Self {
        Self {
            download: true,
            path: default_cover_path(),
            placeholder_path: default_cover_placeholder_path(),
            validate_image: true,
        }
    }
}

impl Default for LyricsConfig {
    fn default() -> Self {
        Self {
            download: false,
            path: default_lyrics_path(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            max_artifact_bytes: default_max_artifact_bytes(),
        }
    }
}

/// Clamps values a hand-edited config could push out of range.
pub fn sanitize_config(config: Config) -> Config {
    Config {
        general: GeneralConfig {
            refresh_rate_ms: config.general.refresh_rate_ms.clamp(100, 60_000),
            ..config.general
        },
        network: NetworkConfig {
            connect_timeout_ms: config.network.connect_timeout_ms.clamp(250, 60_000),
            read_timeout_ms: config.network.read_timeout_ms.clamp(250, 120_000),
            request_timeout_ms: config.network.request_timeout_ms.clamp(1_000, 300_000),
            max_artifact_bytes: config
                .network
                .max_artifact_bytes
                .clamp(1024, 256 * 1024 * 1024),
        },
        ..config
    }
}

fn songsink_data_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("songsink")
}

fn default_true() -> bool {
    true
}

fn default_refresh_rate_ms() -> u32 {
    1_000
}

fn default_placeholder() -> String {
    "n/a".to_string()
}

fn default_artist_separator() -> String {
    RenderOptions::default().artist_separator
}

fn default_explicit_marker() -> String {
    RenderOptions::default().explicit_marker
}

fn default_song_format() -> String {
    DEFAULT_SONG_FORMAT.to_string()
}

fn default_snapshot_path() -> PathBuf {
    songsink_data_root().join("now_playing.json")
}

fn default_cover_path() -> PathBuf {
    songsink_data_root().join("cover.png")
}

fn default_cover_placeholder_path() -> PathBuf {
    songsink_data_root().join("placeholder.png")
}

fn default_lyrics_path() -> PathBuf {
    songsink_data_root().join("lyrics.txt")
}

fn default_connect_timeout_ms() -> u32 {
    5_000
}

fn default_read_timeout_ms() -> u32 {
    10_000
}

fn default_request_timeout_ms() -> u32 {
    20_000
}

fn default_max_artifact_bytes() -> u64 {
    32 * 1024 * 1024
}
