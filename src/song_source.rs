//! Where snapshots come from. The bundled source reads a JSON file a player bridge keeps current.

use std::io;
use std::path::{Path, PathBuf};

use crate::song::SongSnapshot;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("couldn't read snapshot {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("couldn't parse snapshot {}: {}", .path.display(), .source)]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Supplies the current song once per tick.
pub trait SongSource {
    fn snapshot(&mut self) -> Result<SongSnapshot, SourceError>;
}

/// On-disk shape of a snapshot. Absent keys leave the matching capability unset.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SnapshotDocument {
    title: Option<String>,
    artists: Option<Vec<String>>,
    album: Option<String>,
    label: Option<String>,
    cover: Option<String>,
    lyrics: Option<String>,
    year: Option<String>,
    month: Option<String>,
    day: Option<String>,
    disc_number: Option<i32>,
    track_number: Option<i32>,
    duration_ms: Option<i32>,
    progress_ms: Option<i32>,
    explicit: Option<bool>,
    playing: Option<bool>,
}

impl SnapshotDocument {
    fn into_snapshot(self) -> SongSnapshot {
        let mut song = SongSnapshot::new();
        if let Some(title) = self.title {
            song.set_title(title);
        }
        for artist in self.artists.unwrap_or_default() {
            song.append_artist(artist);
        }
        if let Some(album) = self.album {
            song.set_album(album);
        }
        if let Some(label) = self.label {
            song.set_label(label);
        }
        if let Some(cover) = self.cover {
            song.set_cover_link(cover);
        }
        if let Some(lyrics) = self.lyrics {
            song.set_lyrics_link(lyrics);
        }
        if let Some(year) = self.year {
            song.set_year(year);
        }
        if let Some(month) = self.month {
            song.set_month(month);
        }
        if let Some(day) = self.day {
            song.set_day(day);
        }
        if let Some(disc_number) = self.disc_number {
            song.set_disc_number(disc_number);
        }
        if let Some(track_number) = self.track_number {
            song.set_track_number(track_number);
        }
        if let Some(duration_ms) = self.duration_ms {
            song.set_duration(duration_ms);
        }
        if let Some(progress_ms) = self.progress_ms {
            song.set_progress(progress_ms);
        }
        if let Some(explicit) = self.explicit {
            song.set_explicit(explicit);
        }
        if let Some(playing) = self.playing {
            song.set_playing(playing);
        }
        song
    }
}

/// Parses snapshot JSON such as `{"title": "Song", "artists": ["A"], "playing": true}`.
pub fn parse_snapshot(text: &str) -> Result<SongSnapshot, serde_json::Error> {
    serde_json::from_str::<SnapshotDocument>(text).map(SnapshotDocument::into_snapshot)
}

pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SongSource for JsonFileSource {
    fn snapshot(&mut self) -> Result<SongSnapshot, SourceError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            // No bridge running yet.
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(SongSnapshot::new());
            }
            Err(source) => {
                return Err(SourceError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if text.trim().is_empty() {
            return Ok(SongSnapshot::new());
        }
        parse_snapshot(&text).map_err(|source| SourceError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}
