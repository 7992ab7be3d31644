//! Read-only "now playing" snapshot handed to the output pipeline each tick.

/// Capability bits marking which snapshot fields a source populated.
pub const CAP_TITLE: u16 = 1 << 0;
pub const CAP_ARTIST: u16 = 1 << 1;
pub const CAP_ALBUM: u16 = 1 << 2;
pub const CAP_RELEASE: u16 = 1 << 3;
pub const CAP_COVER: u16 = 1 << 4;
pub const CAP_DURATION: u16 = 1 << 5;
pub const CAP_PROGRESS: u16 = 1 << 6;
pub const CAP_STATUS: u16 = 1 << 7;
pub const CAP_EXPLICIT: u16 = 1 << 8;
pub const CAP_DISC_NUMBER: u16 = 1 << 9;
pub const CAP_TRACK_NUMBER: u16 = 1 << 10;
pub const CAP_LYRICS: u16 = 1 << 11;
pub const CAP_LABEL: u16 = 1 << 12;

/// Cover identifier sources use when no cover is known.
pub const COVER_NONE: &str = "n/a";

/// How much of the release date a source actually knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DatePrecision {
    Day,
    Month,
    Year,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SongSnapshot {
    data: u16,
    title: String,
    album: String,
    label: String,
    cover: String,
    lyrics: String,
    artists: Vec<String>,
    year: String,
    month: String,
    day: String,
    disc_number: i32,
    track_number: i32,
    duration_ms: i32,
    progress_ms: i32,
    is_explicit: bool,
    is_playing: bool,
    release_precision: DatePrecision,
}

impl SongSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets every field and capability bit.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Derives the release precision from the populated date parts.
    pub fn update_release_precision(&mut self) {
        let has_year = !self.year.trim().is_empty();
        let has_month = !self.month.trim().is_empty();
        let has_day = !self.day.trim().is_empty();
        self.release_precision = match (has_year, has_month, has_day) {
            (true, true, true) => DatePrecision::Day,
            (true, true, false) => DatePrecision::Month,
            (true, false, _) => DatePrecision::Year,
            _ => DatePrecision::Unknown,
        };
        if self.release_precision == DatePrecision::Unknown {
            self.data &= !CAP_RELEASE;
        } else {
            self.data |= CAP_RELEASE;
        }
    }

    pub fn append_artist(&mut self, artist: impl Into<String>) {
        let artist = artist.into();
        if artist.trim().is_empty() {
            return;
        }
        self.artists.push(artist);
        self.data |= CAP_ARTIST;
    }

    pub fn set_cover_link(&mut self, link: impl Into<String>) {
        self.cover = link.into();
        self.data |= CAP_COVER;
    }

    pub fn set_lyrics_link(&mut self, link: impl Into<String>) {
        self.lyrics = link.into();
        self.data |= CAP_LYRICS;
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.data |= CAP_TITLE;
    }

    pub fn set_album(&mut self, album: impl Into<String>) {
        self.album = album.into();
        self.data |= CAP_ALBUM;
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
        self.data |= CAP_LABEL;
    }

    pub fn set_duration(&mut self, ms: i32) {
        self.duration_ms = ms.max(0);
        self.data |= CAP_DURATION;
    }

    pub fn set_progress(&mut self, ms: i32) {
        self.progress_ms = ms.max(0);
        self.data |= CAP_PROGRESS;
    }

    pub fn set_explicit(&mut self, explicit: bool) {
        self.is_explicit = explicit;
        self.data |= CAP_EXPLICIT;
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.is_playing = playing;
        self.data |= CAP_STATUS;
    }

    pub fn set_disc_number(&mut self, number: i32) {
        self.disc_number = number.max(0);
        self.data |= CAP_DISC_NUMBER;
    }

    pub fn set_track_number(&mut self, number: i32) {
        self.track_number = number.max(0);
        self.data |= CAP_TRACK_NUMBER;
    }

    pub fn set_year(&mut self, year: impl Into<String>) {
        self.year = year.into();
        self.update_release_precision();
    }

    pub fn set_month(&mut self, month: impl Into<String>) {
        self.month = month.into();
        self.update_release_precision();
    }

    pub fn set_day(&mut self, day: impl Into<String>) {
        self.day = day.into();
        self.update_release_precision();
    }

    pub fn data(&self) -> u16 {
        self.data
    }

    /// Returns `true` when every bit in `capabilities` is set.
    pub fn has(&self, capabilities: u16) -> bool {
        self.data & capabilities == capabilities
    }

    pub fn playing(&self) -> bool {
        self.is_playing
    }

    pub fn explicit(&self) -> bool {
        self.is_explicit
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn album(&self) -> &str {
        &self.album
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn cover(&self) -> &str {
        &self.cover
    }

    pub fn lyrics(&self) -> &str {
        &self.lyrics
    }

    pub fn artists(&self) -> &[String] {
        &self.artists
    }

    pub fn year(&self) -> &str {
        &self.year
    }

    pub fn month(&self) -> &str {
        &self.month
    }

    pub fn day(&self) -> &str {
        &self.day
    }

    pub fn duration_ms(&self) -> i32 {
        self.duration_ms
    }

    pub fn progress_ms(&self) -> i32 {
        self.progress_ms
    }

    pub fn release_precision(&self) -> DatePrecision {
        self.release_precision
    }

    /// String-valued field addressed by a lowercase template specifier.
    pub fn get_string_value(&self, specifier: char) -> Option<&str> {
        match specifier {
            't' => Some(&self.title),
            'm' => Some(&self.album),
            'x' => Some(&self.label),
            'y' => Some(&self.year),
            _ => None,
        }
    }

    /// Integer-valued field addressed by a lowercase template specifier.
    pub fn get_int_value(&self, specifier: char) -> Option<i32> {
        match specifier {
            'n' => Some(self.track_number),
            'd' => Some(self.disc_number),
            'p' => Some(self.progress_ms),
            'l' => Some(self.duration_ms),
            'o' => Some(self.duration_ms.saturating_sub(self.progress_ms).max(0)),
            _ => None,
        }
    }
}
