//! Tick loop: snapshot, outputs, cover, lyrics, in that order.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::artifact_fetcher::{discard_partial, ArtifactSource, Fetch, FetchError};
use crate::artifact_publish::{publish_atomically, staging_path, CoverPublisher, FileSwapError};
use crate::config::Config;
use crate::cover_probe::cover_is_decodable;
use crate::output_sinks::{FlushReport, OutputSinkSet};
use crate::song::{SongSnapshot, CAP_COVER, CAP_LYRICS, COVER_NONE};
use crate::song_source::{SongSource, SourceError};

/// Consecutive unparseable reads served from the previous snapshot before giving up on it.
const TORN_READ_GRACE_TICKS: u32 = 3;

#[derive(Debug, thiserror::Error)]
enum ArtifactError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Swap(#[from] FileSwapError),
}

pub struct Driver {
    source: Box<dyn SongSource>,
    fetcher: Box<dyn Fetch>,
    outputs: OutputSinkSet,
    cover: CoverPublisher,
    cover_download: bool,
    validate_cover: bool,
    lyrics_download: bool,
    lyrics_path: PathBuf,
    refresh_rate: Duration,
    last_cover_source: Option<String>,
    last_lyrics_source: Option<String>,
    last_song: SongSnapshot,
    torn_reads: u32,
}

impl Driver {
    pub fn new(config: &Config, source: Box<dyn SongSource>, fetcher: Box<dyn Fetch>) -> Self {
        Self {
            source,
            fetcher,
            outputs: OutputSinkSet::new(&config.outputs, &config.general),
            cover: CoverPublisher::new(
                config.cover.path.clone(),
                config.cover.placeholder_path.clone(),
            ),
            cover_download: config.cover.download,
            validate_cover: config.cover.validate_image,
            lyrics_download: config.lyrics.download,
            lyrics_path: config.lyrics.path.clone(),
            refresh_rate: Duration::from_millis(u64::from(config.general.refresh_rate_ms)),
            last_cover_source: None,
            last_lyrics_source: None,
            last_song: SongSnapshot::new(),
            torn_reads: 0,
        }
    }

    /// Runs one full pass. Failures are logged, never returned.
    pub fn tick(&mut self) -> FlushReport {
        let song = self.next_song();
        let report = self.outputs.flush(&song);
        self.sync_cover(&song);
        self.sync_lyrics(&song);
        report
    }

    /// A bridge caught mid-write yields a parse error; the previous song stands in
    /// for a few ticks instead of flashing the placeholder.
    fn next_song(&mut self) -> SongSnapshot {
        let song = match self.source.snapshot() {
            Ok(song) => {
                self.torn_reads = 0;
                song
            }
            Err(err @ SourceError::Parse { .. }) if self.torn_reads < TORN_READ_GRACE_TICKS => {
                self.torn_reads += 1;
                debug!("Driver: {}; keeping the previous song", err);
                self.last_song.clone()
            }
            Err(err) => {
                warn!("Driver: {}; treating as nothing playing", err);
                SongSnapshot::new()
            }
        };
        self.last_song = song.clone();
        song
    }

    /// Ticks every `refresh_rate_ms` until `stop` is set.
    pub fn run(&mut self, stop: &AtomicBool) {
        info!(
            "Driver: started. refresh_rate={}ms outputs={}",
            self.refresh_rate.as_millis(),
            self.outputs.descriptors().len()
        );
        for descriptor in self.outputs.descriptors() {
            debug!(
                "Driver: output \"{}\" -> {}{}",
                descriptor.format(),
                descriptor.path().display(),
                if descriptor.log_mode() { " (log)" } else { "" }
            );
        }
        while !stop.load(Ordering::Relaxed) {
            self.tick();
            if stop.load(Ordering::Relaxed) {
                break;
            }
            thread::sleep(self.refresh_rate);
        }
        info!("Driver: stopped");
    }

    /// `cover.download` only gates remote covers; local files are always copied.
    fn sync_cover(&mut self, song: &SongSnapshot) {
        let cover = song.cover().trim();
        let wanted = song.has(CAP_COVER)
            && song.playing()
            && !cover.is_empty()
            && cover != COVER_NONE
            && (self.cover_download || !ArtifactSource::parse(cover).is_remote());
        if !wanted {
            self.last_cover_source = None;
            if let Err(err) = self.cover.activate_placeholder() {
                error!("Driver: couldn't show cover placeholder: {}", err);
            }
            return;
        }

        if self.last_cover_source.as_deref() == Some(cover) {
            return;
        }
        self.last_cover_source = Some(cover.to_string());

        if self.cover.can_restore(cover) {
            match self.cover.deactivate_placeholder() {
                Ok(()) => return,
                Err(err) => warn!("Driver: {}; refetching {}", err, cover),
            }
        }

        if let Err(err) = self.fetch_cover(cover) {
            error!("Driver: cover {} failed: {}", cover, err);
            if let Err(err) = self.cover.activate_placeholder() {
                error!("Driver: couldn't show cover placeholder: {}", err);
            }
        }
    }

    fn fetch_cover(&mut self, cover: &str) -> Result<(), ArtifactError> {
        let staged = self.cover.staging_path();
        self.fetcher.fetch(&ArtifactSource::parse(cover), &staged)?;
        if self.validate_cover && !cover_is_decodable(&staged) {
            discard_partial(&staged);
            return Err(FetchError::InvalidImage {
                origin: cover.to_string(),
            }
            .into());
        }
        if let Err(err) = self.cover.commit(&staged, cover) {
            discard_partial(&staged);
            return Err(err.into());
        }
        Ok(())
    }

    fn sync_lyrics(&mut self, song: &SongSnapshot) {
        if !self.lyrics_download || !song.has(CAP_LYRICS) {
            return;
        }
        let lyrics = song.lyrics().trim();
        if lyrics.is_empty() || self.last_lyrics_source.as_deref() == Some(lyrics) {
            return;
        }
        self.last_lyrics_source = Some(lyrics.to_string());

        match self.fetch_lyrics(lyrics) {
            Ok(()) => info!(
                "Driver: published lyrics from {} to {}",
                lyrics,
                self.lyrics_path.display()
            ),
            Err(err) => error!("Driver: lyrics {} failed: {}", lyrics, err),
        }
    }

    fn fetch_lyrics(&self, lyrics: &str) -> Result<(), ArtifactError> {
        let staged = staging_path(&self.lyrics_path);
        self.fetcher.fetch(&ArtifactSource::parse(lyrics), &staged)?;
        if let Err(err) = publish_atomically(&staged, &self.lyrics_path) {
            discard_partial(&staged);
            return Err(err.into());
        }
        debug!("Driver: lyrics staged at {}", staged.display());
        Ok(())
    }
}
