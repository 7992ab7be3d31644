//! Cover/lyrics retrieval into a staging file, from HTTP(S) or the local filesystem.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;

use crate::config::NetworkConfig;

/// Where an artifact identifier points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactSource {
    Remote(String),
    Local(PathBuf),
}

impl ArtifactSource {
    /// Classifies an identifier taken from a song snapshot.
    pub fn parse(identifier: &str) -> Self {
        let trimmed = identifier.trim();
        let lowered = trimmed.to_ascii_lowercase();
        if lowered.starts_with("http://") || lowered.starts_with("https://") {
            return Self::Remote(trimmed.to_string());
        }
        if let Some(path) = trimmed.strip_prefix("file://") {
            return Self::Local(PathBuf::from(path));
        }
        Self::Local(PathBuf::from(trimmed))
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("couldn't fetch {url}: {reason}")]
    Network { url: String, reason: String },
    #[error("couldn't copy {} to {}: {}", .from.display(), .to.display(), .source)]
    LocalCopyFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{origin} produced an empty file")]
    Empty { origin: String },
    #[error("{origin} is not a decodable image")]
    InvalidImage { origin: String },
    #[error("{origin} is larger than {limit} bytes")]
    TooLarge { origin: String, limit: u64 },
}

/// Retrieves one artifact into `destination`.
///
/// Implementations are stateless; callers serialize fetches of the same kind and
/// never treat `destination` as published until `Ok` is returned.
pub trait Fetch {
    fn fetch(&self, source: &ArtifactSource, destination: &Path) -> Result<(), FetchError>;
}

/// Default fetcher backed by a blocking `ureq` agent.
pub struct ArtifactFetcher {
    http_client: ureq::Agent,
    max_bytes: u64,
}

impl ArtifactFetcher {
    pub fn new(network: &NetworkConfig) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_millis(u64::from(network.connect_timeout_ms)))
            .timeout_read(Duration::from_millis(u64::from(network.read_timeout_ms)))
            .timeout_write(Duration::from_millis(u64::from(network.read_timeout_ms)))
            .timeout(Duration::from_millis(u64::from(network.request_timeout_ms)))
            .build();
        Self {
            http_client,
            max_bytes: network.max_artifact_bytes,
        }
    }

    fn download(&self, url: &str, destination: &Path) -> Result<u64, FetchError> {
        let network_error = |reason: String| FetchError::Network {
            url: url.to_string(),
            reason,
        };
        let response = self
            .http_client
            .get(url)
            .call()
            .map_err(|err| network_error(describe_ureq_failure(&err)))?;
        let file = File::create(destination).map_err(|err| {
            network_error(format!("can't create {}: {err}", destination.display()))
        })?;
        let mut writer = BufWriter::new(file);
        // One byte past the cap is enough to tell an oversized body apart.
        let mut reader = response
            .into_reader()
            .take(self.max_bytes.saturating_add(1));
        let written = io::copy(&mut reader, &mut writer)
            .map_err(|err| network_error(format!("transfer interrupted: {err}")))?;
        if written > self.max_bytes {
            return Err(FetchError::TooLarge {
                origin: url.to_string(),
                limit: self.max_bytes,
            });
        }
        writer.flush().map_err(|err| {
            network_error(format!("can't flush {}: {err}", destination.display()))
        })?;
        Ok(written)
    }

    fn copy_local(from: &Path, destination: &Path) -> Result<u64, FetchError> {
        fs::copy(from, destination).map_err(|source| FetchError::LocalCopyFailed {
            from: from.to_path_buf(),
            to: destination.to_path_buf(),
            source,
        })
    }
}

impl Fetch for ArtifactFetcher {
    fn fetch(&self, source: &ArtifactSource, destination: &Path) -> Result<(), FetchError> {
        let (result, origin) = match source {
            ArtifactSource::Remote(url) => (self.download(url, destination), url.clone()),
            ArtifactSource::Local(path) => (
                Self::copy_local(path, destination),
                path.display().to_string(),
            ),
        };
        match result {
            Ok(0) => {
                discard_partial(destination);
                Err(FetchError::Empty { origin })
            }
            Ok(bytes) => {
                debug!(
                    "ArtifactFetcher: fetched {} bytes from {} to {}",
                    bytes,
                    origin,
                    destination.display()
                );
                Ok(())
            }
            Err(err) => {
                discard_partial(destination);
                Err(err)
            }
        }
    }
}

fn describe_ureq_failure(error: &ureq::Error) -> String {
    match error {
        ureq::Error::Status(code, _) => format!("HTTP status {code}"),
        ureq::Error::Transport(transport) => transport.to_string(),
    }
}

/// Removes a partially written staging file; absence is fine.
pub(crate) fn discard_partial(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != io::ErrorKind::NotFound {
            debug!(
                "ArtifactFetcher: couldn't remove partial file {}: {}",
                path.display(),
                err
            );
        }
    }
}
