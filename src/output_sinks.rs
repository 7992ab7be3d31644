//! User-defined output files rendered from the current song each tick.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, error};

use crate::config::{GeneralConfig, OutputConfig};
use crate::song::SongSnapshot;
use crate::text_template::{
    apply_space_directive, parse_template, render, ParsedTemplate, RenderOptions,
};

#[derive(Debug, thiserror::Error)]
pub enum FileWriteError {
    #[error("couldn't open output {}: {}", .path.display(), .source)]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("couldn't write output {}: {}", .path.display(), .source)]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// One configured output plus the text it last wrote.
#[derive(Debug, Clone)]
pub struct OutputDescriptor {
    format: String,
    template: ParsedTemplate,
    path: PathBuf,
    log_mode: bool,
    last_output: Option<String>,
}

impl OutputDescriptor {
    pub fn new(format: impl Into<String>, path: impl Into<PathBuf>, log_mode: bool) -> Self {
        let format = format.into();
        Self {
            template: parse_template(&format),
            format,
            path: path.into(),
            log_mode,
            last_output: None,
        }
    }

    pub fn from_config(output: &OutputConfig) -> Self {
        Self::new(output.format.clone(), output.path.clone(), output.log_mode)
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log_mode(&self) -> bool {
        self.log_mode
    }

    pub fn last_output(&self) -> Option<&str> {
        self.last_output.as_deref()
    }
}

/// Per-flush counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub written: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct OutputSinkSet {
    descriptors: Vec<OutputDescriptor>,
    placeholder: String,
    render_options: RenderOptions,
}

impl OutputSinkSet {
    pub fn new(outputs: &[OutputConfig], general: &GeneralConfig) -> Self {
        Self {
            descriptors: outputs.iter().map(OutputDescriptor::from_config).collect(),
            placeholder: apply_space_directive(&general.placeholder),
            render_options: general.render_options(),
        }
    }

    pub fn descriptors(&self) -> &[OutputDescriptor] {
        &self.descriptors
    }

    /// Writes every descriptor whose text changed since its last successful write.
    pub fn flush(&mut self, song: &SongSnapshot) -> FlushReport {
        let mut report = FlushReport::default();
        for descriptor in &mut self.descriptors {
            if !song.playing() && descriptor.log_mode {
                report.skipped += 1;
                continue;
            }

            let rendered = render(&descriptor.template, song, &self.render_options);
            let text = if rendered.is_empty() || !song.playing() {
                self.placeholder.clone()
            } else {
                rendered
            };

            if descriptor.last_output.as_deref() == Some(text.as_str()) {
                report.unchanged += 1;
                continue;
            }

            match write_output(&descriptor.path, &text, descriptor.log_mode) {
                Ok(()) => {
                    debug!(
                        "OutputSinkSet: wrote {} ({} bytes)",
                        descriptor.path.display(),
                        text.len()
                    );
                    descriptor.last_output = Some(text);
                    report.written += 1;
                }
                Err(err) => {
                    error!("OutputSinkSet: {}", err);
                    report.failed += 1;
                }
            }
        }
        report
    }
}

fn write_output(path: &Path, text: &str, log_mode: bool) -> Result<(), FileWriteError> {
    let mut options = OpenOptions::new();
    options.create(true);
    if log_mode {
        options.append(true);
    } else {
        options.write(true).truncate(true);
    }
    let mut file = options.open(path).map_err(|source| FileWriteError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let write_error = |source| FileWriteError::Write {
        path: path.to_path_buf(),
        source,
    };
    file.write_all(text.as_bytes()).map_err(write_error)?;
    if log_mode {
        file.write_all(b"\n").map_err(write_error)?;
    }
    file.flush().map_err(write_error)
}
