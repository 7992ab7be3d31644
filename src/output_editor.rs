//! Validated edits to the configured output list.

use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;

use crate::config::{Config, OutputConfig};

#[derive(Debug, thiserror::Error)]
pub enum OutputEditError {
    #[error("output format is empty")]
    EmptyFormat,
    #[error("output path is empty")]
    EmptyPath,
    #[error("can't open {} for writing: {}", .path.display(), .source)]
    Unwritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no output at index {index} ({count} configured)")]
    NoSuchOutput { index: usize, count: usize },
}

/// Checks `output` could be written right now. A file created to check that is removed again.
pub fn validate_output(output: &OutputConfig) -> Result<(), OutputEditError> {
    if output.format.trim().is_empty() {
        return Err(OutputEditError::EmptyFormat);
    }
    if output.path.as_os_str().is_empty() {
        return Err(OutputEditError::EmptyPath);
    }

    let existed = output.path.exists();
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&output.path)
        .map_err(|source| OutputEditError::Unwritable {
            path: output.path.clone(),
            source,
        })?;
    if !existed {
        let _ = std::fs::remove_file(&output.path);
    }
    Ok(())
}

pub fn add_output(config: &mut Config, output: OutputConfig) -> Result<(), OutputEditError> {
    validate_output(&output)?;
    config.outputs.push(output);
    Ok(())
}

pub fn edit_output(
    config: &mut Config,
    index: usize,
    output: OutputConfig,
) -> Result<(), OutputEditError> {
    let count = config.outputs.len();
    if index >= count {
        return Err(OutputEditError::NoSuchOutput { index, count });
    }
    validate_output(&output)?;
    config.outputs[index] = output;
    Ok(())
}

pub fn remove_output(config: &mut Config, index: usize) -> Result<OutputConfig, OutputEditError> {
    let count = config.outputs.len();
    if index >= count {
        return Err(OutputEditError::NoSuchOutput { index, count });
    }
    Ok(config.outputs.remove(index))
}
