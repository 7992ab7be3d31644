use std::io;
use std::path::{Path, PathBuf};

use log::{info, warn};
use toml_edit::{ArrayOfTables, DocumentMut, Item, Table};

use crate::config::{sanitize_config, Config};

const CONFIG_PATH_ENV: &str = "SONGSINK_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no config directory available; set SONGSINK_CONFIG")]
    NoConfigDir,
    #[error("couldn't access {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("couldn't serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("{} didn't parse; fix it by hand before editing outputs", .path.display())]
    Unparseable { path: PathBuf },
}

/// How `load_config_file` produced its config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOrigin {
    Created,
    Parsed,
    /// The file exists but didn't parse; defaults are in use and the file must be kept.
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedConfig {
    pub config: Config,
    pub origin: ConfigOrigin,
}

/// `$SONGSINK_CONFIG`, else `<config dir>/songsink/config.toml`.
pub fn resolve_config_path() -> Result<PathBuf, ConfigError> {
    if let Some(explicit) = std::env::var_os(CONFIG_PATH_ENV) {
        return Ok(PathBuf::from(explicit));
    }
    dirs::config_dir()
        .map(|root| root.join("songsink").join("config.toml"))
        .ok_or(ConfigError::NoConfigDir)
}

/// Reads the config at `path`, writing defaults first when it doesn't exist.
///
/// A file that fails to parse falls back to defaults, reported as
/// [`ConfigOrigin::Fallback`] so callers know not to persist over it.
pub fn load_config_file(path: &Path) -> Result<LoadedConfig, ConfigError> {
    if !path.exists() {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let default_config = Config::default();
        info!(
            "Config file not found. Creating default config. path={}",
            path.display()
        );
        std::fs::write(path, toml::to_string(&default_config)?).map_err(|source| {
            ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }
        })?;
        return Ok(LoadedConfig {
            config: default_config,
            origin: ConfigOrigin::Created,
        });
    }

    let config_content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let (config, origin) = match toml::from_str::<Config>(&config_content) {
        Ok(config) => (config, ConfigOrigin::Parsed),
        Err(err) => {
            warn!(
                "Failed to parse config {} ({}). Using defaults.",
                path.display(),
                err
            );
            (Config::default(), ConfigOrigin::Fallback)
        }
    };
    Ok(LoadedConfig {
        config: sanitize_config(config),
        origin,
    })
}

/// Persists an edited config, refusing when the file on disk never parsed.
pub fn persist_loaded_config(loaded: &LoadedConfig, path: &Path) -> Result<(), ConfigError> {
    if loaded.origin == ConfigOrigin::Fallback {
        return Err(ConfigError::Unparseable {
            path: path.to_path_buf(),
        });
    }
    persist_config_file(&loaded.config, path);
    Ok(())
}

fn set_table_value_preserving_decor(table: &mut Table, key: &str, item: Item) {
    let replacing_scalar_with_aot = item.is_array_of_tables()
        && table
            .get(key)
            .is_some_and(|current| !current.is_array_of_tables());
    if replacing_scalar_with_aot {
        table.remove(key);
        table[key] = item;
        return;
    }

    let existing_value_decor = table
        .get(key)
        .and_then(|current| current.as_value().map(|value| value.decor().clone()));
    table[key] = item;
    if let Some(existing_value_decor) = existing_value_decor {
        if let Some(next_value) = table[key].as_value_mut() {
            *next_value.decor_mut() = existing_value_decor;
        }
    }
}

fn merge_table_with_targeted_updates(destination: &mut Table, source: &Table) {
    let stale_keys: Vec<String> = destination
        .iter()
        .map(|(key, _)| key.to_string())
        .filter(|key| !source.contains_key(key))
        .collect();
    for key in stale_keys {
        destination.remove(&key);
    }

    for (key, source_item) in source.iter() {
        match source_item {
            Item::Table(source_table) => {
                if !destination.get(key).is_some_and(Item::is_table) {
                    destination.insert(key, Item::Table(Table::new()));
                }
                if let Some(destination_table) =
                    destination.get_mut(key).and_then(Item::as_table_mut)
                {
                    merge_table_with_targeted_updates(destination_table, source_table);
                }
            }
            Item::ArrayOfTables(source_array) => {
                if !destination.get(key).is_some_and(Item::is_array_of_tables) {
                    set_table_value_preserving_decor(destination, key, source_item.clone());
                    continue;
                }
                if let Some(destination_array) =
                    destination.get_mut(key).and_then(Item::as_array_of_tables_mut)
                {
                    merge_array_of_tables(destination_array, source_array);
                }
            }
            _ => {
                set_table_value_preserving_decor(destination, key, source_item.clone());
            }
        }
    }
}

fn table_identity(table: &Table) -> Option<&str> {
    table.get("path").and_then(Item::as_str)
}

/// Pairs entries by their `path` so comments follow the entry they were written above.
/// Entries without a `path` pair by position.
fn merge_array_of_tables(destination: &mut ArrayOfTables, source: &ArrayOfTables) {
    let mut previous: Vec<Option<Table>> = destination.iter().cloned().map(Some).collect();
    let mut merged = ArrayOfTables::new();
    for (index, source_table) in source.iter().enumerate() {
        let matched = match table_identity(source_table) {
            Some(identity) => previous.iter().position(|candidate| {
                candidate.as_ref().and_then(table_identity) == Some(identity)
            }),
            None => previous
                .get(index)
                .and_then(Option::as_ref)
                .is_some_and(|candidate| table_identity(candidate).is_none())
                .then_some(index),
        };
        match matched.and_then(|position| previous[position].take()) {
            Some(mut destination_table) => {
                merge_table_with_targeted_updates(&mut destination_table, source_table);
                merged.push(destination_table);
            }
            None => merged.push(source_table.clone()),
        }
    }
    *destination = merged;
}

/// Re-serializes `config` into `existing_text`, keeping the user's comments and layout.
pub fn serialize_config_with_preserved_comments(
    existing_text: &str,
    config: &Config,
) -> Result<String, String> {
    let next_config_text = toml::to_string(config)
        .map_err(|err| format!("failed to serialize config to TOML: {}", err))?;
    let next_document = next_config_text
        .parse::<DocumentMut>()
        .map_err(|err| format!("failed to parse serialized config TOML document: {}", err))?;
    let mut existing_document = existing_text
        .parse::<DocumentMut>()
        .map_err(|err| format!("failed to parse existing config as TOML document: {}", err))?;

    merge_table_with_targeted_updates(existing_document.as_table_mut(), next_document.as_table());
    Ok(existing_document.to_string())
}

pub fn persist_config_file(config: &Config, path: &Path) {
    let existing_text = std::fs::read_to_string(path).ok();
    let config_text = if let Some(existing_text) = existing_text {
        match serialize_config_with_preserved_comments(&existing_text, config) {
            Ok(updated_text) => Some(updated_text),
            Err(err) => {
                warn!(
                    "Failed to preserve config comments for {} ({}). Falling back to plain serialization.",
                    path.display(),
                    err
                );
                toml::to_string(config).ok()
            }
        }
    } else {
        toml::to_string(config).ok()
    };

    let Some(config_text) = config_text else {
        log::error!("Failed to serialize config for {}", path.display());
        return;
    };

    if let Err(err) = std::fs::write(path, config_text) {
        log::error!("Failed to persist config to {}: {}", path.display(), err);
    }
}

#[cfg(test)]
mod tests {
    use super::{
        load_config_file, persist_config_file, persist_loaded_config,
        serialize_config_with_preserved_comments, ConfigError, ConfigOrigin,
    };
    use crate::output_editor::add_output;
    use crate::config::{Config, OutputConfig};
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_dir(name: &str) -> PathBuf {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time should be valid")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("songsink_config_{name}_{nonce}"));
        fs::create_dir_all(&dir).expect("should create temp dir");
        dir
    }

    #[test]
    fn test_missing_config_is_created_with_defaults() {
        let dir = unique_temp_dir("create");
        let path = dir.join("nested").join("config.toml");
        let loaded = load_config_file(&path).expect("default config should load");
        assert_eq!(loaded.origin, ConfigOrigin::Created);
        assert_eq!(loaded.config, Config::default());
        assert!(path.exists());
        let reparsed: Config =
            toml::from_str(&fs::read_to_string(&path).unwrap()).expect("written config parses");
        assert_eq!(reparsed, Config::default());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_invalid_config_falls_back_without_overwriting() {
        let dir = unique_temp_dir("invalid");
        let path = dir.join("config.toml");
        fs::write(&path, "[general\nbroken").unwrap();
        let loaded = load_config_file(&path).expect("invalid config still loads");
        assert_eq!(loaded.origin, ConfigOrigin::Fallback);
        assert_eq!(loaded.config, Config::default());
        assert_eq!(fs::read_to_string(&path).unwrap(), "[general\nbroken");
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_load_sanitizes_values() {
        let dir = unique_temp_dir("sanitize");
        let path = dir.join("config.toml");
        fs::write(&path, "[general]\nrefresh_rate_ms = 5\n").unwrap();
        let loaded = load_config_file(&path).unwrap();
        assert_eq!(loaded.origin, ConfigOrigin::Parsed);
        assert_eq!(loaded.config.general.refresh_rate_ms, 100);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_edit_after_fallback_keeps_user_file() {
        let dir = unique_temp_dir("fallback_edit");
        let path = dir.join("config.toml");
        let original = r#"[general]
placeholder = "Nothing"

[[outputs]]
format = "%t"
path = "/tmp/song.txt"
log_mode = tru
"#;
        fs::write(&path, original).unwrap();

        let mut loaded = load_config_file(&path).unwrap();
        assert_eq!(loaded.origin, ConfigOrigin::Fallback);
        add_output(
            &mut loaded.config,
            OutputConfig {
                format: "%a".to_string(),
                path: dir.join("artist.txt"),
                log_mode: false,
            },
        )
        .unwrap();

        let result = persist_loaded_config(&loaded, &path);
        assert!(matches!(result, Err(ConfigError::Unparseable { .. })));
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_edit_after_parse_is_persisted() {
        let dir = unique_temp_dir("parsed_edit");
        let path = dir.join("config.toml");
        fs::write(&path, "[general]\nplaceholder = \"Nothing\" # idle text\n").unwrap();

        let mut loaded = load_config_file(&path).unwrap();
        add_output(
            &mut loaded.config,
            OutputConfig {
                format: "%a".to_string(),
                path: dir.join("artist.txt"),
                log_mode: false,
            },
        )
        .unwrap();
        persist_loaded_config(&loaded, &path).expect("parsed config can be persisted");

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("placeholder = \"Nothing\" # idle text"));
        let reparsed: Config = toml::from_str(&written).unwrap();
        assert_eq!(reparsed.outputs.len(), 1);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_serialize_preserves_comments_and_updates_values() {
        let existing = r#"# songsink settings
[general]
# how often to poll, in ms
refresh_rate_ms = 1000 # poll interval
placeholder = "n/a"

[[outputs]]
# main overlay line
format = "%t - %a"
path = "/tmp/song.txt"
log_mode = false
"#;
        let mut config: Config = toml::from_str(existing).unwrap();
        config.general.refresh_rate_ms = 2_000;
        config.outputs.push(OutputConfig {
            format: "%t".to_string(),
            path: PathBuf::from("/tmp/history.txt"),
            log_mode: true,
        });

        let updated = serialize_config_with_preserved_comments(existing, &config)
            .expect("should serialize");
        assert!(updated.contains("# songsink settings"));
        assert!(updated.contains("# how often to poll, in ms"));
        assert!(updated.contains("# main overlay line"));
        assert!(updated.contains("refresh_rate_ms = 2000 # poll interval"));
        let reparsed: Config = toml::from_str(&updated).expect("updated config parses");
        assert_eq!(reparsed, config);
    }

    #[test]
    fn test_serialize_drops_removed_outputs() {
        let existing = r#"
[[outputs]]
format = "%t"
path = "/tmp/a.txt"

[[outputs]]
format = "%a"
path = "/tmp/b.txt"
"#;
        let mut config: Config = toml::from_str(existing).unwrap();
        config.outputs.remove(0);
        let updated = serialize_config_with_preserved_comments(existing, &config).unwrap();
        let reparsed: Config = toml::from_str(&updated).unwrap();
        assert_eq!(reparsed.outputs.len(), 1);
        assert_eq!(reparsed.outputs[0].path, PathBuf::from("/tmp/b.txt"));
    }

    #[test]
    fn test_removed_output_takes_its_comment_along() {
        let existing = r#"# overlay title
[[outputs]]
format = "%t"
path = "/tmp/a.txt" # title file

# stream history
[[outputs]]
format = "%a"
path = "/tmp/b.txt" # history file
log_mode = true
"#;
        let mut config: Config = toml::from_str(existing).unwrap();
        config.outputs.remove(0);
        let updated = serialize_config_with_preserved_comments(existing, &config).unwrap();

        assert!(!updated.contains("# overlay title"));
        assert!(!updated.contains("# title file"));
        assert!(updated.contains("# stream history"));
        assert!(updated.contains("path = \"/tmp/b.txt\" # history file"));
        let reparsed: Config = toml::from_str(&updated).unwrap();
        assert_eq!(reparsed, config);
    }

    #[test]
    fn test_persist_config_file_writes_new_file() {
        let dir = unique_temp_dir("persist");
        let path = dir.join("config.toml");
        let mut config = Config::default();
        config.general.placeholder = "%s".to_string();
        persist_config_file(&config, &path);
        let reparsed: Config = toml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(reparsed, config);
        let _ = fs::remove_dir_all(dir);
    }
}
