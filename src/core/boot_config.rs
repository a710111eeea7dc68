//! Boot config loading
//!
//! Collects every `*.toml` under the boot config directory, filters the file
//! list with the include/exclude patterns, orders it by numeric prefix and
//! merges the top-level arrays of all files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use walkdir::WalkDir;

use crate::core::progress::print_list_tree;
use crate::error::ConfigError;

/// Section holding custom node entries
pub const NODES_SECTION: &str = "custom_nodes";

/// Section holding model entries
pub const MODELS_SECTION: &str = "models";

/// Merged boot config
#[derive(Debug, Clone, Default)]
pub struct BootConfig {
    /// Config files that were merged, in merge order
    pub files: Vec<PathBuf>,
    sections: BTreeMap<String, Vec<toml::Value>>,
}

impl BootConfig {
    /// Entries of a section, empty when the section is absent
    pub fn section(&self, name: &str) -> &[toml::Value] {
        self.sections.get(name).map_or(&[], Vec::as_slice)
    }

    /// Custom node entries
    pub fn custom_nodes(&self) -> &[toml::Value] {
        self.section(NODES_SECTION)
    }

    /// Model entries
    pub fn models(&self) -> &[toml::Value] {
        self.section(MODELS_SECTION)
    }

    /// Whether no section holds any entry
    pub fn is_empty(&self) -> bool {
        self.sections.values().all(Vec::is_empty)
    }

    /// Append the arrays of one parsed file
    fn merge(&mut self, path: &Path, table: toml::Table) {
        for (key, value) in table {
            match value {
                toml::Value::Array(items) => {
                    self.sections.entry(key).or_default().extend(items);
                }
                other => {
                    tracing::warn!(
                        "Skipping key '{key}' in '{}': expected an array, got {}",
                        path.display(),
                        other.type_str()
                    );
                }
            }
        }
    }

    /// Parse and merge config text
    pub fn merge_str(&mut self, path: &Path, content: &str) -> Result<(), ConfigError> {
        let table: toml::Table = content.parse().map_err(|e: toml::de::Error| {
            ConfigError::ParseFile {
                path: path.to_path_buf(),
                error: e.to_string(),
            }
        })?;
        self.merge(path, table);
        Ok(())
    }
}

/// Compile an optional filter pattern
///
/// Empty patterns mean "no filter".
pub fn compile_pattern(pattern: Option<&str>) -> Result<Option<Regex>, ConfigError> {
    match pattern {
        None | Some("") => Ok(None),
        Some(p) => Regex::new(p)
            .map(Some)
            .map_err(|e| ConfigError::InvalidPattern {
                pattern: p.to_string(),
                error: e.to_string(),
            }),
    }
}

/// Keep paths matching `include` and drop paths matching `exclude`
///
/// Patterns are searched anywhere in the full path string.
pub fn filter_paths(
    paths: Vec<PathBuf>,
    include: Option<&Regex>,
    exclude: Option<&Regex>,
) -> Vec<PathBuf> {
    paths
        .into_iter()
        .filter(|p| {
            let s = p.to_string_lossy();
            let included = include.map_or(true, |re| re.is_match(&s));
            let excluded = exclude.is_some_and(|re| re.is_match(&s));
            included && !excluded
        })
        .collect()
}

/// Sort key: numeric `NN-` file name prefix first, unprefixed files last
///
/// Ties are broken by file name, then by full path.
pub fn numeric_prefix_key(path: &Path) -> (u64, String, PathBuf) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let digits: String = name.chars().take_while(char::is_ascii_digit).collect();
    let prefix = if !digits.is_empty() && name[digits.len()..].starts_with('-') {
        digits.parse().unwrap_or(u64::MAX)
    } else {
        u64::MAX
    };
    (prefix, name, path.to_path_buf())
}

/// Sort config files by numeric prefix, then by name and path
pub fn sort_config_files(files: &mut [PathBuf]) {
    files.sort_by_cached_key(|p| numeric_prefix_key(p));
}

/// Find every `*.toml` below `dir`
pub fn discover_toml_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
        .collect()
}

/// Load and merge the boot config
///
/// A regular file where the directory should be is removed. Files that fail to
/// parse are logged and skipped; invalid filter patterns are logged and ignored.
pub fn load_boot_config(dir: &Path, include: Option<&str>, exclude: Option<&str>) -> BootConfig {
    if dir.is_file() {
        tracing::warn!("Invalid config detected at {}, removing...", dir.display());
        if let Err(e) = std::fs::remove_file(dir) {
            tracing::error!("Failed to remove '{}': {e}", dir.display());
        }
        return BootConfig::default();
    }
    if !dir.is_dir() {
        tracing::info!("No config directory found");
        return BootConfig::default();
    }

    tracing::info!("Loading config: {}", dir.display());
    let mut files = discover_toml_files(dir);

    let include_re = log_pattern("Include", include);
    let exclude_re = log_pattern("Exclude", exclude);
    if include_re.is_some() || exclude_re.is_some() {
        files = filter_paths(files, include_re.as_ref(), exclude_re.as_ref());
    }
    sort_config_files(&mut files);

    tracing::info!("Found {} config files:", files.len());
    print_list_tree(&files.iter().map(|f| f.display().to_string()).collect::<Vec<_>>());

    let mut config = BootConfig::default();
    for file in files {
        let result = std::fs::read_to_string(&file)
            .map_err(|e| ConfigError::ReadFile {
                path: file.clone(),
                error: e.to_string(),
            })
            .and_then(|content| config.merge_str(&file, &content));
        match result {
            Ok(()) => config.files.push(file),
            Err(e) => tracing::error!("{e}"),
        }
    }

    if config.is_empty() {
        tracing::info!("No valid config found");
    }
    tracing::debug!("Loaded config: {:?}", config.sections);
    config
}

fn log_pattern(kind: &str, pattern: Option<&str>) -> Option<Regex> {
    match compile_pattern(pattern) {
        Ok(Some(re)) => {
            tracing::info!("{kind} config filter: {}", re.as_str());
            Some(re)
        }
        Ok(None) => None,
        Err(e) => {
            tracing::error!("{e}");
            None
        }
    }
}
