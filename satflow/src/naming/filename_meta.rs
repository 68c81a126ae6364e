//! Filename metadata parsing.
//!
//! Instrument filenames embed the observation start time (and, for
//! extraction inputs, the source and parameter). Rules are configured per
//! group (a source name, or `extractor`) and per file type (a data-service
//! name, or a parameter family) as regular expressions with named groups:
//!
//! - `start_time`: parsed with the rule's chrono `time_format`
//! - `source_name`: the producing source
//! - `param`: the short parameter code
//! - `ext`: the file extension

use crate::errors::ConfigError;
use crate::utils::MarkTimestamp;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::keys::basename;

/// A single filename rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilenamePattern {
    /// Regular expression matched against the object's basename.
    pub pattern: String,
    /// chrono format of the `start_time` capture.
    #[serde(default = "default_time_format")]
    pub time_format: String,
}

fn default_time_format() -> String {
    crate::utils::MARK_FORMAT.to_string()
}

impl FilenamePattern {
    /// Creates a rule with the default `YYYYMMDDHHMM` time format.
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            time_format: default_time_format(),
        }
    }

    /// Sets the time format.
    #[must_use]
    pub fn with_time_format(mut self, format: impl Into<String>) -> Self {
        self.time_format = format.into();
        self
    }
}

/// Filename rules: group -> file type -> patterns (tried in order).
pub type FilenameRules = BTreeMap<String, BTreeMap<String, Vec<FilenamePattern>>>;

/// Metadata parsed out of a filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilenameMeta {
    /// The basename that matched.
    pub filename: String,
    /// The file type whose rule matched.
    pub file_type: String,
    /// Observation start time, truncated to the minute.
    pub start_time: Option<MarkTimestamp>,
    /// Producing source.
    pub source_name: Option<String>,
    /// Short parameter code.
    pub param_short: Option<String>,
    /// File extension, with a leading dot.
    pub extension: Option<String>,
}

#[derive(Debug)]
struct CompiledRule {
    file_type: String,
    regex: Regex,
    time_format: String,
}

/// Compiled filename rules.
#[derive(Debug, Default)]
pub struct FilenameMetaReader {
    groups: HashMap<String, Vec<CompiledRule>>,
}

impl FilenameMetaReader {
    /// Compiles the configured rules.
    pub fn new(rules: &FilenameRules) -> Result<Self, ConfigError> {
        let mut groups = HashMap::new();
        for (group, types) in rules {
            let mut compiled = Vec::new();
            for (file_type, patterns) in types {
                for p in patterns {
                    let regex = Regex::new(&p.pattern).map_err(|e| {
                        ConfigError::invalid(
                            format!("filename_rules.{group}.{file_type}"),
                            e.to_string(),
                        )
                    })?;
                    compiled.push(CompiledRule {
                        file_type: file_type.clone(),
                        regex,
                        time_format: p.time_format.clone(),
                    });
                }
            }
            groups.insert(group.clone(), compiled);
        }
        Ok(Self { groups })
    }

    /// Returns true if rules exist for a group.
    #[must_use]
    pub fn has_group(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    /// Parses the basename of `key` with the rules of `group`.
    ///
    /// When `file_types` is given, only rules for those types are tried.
    /// A rule whose `start_time` capture does not parse is treated as a
    /// non-match.
    #[must_use]
    pub fn find(
        &self,
        group: &str,
        key: &str,
        file_types: Option<&[&str]>,
    ) -> Option<FilenameMeta> {
        let filename = basename(key);
        let rules = self.groups.get(group)?;

        for rule in rules {
            if let Some(types) = file_types {
                if !types.contains(&rule.file_type.as_str()) {
                    continue;
                }
            }
            let Some(caps) = rule.regex.captures(filename) else {
                continue;
            };

            let start_time = match caps.name("start_time") {
                Some(m) => match MarkTimestamp::parse_with_format(m.as_str(), &rule.time_format) {
                    Ok(ts) => Some(ts),
                    Err(e) => {
                        debug!(filename, error = %e, "Start time capture did not parse");
                        continue;
                    }
                },
                None => None,
            };

            let extension = caps
                .name("ext")
                .map(|m| m.as_str().to_string())
                .or_else(|| filename.rsplit_once('.').map(|(_, ext)| ext.to_string()))
                .map(|ext| super::keys::normalize_extension(&ext));

            return Some(FilenameMeta {
                filename: filename.to_string(),
                file_type: rule.file_type.clone(),
                start_time,
                source_name: caps.name("source_name").map(|m| m.as_str().to_string()),
                param_short: caps.name("param").map(|m| m.as_str().to_string()),
                extension,
            });
        }

        None
    }

    /// Returns the start time of `key` for one file type.
    #[must_use]
    pub fn start_time(&self, group: &str, key: &str, file_type: &str) -> Option<MarkTimestamp> {
        self.find(group, key, Some(&[file_type]))
            .and_then(|meta| meta.start_time)
    }
}
