//! Parsing of the `tailing-sidecar` Pod annotation
//!
//! The annotation value is a `;`-separated list of entries. Each entry is
//! either `<name>:<volume>:<file>` or `<volume>:<file>`:
//!
//! ```text
//! tailing-sidecar: "nginx:varlog:/var/log/nginx/access.log;varlog:/var/log/app.log"
//! ```

use std::collections::BTreeMap;

use crate::crd::SidecarConfig;
use crate::Error;

/// Annotation key whose presence enables sidecar injection for a Pod
pub const SIDECAR_ANNOTATION: &str = "tailing-sidecar";

/// Name prefix for annotation entries declared without a name
const UNNAMED_CONFIG_PREFIX: &str = "tailing-sidecar-annotation-";

const ENTRY_SEPARATOR: char = ';';
const PART_SEPARATOR: char = ':';

/// A malformed annotation entry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnnotationParseError {
    /// Entry does not have two or three `:`-separated parts
    #[error("entry '{0}' must have the form [name:]volume:file")]
    InvalidFormat(String),

    /// Entry names an empty volume or config name
    #[error("entry '{0}' has an empty name or volume")]
    EmptyField(String),

    /// File to tail is not an absolute path
    #[error("entry '{entry}' has a non-absolute file path '{file}'")]
    RelativePath { entry: String, file: String },
}

/// Parse a single annotation entry into its config name and SidecarConfig
///
/// `index` is the position of the entry in the annotation and names
/// entries declared without an explicit name.
pub fn parse_entry(
    entry: &str,
    index: usize,
) -> std::result::Result<(String, SidecarConfig), AnnotationParseError> {
    let parts: Vec<&str> = entry.split(PART_SEPARATOR).map(str::trim).collect();

    let (name, volume, file) = match parts.as_slice() {
        [volume, file] => (format!("{}{}", UNNAMED_CONFIG_PREFIX, index), *volume, *file),
        [name, volume, file] => (name.to_string(), *volume, *file),
        _ => return Err(AnnotationParseError::InvalidFormat(entry.to_string())),
    };

    if name.is_empty() || volume.is_empty() {
        return Err(AnnotationParseError::EmptyField(entry.to_string()));
    }

    if !file.starts_with('/') {
        return Err(AnnotationParseError::RelativePath {
            entry: entry.to_string(),
            file: file.to_string(),
        });
    }

    Ok((name, SidecarConfig::new(file, volume)))
}

/// Parse every entry of an annotation value
///
/// Returns the named configs that parsed and an `Error::AnnotationError`
/// for each entry that did not.
pub fn parse_annotation(value: &str) -> (BTreeMap<String, SidecarConfig>, Vec<Error>) {
    let mut configs = BTreeMap::new();
    let mut errors = Vec::new();

    let entries = value
        .split(ENTRY_SEPARATOR)
        .map(str::trim)
        .filter(|entry| !entry.is_empty());

    for (index, entry) in entries.enumerate() {
        match parse_entry(entry, index) {
            Ok((name, config)) => {
                configs.insert(name, config);
            }
            Err(e) => errors.push(Error::from(e)),
        }
    }

    (configs, errors)
}
