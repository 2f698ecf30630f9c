//! Cassette names and where they live on disk

use std::path::{Component, Path, PathBuf};

use crate::{Result, VcrError};

/// File extension appended to cassette names
pub const CASSETTE_EXTENSION: &str = "json";

/// Maximum cassette name length in bytes
pub const MAX_NAME_LEN: usize = 255;

/// Resolve a cassette name to its file under `dir`
///
/// `.json` is appended unless the name already carries it.
///
/// # Errors
///
/// Returns error if the name is invalid
pub fn resolve(dir: &Path, name: &str) -> Result<PathBuf> {
    validate_name(name)?;

    let suffix = format!(".{CASSETTE_EXTENSION}");
    if name.ends_with(&suffix) {
        Ok(dir.join(name))
    } else {
        Ok(dir.join(format!("{name}{suffix}")))
    }
}

/// Validate a cassette name
///
/// Names may contain `/` to group cassettes into directories but must stay
/// inside the cassette directory.
///
/// # Errors
///
/// Returns error if name is invalid
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(VcrError::InvalidCassetteName(
            "Cassette name cannot be empty".to_string(),
        ));
    }

    if name.len() > MAX_NAME_LEN {
        return Err(VcrError::InvalidCassetteName(format!(
            "Cassette name too long: {} > {MAX_NAME_LEN}",
            name.len()
        )));
    }

    if name.contains('\0') {
        return Err(VcrError::InvalidCassetteName(
            "Cassette name cannot contain null bytes".to_string(),
        ));
    }

    if name.contains('\\') {
        return Err(VcrError::InvalidCassetteName(
            "Cassette name must use '/' as separator".to_string(),
        ));
    }

    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => {
                if part.to_string_lossy().starts_with('.') {
                    return Err(VcrError::InvalidCassetteName(format!(
                        "Cassette name component cannot start with dot: {name}"
                    )));
                }
            }
            Component::ParentDir => {
                return Err(VcrError::InvalidCassetteName(
                    "Cassette name cannot contain '..'".to_string(),
                ));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(VcrError::InvalidCassetteName(format!(
                    "Cassette name must be relative: {name}"
                )));
            }
            Component::CurDir => {}
        }
    }

    // The file itself must be visible too: "." and "a/" would resolve to
    // "..json" and "a/.json"
    let file_name = name.rsplit('/').next().unwrap_or_default();
    if file_name.is_empty() || file_name.starts_with('.') {
        return Err(VcrError::InvalidCassetteName(format!(
            "Cassette name must end in a visible file name: {name}"
        )));
    }

    Ok(())
}

/// Derive a cassette name from test metadata
///
/// `groups` lists the enclosing test groups, outermost first. The cassette
/// lands in a directory named after the innermost group, or after its parent
/// when the example is nested two levels deep, in which case the innermost
/// group prefixes the file name. Whitespace runs become `_`.
#[must_use]
pub fn name_for_test(groups: &[&str], example: &str) -> String {
    match groups {
        [] => format!("{}.{CASSETTE_EXTENSION}", underscore(example)),
        [group] => format!(
            "{}/{}.{CASSETTE_EXTENSION}",
            underscore(group),
            underscore(example)
        ),
        [.., parent, group] => format!(
            "{}/{}.{CASSETTE_EXTENSION}",
            underscore(parent),
            underscore(&format!("{group}_{example}"))
        ),
    }
}

fn underscore(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push('_');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}
