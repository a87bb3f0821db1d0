//! Environment merge for remote commands.
//!
//! `PATH` assignments accumulate: every supplied `PATH` entry is joined with
//! `:` in the order given, followed by the container's existing `PATH`.
//! Any other key is last-write-wins.

use crate::domain::error::ConfigError;

const PATH_KEY: &str = "PATH";

/// Split `KEY=VALUE`, rejecting entries without `=` or with an empty key.
fn split(assignment: &str) -> Result<(&str, &str), ConfigError> {
    match assignment.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => Err(ConfigError::InvalidAssignment(assignment.to_string())),
    }
}

/// Returns `true` when the merge needs the container's current `PATH`.
#[must_use]
pub fn needs_existing_path(assignments: &[String]) -> bool {
    assignments
        .iter()
        .any(|a| a.split_once('=').is_some_and(|(k, _)| k == PATH_KEY))
}

/// Look up `PATH` in a container's `KEY=VALUE` environment listing.
#[must_use]
pub fn existing_path(container_env: &[String]) -> Option<&str> {
    container_env
        .iter()
        .filter_map(|a| a.split_once('='))
        .find(|(k, _)| *k == PATH_KEY)
        .map(|(_, v)| v)
}

/// Merge `assignments` into the final list passed to the container.
///
/// Keys keep the position of their first occurrence.
///
/// # Errors
///
/// Returns `ConfigError::InvalidAssignment` for an entry that is not `KEY=VALUE`.
pub fn merge_environment(
    assignments: &[String],
    existing_path: Option<&str>,
) -> Result<Vec<String>, ConfigError> {
    let mut order: Vec<&str> = Vec::new();
    let mut values: Vec<String> = Vec::new();
    let mut paths: Vec<&str> = Vec::new();

    for assignment in assignments {
        let (key, value) = split(assignment)?;
        if key == PATH_KEY {
            paths.push(value);
        }
        match order.iter().position(|k| *k == key) {
            Some(i) => values[i] = value.to_string(),
            None => {
                order.push(key);
                values.push(value.to_string());
            }
        }
    }

    if let Some(i) = order.iter().position(|k| *k == PATH_KEY) {
        let mut joined = paths.join(":");
        if let Some(existing) = existing_path.filter(|p| !p.is_empty()) {
            joined.push(':');
            joined.push_str(existing);
        }
        values[i] = joined;
    }

    Ok(order
        .into_iter()
        .zip(values)
        .map(|(k, v)| format!("{k}={v}"))
        .collect())
}
