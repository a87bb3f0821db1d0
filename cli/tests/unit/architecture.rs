//! Structural tests for layer boundary enforcement.
//!
//! These tests scan source files to verify that the domain, application and
//! infrastructure layers only import what they are allowed to.

use std::path::{Path, PathBuf};

/// Collect all `.rs` files under a directory recursively.
fn collect_rs_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                files.extend(collect_rs_files(&path));
            } else if path.extension().and_then(|e| e.to_str()) == Some("rs") {
                files.push(path);
            }
        }
    }
    files
}

/// Read a file and strip comment lines to avoid false positives.
fn read_non_comment_lines(path: &Path) -> Vec<String> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    content
        .lines()
        .filter(|l| {
            let trimmed = l.trim();
            !trimmed.starts_with("//") && !trimmed.starts_with("/*") && !trimmed.starts_with('*')
        })
        .map(String::from)
        .collect()
}

/// Lines under `src/<layer>` that contain any of `forbidden`.
fn violations(layer: &str, forbidden: &[&str]) -> Vec<String> {
    let root = Path::new(env!("CARGO_MANIFEST_DIR"));
    let mut found = Vec::new();
    for file in collect_rs_files(&root.join("src").join(layer)) {
        let rel = file.strip_prefix(root).unwrap_or(&file).display().to_string();
        for (i, line) in read_non_comment_lines(&file).iter().enumerate() {
            if forbidden.iter().any(|f| line.contains(f)) {
                found.push(format!("{rel}:{}: {line}", i + 1));
            }
        }
    }
    found
}

#[test]
fn domain_has_no_io_or_outer_layer_imports() {
    let found = violations(
        "domain",
        &[
            "crate::infra",
            "crate::application",
            "crate::commands",
            "crate::output",
            "tokio::",
            "std::fs",
            "std::process",
        ],
    );
    assert!(found.is_empty(), "domain/ must stay pure:\n{}", found.join("\n"));
}

#[test]
fn application_does_not_reach_outward() {
    let found = violations(
        "application",
        &["crate::infra", "crate::commands", "crate::output", "std::fs::"],
    );
    assert!(
        found.is_empty(),
        "application/ may only use domain and ports:\n{}",
        found.join("\n")
    );
}

#[test]
fn infra_does_not_depend_on_presentation() {
    let found = violations("infra", &["crate::commands", "crate::output"]);
    assert!(
        found.is_empty(),
        "infra/ must not import commands or output:\n{}",
        found.join("\n")
    );
}

#[test]
fn docker_is_only_spawned_from_infra() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("src");
    let mut found = Vec::new();
    for file in collect_rs_files(&root) {
        let rel = file.to_string_lossy().replace('\\', "/");
        if rel.contains("/infra/") {
            continue;
        }
        for (i, line) in read_non_comment_lines(&file).iter().enumerate() {
            if line.contains("TokioCommandRunner::new") || line.contains("Command::new(\"docker\"") {
                found.push(format!("{rel}:{}: {line}", i + 1));
            }
        }
    }
    assert!(
        found.is_empty(),
        "docker must only be driven through infra/:\n{}",
        found.join("\n")
    );
}
