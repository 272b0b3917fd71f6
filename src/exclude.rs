// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Package-manager dependency exclusion.
//!
//! Package managers like to check out whole Git repositories as dependencies.
//! Those checkouts look like workspaces, but belong to the package manager.
//! This module decides which candidate paths are such dependencies.
//!
//! Two kinds of rules exist:
//!
//! - __Checkout rules__ match a fixed directory sequence anywhere in the path,
//!   e.g., `.build/checkouts/<pkg>` from SwiftPM.
//! - __Marker rules__ match a dependency directory only when the directory
//!   enclosing it holds the package manager's marker file, e.g.,
//!   `node_modules` next to `package.json`.
//!
//! All matching is done per path component, so `foo.build/checkouts` or
//! `my_node_modules` never match.

use std::path::{Component, Path};

/// Directory sequences that always hold vendored checkouts.
///
/// Only paths strictly beneath the sequence match.
const CHECKOUT_RULES: &[&str] = &[
    ".build/checkouts",
    "SourcePackages/checkouts",
    "Carthage/Checkouts",
];

/// Dependency directories recognized next to a marker file.
const MARKER_RULES: &[MarkerRule] = &[
    MarkerRule {
        marker: "package.json",
        dependency_dir: "node_modules",
    },
    MarkerRule {
        marker: "composer.json",
        dependency_dir: "vendor",
    },
    MarkerRule {
        marker: "Gemfile",
        dependency_dir: "vendor/bundle",
    },
];

#[derive(Debug, Clone, Copy)]
struct MarkerRule {
    marker: &'static str,
    dependency_dir: &'static str,
}

/// Check if candidate path belongs to a package manager.
///
/// The `relative` path is spelled relative to `manifest_root`, which is where
/// marker files are looked up from.
pub fn is_excluded(manifest_root: impl AsRef<Path>, relative: impl AsRef<Path>) -> bool {
    let components = normal_components(relative.as_ref());
    matches_checkout_rule(&components) || matches_marker_rule(manifest_root.as_ref(), &components)
}

fn matches_checkout_rule(components: &[String]) -> bool {
    CHECKOUT_RULES.iter().any(|rule| {
        let sequence = rule.split('/').collect::<Vec<_>>();
        let beneath = sequence_positions(components, &sequence)
            .any(|start| start + sequence.len() < components.len());
        beneath
    })
}

fn matches_marker_rule(manifest_root: &Path, components: &[String]) -> bool {
    MARKER_RULES.iter().any(|rule| {
        let sequence = rule.dependency_dir.split('/').collect::<Vec<_>>();
        let marked = sequence_positions(components, &sequence).any(|start| {
            let enclosing = components[..start]
                .iter()
                .fold(manifest_root.to_path_buf(), |path, part| path.join(part));
            enclosing.join(rule.marker).is_file()
        });
        marked
    })
}

/// Every index where `sequence` occurs as consecutive components.
fn sequence_positions<'a>(
    components: &'a [String],
    sequence: &'a [&'a str],
) -> impl Iterator<Item = usize> + 'a {
    let span = sequence.len();
    (0..components.len().saturating_sub(span.saturating_sub(1))).filter(move |&start| {
        span > 0
            && components[start..start + span]
                .iter()
                .zip(sequence)
                .all(|(part, expect)| part == expect)
    })
}

fn normal_components(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}
