//! Deterministic run names.
//!
//! A name is a readable prefix built from salient values followed by a digest
//! of the whole configuration, so two experiments differing in any value get
//! different folders while equal experiments always map to the same one.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::types::{Composition, ExperimentConfig, ParamValue};

/// Hex digits of the configuration digest kept in a name.
pub const DIGEST_LEN: usize = 12;

const MAX_PREFIX_LEN: usize = 96;

static UNSAFE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("unsafe-character regex should be valid"));

#[derive(Serialize)]
struct DigestInput<'a> {
    config: &'a ExperimentConfig,
    composition: &'a Composition,
}

/// Derive the folder-safe name for a config × composition pair.
pub fn run_name(config: &ExperimentConfig, composition: &Composition) -> String {
    let digest = config_digest(config, composition);
    let prefix = salient_prefix(config, composition);
    if prefix.is_empty() {
        digest
    } else {
        format!("{prefix}_{digest}")
    }
}

fn config_digest(config: &ExperimentConfig, composition: &Composition) -> String {
    let input = DigestInput {
        config,
        composition,
    };
    // Maps are BTreeMaps, so the serialization is canonical.
    let bytes = serde_json::to_vec(&input).unwrap_or_default();
    let hash = Sha256::digest(&bytes);
    hex::encode(hash)[..DIGEST_LEN].to_string()
}

fn salient_prefix(config: &ExperimentConfig, composition: &Composition) -> String {
    let mut segments = Vec::new();
    if let Some(label) = &composition.label {
        segments.push(sanitize(label));
    }
    if let Some(range) = range_segment(config, "Initial Pressure", "Final Pressure") {
        segments.push(format!("{range}bar"));
    }
    if let Some(range) = range_segment(config, "Initial Temperature", "Final Temperature") {
        segments.push(format!("{range}C"));
    }
    if let Some(buffer) = config.params.get("log fo2 Path") {
        segments.push(sanitize(&buffer.to_string()));
    }
    if !config.modes.is_empty() {
        let modes: Vec<String> = config.modes.iter().map(String::as_str).map(abbreviate).collect();
        segments.push(modes.join("-"));
    }

    let mut prefix = segments
        .into_iter()
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    if prefix.len() > MAX_PREFIX_LEN {
        prefix.truncate(MAX_PREFIX_LEN);
        prefix = prefix.trim_end_matches(['-', '_', '.']).to_string();
    }
    prefix
}

fn range_segment(config: &ExperimentConfig, initial: &str, last: &str) -> Option<String> {
    let start = config.params.get(initial)?;
    let segment = match config.params.get(last) {
        Some(end) if end != start => format!("{}-{}", value_text(start), value_text(end)),
        _ => value_text(start),
    };
    Some(sanitize(&segment))
}

fn value_text(value: &ParamValue) -> String {
    value.to_string()
}

/// `Fractionate Solids` -> `fracsoli`.
fn abbreviate(mode: &str) -> String {
    let words: Vec<String> = mode
        .split_whitespace()
        .map(|word| word.chars().take(4).collect::<String>().to_lowercase())
        .collect();
    sanitize(&words.join(""))
}

fn sanitize(raw: &str) -> String {
    UNSAFE_RE
        .replace_all(raw.trim(), "-")
        .trim_matches(['-', '.', '_'])
        .to_string()
}
