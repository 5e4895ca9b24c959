//! Certification level normalization
//!
//! Sources report levels as digits ("2"), prefixed forms ("L2", "Level 2")
//! or status strings ("mentor", "exam required"). Status strings are mapped
//! through a [`LevelRemap`] table that can be extended from configuration.

use std::collections::BTreeMap;

use certsync_common::types::{MAX_CERT_LEVEL, UNCERTIFIED_LEVEL};
use serde::{Deserialize, Serialize};

/// Built-in status codes and the nearest numeric level
const BUILTIN_REMAP: &[(&str, i16)] = &[
    ("tap", 3),
    ("mentor", 3),
    ("l3cc", 3),
    ("exam required", 1),
    ("l2 exam required", 1),
    ("l3 in progress", 2),
    ("none", 0),
];

/// Lookup table from lowercase status code to level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LevelRemap {
    codes: BTreeMap<String, i16>,
}

impl Default for LevelRemap {
    fn default() -> Self {
        let codes = BUILTIN_REMAP
            .iter()
            .map(|(code, level)| ((*code).to_string(), *level))
            .collect();
        Self { codes }
    }
}

impl LevelRemap {
    /// Add or replace a code; the level is clamped into range
    pub fn insert(&mut self, code: &str, level: i16) {
        self.codes.insert(
            normalize(code),
            level.clamp(UNCERTIFIED_LEVEL, MAX_CERT_LEVEL),
        );
    }

    /// Merge `code=level` pairs separated by commas
    pub fn merge_str(&mut self, pairs: &str) -> anyhow::Result<()> {
        for pair in pairs.split(',').filter(|p| !p.trim().is_empty()) {
            let (code, level) = pair.split_once('=').ok_or_else(|| {
                anyhow::anyhow!("Invalid level mapping '{}', expected code=level", pair)
            })?;
            let level: i16 = level
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid level in mapping '{}'", pair))?;
            self.insert(code, level);
        }
        Ok(())
    }

    pub fn lookup(&self, code: &str) -> Option<i16> {
        self.codes.get(&normalize(code)).copied()
    }

    /// Normalize a raw level cell; anything unrecognized is uncertified
    pub fn parse(&self, raw: &str) -> i16 {
        let code = normalize(raw);
        if code.is_empty() {
            return UNCERTIFIED_LEVEL;
        }
        if let Some(level) = self.codes.get(&code) {
            return *level;
        }
        numeric_level(&code).unwrap_or(UNCERTIFIED_LEVEL)
    }
}

fn normalize(code: &str) -> String {
    code.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// "2", "l2", "level 2", "lvl2"
fn numeric_level(code: &str) -> Option<i16> {
    let digits = ["level", "lvl", "l"]
        .iter()
        .find_map(|prefix| code.strip_prefix(prefix))
        .unwrap_or(code)
        .trim();

    let level: i16 = digits.parse().ok()?;
    (UNCERTIFIED_LEVEL..=MAX_CERT_LEVEL)
        .contains(&level)
        .then_some(level)
}
