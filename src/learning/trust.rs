//! # Source Trust
//!
//! Configurable classification of candidate URLs into trust tiers with
//! a confidence score in the range `[0.0, 1.0]`.
//!
//! - Loads from JSON config (domain tables + threshold).
//! - Matching proceeds by most-specific rule first: academic suffix →
//!   verified domain → reliable domain → blocked domain → general.
//! - Blocked domains are terminal: confidence 0.0, never promoted by
//!   `validate`.
//! - Includes a built-in `default_seed()` with common domains.
//!
//! Classification is pure: no network I/O happens here. Discovering
//! candidate URLs is a separate, cancellable operation.

use serde::Deserialize;
use std::{collections::HashSet, fs, path::Path, path::PathBuf};
use url::Url;

use crate::learning::types::{SourceCandidate, TrustTier};

const ENV_PATH: &str = "TRUST_CONFIG_PATH";
const DEFAULT_PATH: &str = "config/trusted_domains.json";

fn default_accept_threshold() -> f32 {
    0.6
}
fn default_general_confidence() -> f32 {
    0.6
}

/// Domain classification tables, loaded from JSON or defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct TrustConfig {
    /// Suffix matches for academic hosts, e.g. ".edu".
    #[serde(default)]
    pub academic_suffixes: Vec<String>,
    /// Exact-host matches for verified scientific/educational sites.
    #[serde(default)]
    pub verified_domains: HashSet<String>,
    /// Exact-host matches for well-known reliable sources.
    #[serde(default)]
    pub reliable_domains: HashSet<String>,
    /// Exact-host matches that are never accepted.
    #[serde(default)]
    pub blocked_domains: HashSet<String>,
    /// Candidates scoring below this are dropped by `validate`.
    #[serde(default = "default_accept_threshold")]
    pub accept_threshold: f32,
    /// Baseline confidence for unclassified hosts.
    #[serde(default = "default_general_confidence")]
    pub general_confidence: f32,
}

impl TrustConfig {
    /// Load configuration from a TOML or JSON file (by extension).
    /// Falls back to `default_seed()` on error.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(_) => return Self::default_seed(),
        };
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let parsed = if ext == "toml" {
            toml::from_str(&content).ok()
        } else {
            serde_json::from_str(&content).ok()
        };
        parsed.unwrap_or_else(Self::default_seed)
    }

    /// Load using `$TRUST_CONFIG_PATH`, then the default location,
    /// then the built-in seed.
    pub fn load_default() -> Self {
        if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from_file(pb);
            }
        }
        Self::load_from_file(DEFAULT_PATH)
    }

    /// Built-in seed with common academic, scientific, and community
    /// domains. Used as fallback if no config is found.
    pub fn default_seed() -> Self {
        let academic_suffixes = [".edu", ".ac.uk", ".ac.jp"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let mut verified_domains = HashSet::new();
        for d in [
            "arxiv.org",
            "nature.com",
            "sciencedirect.com",
            "ieee.org",
            "acm.org",
            "pubmed.ncbi.nlm.nih.gov",
        ] {
            verified_domains.insert(d.to_string());
        }

        let mut reliable_domains = HashSet::new();
        for d in [
            "stackoverflow.com",
            "stackexchange.com",
            "docs.rs",
            "developer.mozilla.org",
            "wikipedia.org",
            "en.wikipedia.org",
            "github.com",
        ] {
            reliable_domains.insert(d.to_string());
        }

        Self {
            academic_suffixes,
            verified_domains,
            reliable_domains,
            blocked_domains: HashSet::new(),
            accept_threshold: default_accept_threshold(),
            general_confidence: default_general_confidence(),
        }
    }
}

/// Scores and filters candidate URLs against a `TrustConfig`.
#[derive(Debug, Clone)]
pub struct SourceScorer {
    cfg: TrustConfig,
}

impl SourceScorer {
    pub fn new(cfg: TrustConfig) -> Self {
        Self { cfg }
    }

    pub fn from_default_config() -> Self {
        Self::new(TrustConfig::load_default())
    }

    /// Classify one URL. Deterministic for a given config; unparseable
    /// URLs score `Untrusted`/0.0.
    pub fn score(&self, raw_url: &str) -> SourceCandidate {
        let host = match Url::parse(raw_url).ok().and_then(|u| {
            u.host_str().map(|h| normalize_host(h))
        }) {
            Some(h) if !h.is_empty() => h,
            _ => {
                return SourceCandidate {
                    url: raw_url.to_string(),
                    tier: TrustTier::Untrusted,
                    confidence: 0.0,
                }
            }
        };

        let (tier, confidence) = if self
            .cfg
            .academic_suffixes
            .iter()
            .any(|suf| host.ends_with(suf.as_str()))
        {
            (TrustTier::Academic, 0.95)
        } else if self.cfg.verified_domains.contains(&host) {
            (TrustTier::Verified, 0.85)
        } else if self.cfg.reliable_domains.contains(&host) {
            (TrustTier::Reliable, 0.75)
        } else if self.cfg.blocked_domains.contains(&host) {
            (TrustTier::Untrusted, 0.0)
        } else {
            (TrustTier::General, clamp01(self.cfg.general_confidence))
        };

        SourceCandidate {
            url: raw_url.to_string(),
            tier,
            confidence,
        }
    }

    /// Score every candidate, drop anything below the acceptance
    /// threshold or below the `Reliable` tier, and return the rest
    /// sorted by descending confidence.
    pub fn validate<I, S>(&self, urls: I) -> Vec<SourceCandidate>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut accepted: Vec<SourceCandidate> = urls
            .into_iter()
            .map(|u| self.score(u.as_ref()))
            .filter(|c| c.tier.is_acceptable() && c.confidence >= self.cfg.accept_threshold)
            .collect();
        accepted.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        accepted
    }

    pub fn accept_threshold(&self) -> f32 {
        self.cfg.accept_threshold
    }
}

/// Lowercase and strip a leading `www.`.
fn normalize_host(host: &str) -> String {
    let h = host.trim().to_ascii_lowercase();
    h.strip_prefix("www.").unwrap_or(&h).to_string()
}

fn clamp01(x: f32) -> f32 {
    x.clamp(0.0, 1.0)
}
