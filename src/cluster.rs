//! Online clustering of log messages into templates.
//!
//! Every message is split on whitespace and compared with the clusters that
//! have the same number of tokens. The similarity of a message to a cluster
//! is the fraction of positions where the cluster holds the same literal
//! token; wildcard positions do not count as matches. The best cluster is
//! chosen by similarity, then by number of wildcards, then by age. If its
//! similarity reaches the threshold the message joins it, and every position
//! where the two disagree becomes a wildcard for good. Otherwise the message
//! starts a new cluster with its own tokens as the template.

use regex::Regex;
use std::collections::HashMap;
use std::convert::TryFrom;

/// Placeholder for a variable token in a template.
pub const WILDCARD: &str = "<*>";

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.4;

/// Compiled patterns kept before the extractor starts over.
const MAX_CACHED_PATTERNS: usize = 4096;

pub type ClusterId = u64;

#[derive(Clone, Debug, PartialEq)]
pub struct Cluster {
    id: ClusterId,
    tokens: Vec<String>,
    size: u64,
}

impl Cluster {
    #[must_use]
    pub fn id(&self) -> ClusterId {
        self.id
    }

    /// Number of messages merged into this cluster.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub fn template(&self) -> String {
        self.tokens.join(" ")
    }

    fn wildcards(&self) -> usize {
        self.tokens.iter().filter(|t| *t == WILDCARD).count()
    }

    fn similarity(&self, tokens: &[&str]) -> f64 {
        if self.tokens.is_empty() {
            return 1.0;
        }
        let matching = self
            .tokens
            .iter()
            .zip(tokens)
            .filter(|(t, r)| t.as_str() != WILDCARD && t.as_str() == **r)
            .count();
        matching as f64 / self.tokens.len() as f64
    }

    /// Merges a message of the same length. Returns whether the template
    /// changed.
    fn absorb(&mut self, tokens: &[&str]) -> bool {
        let mut changed = false;
        for (t, r) in self.tokens.iter_mut().zip(tokens) {
            if t.as_str() != WILDCARD && t.as_str() != *r {
                *t = WILDCARD.to_string();
                changed = true;
            }
        }
        self.size += 1;
        changed
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Change {
    Created,
    Generalized,
    Unchanged,
}

/// Result of mining one message.
#[derive(Clone, Debug, PartialEq)]
pub struct Mined {
    pub cluster_id: ClusterId,
    pub change: Change,
    pub template: String,
}

#[derive(Debug)]
pub struct TemplateMiner {
    threshold: f64,
    clusters: Vec<Cluster>,
    by_length: HashMap<usize, Vec<usize>>,
}

impl Default for TemplateMiner {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl TemplateMiner {
    #[must_use]
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            clusters: Vec::new(),
            by_length: HashMap::new(),
        }
    }

    pub fn add(&mut self, message: &str) -> Mined {
        let tokens = message.split_whitespace().collect::<Vec<_>>();
        if let Some(pos) = self.best_match(&tokens) {
            let cluster = &mut self.clusters[pos];
            let change = if cluster.absorb(&tokens) {
                Change::Generalized
            } else {
                Change::Unchanged
            };
            return Mined {
                cluster_id: cluster.id,
                change,
                template: cluster.template(),
            };
        }

        let cluster = Cluster {
            id: self.clusters.len() as ClusterId + 1,
            tokens: tokens.iter().map(|t| (*t).to_string()).collect(),
            size: 1,
        };
        let mined = Mined {
            cluster_id: cluster.id,
            change: Change::Created,
            template: cluster.template(),
        };
        self.by_length
            .entry(tokens.len())
            .or_insert_with(Vec::new)
            .push(self.clusters.len());
        self.clusters.push(cluster);
        mined
    }

    fn best_match(&self, tokens: &[&str]) -> Option<usize> {
        let mut best: Option<(usize, f64, usize)> = None;
        for &pos in self.by_length.get(&tokens.len())? {
            let cluster = &self.clusters[pos];
            let similarity = cluster.similarity(tokens);
            if similarity < self.threshold {
                continue;
            }
            let wildcards = cluster.wildcards();
            let better = match best {
                None => true,
                Some((_, s, w)) => similarity > s || (similarity == s && wildcards > w),
            };
            if better {
                best = Some((pos, similarity, wildcards));
            }
        }
        best.map(|(pos, _, _)| pos)
    }

    #[must_use]
    pub fn cluster(&self, id: ClusterId) -> Option<&Cluster> {
        let pos = usize::try_from(id).ok()?.checked_sub(1)?;
        self.clusters.get(pos)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

/// Recovers the values a message substituted for a template's wildcards.
#[derive(Debug, Default)]
pub struct ParamExtractor {
    patterns: HashMap<String, Option<Regex>>,
}

impl ParamExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Matches `message` against `template` with every wildcard as a greedy
    /// capture. When the pattern does not match, falls back to comparing
    /// tokens position by position, which only works if both have the same
    /// token count and yields nothing otherwise.
    pub fn extract(&mut self, template: &str, message: &str) -> Vec<String> {
        if !template.contains(WILDCARD) {
            return Vec::new();
        }
        if self.patterns.len() >= MAX_CACHED_PATTERNS && !self.patterns.contains_key(template) {
            self.patterns.clear();
        }
        let pattern = self
            .patterns
            .entry(template.to_string())
            .or_insert_with(|| compile_pattern(template));

        if let Some(captures) = pattern.as_ref().and_then(|p| p.captures(message.trim())) {
            return captures
                .iter()
                .skip(1)
                .map(|c| c.map_or("", |m| m.as_str()).trim().to_string())
                .collect();
        }
        diff_tokens(template, message)
    }
}

fn compile_pattern(template: &str) -> Option<Regex> {
    let body = template
        .split_whitespace()
        .map(|token| {
            token
                .split(WILDCARD)
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join("(.*)")
        })
        .collect::<Vec<_>>()
        .join(r"\s+");
    Regex::new(&format!("^{}$", body)).ok()
}

fn diff_tokens(template: &str, message: &str) -> Vec<String> {
    let template = template.split_whitespace().collect::<Vec<_>>();
    let message = message.split_whitespace().collect::<Vec<_>>();
    if template.len() != message.len() {
        return Vec::new();
    }
    template
        .iter()
        .zip(&message)
        .filter(|(t, r)| t != r)
        .map(|(_, r)| (*r).to_string())
        .collect()
}
