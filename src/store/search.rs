use chrono::{DateTime, Local, TimeZone, Utc};
use diesel::Connection;
use ordered_float::OrderedFloat;
use serde::Serialize;
use std::fmt;

use super::{Error, Store};
use crate::cluster::WILDCARD;
use crate::database;
use crate::embed::{dot, embed_checked};

pub const EMPTY_STORE_MESSAGE: &str = "No logs indexed yet.";

const HIGHLIGHT_ON: &str = "\x1b[1;33m";
const HIGHLIGHT_OFF: &str = "\x1b[0m";

#[derive(Clone, Debug, PartialEq)]
pub enum Segment {
    Literal(String),
    Param(String),
}

/// A template with an occurrence's parameters substituted in.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Hydrated {
    segments: Vec<Segment>,
}

impl Hydrated {
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Plain text, as fed to the embedder.
    #[must_use]
    pub fn text(&self) -> String {
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Literal(s) | Segment::Param(s) => s.as_str(),
            })
            .collect()
    }

    /// Text with parameters in bold yellow.
    #[must_use]
    pub fn highlighted(&self) -> String {
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Literal(s) => s.clone(),
                Segment::Param(p) => format!("{}{}{}", HIGHLIGHT_ON, p, HIGHLIGHT_OFF),
            })
            .collect()
    }
}

/// Substitutes `params` into the wildcards of `template` in order.
/// Parameters left over are appended after a space; wildcards left over
/// stay as they are.
#[must_use]
pub fn hydrate(template: &str, params: &[String]) -> Hydrated {
    let mut segments = Vec::new();
    let mut params = params.iter();
    let mut pieces = template.split(WILDCARD).peekable();
    while let Some(piece) = pieces.next() {
        if !piece.is_empty() {
            segments.push(Segment::Literal(piece.to_string()));
        }
        if pieces.peek().is_none() {
            break;
        }
        match params.next() {
            Some(p) => segments.push(Segment::Param(p.clone())),
            None => segments.push(Segment::Literal(WILDCARD.to_string())),
        }
    }
    for p in params {
        segments.push(Segment::Literal(" ".to_string()));
        segments.push(Segment::Param(p.clone()));
    }
    Hydrated { segments }
}

#[derive(Clone, Debug, Serialize)]
pub struct SearchHit {
    pub score: f32,
    pub template_id: i32,
    pub template: String,
    /// Time of the template's most recent occurrence.
    pub timestamp: DateTime<Local>,
    pub text: String,
    #[serde(skip)]
    pub hydrated: Hydrated,
}

impl fmt::Display for SearchHit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[Score:{:.2}] {} | {}",
            self.score,
            self.timestamp.format("%H:%M:%S%.3f"),
            self.hydrated.highlighted()
        )
    }
}

#[derive(Clone, Debug)]
pub enum SearchOutcome {
    /// Nothing has been indexed in this category yet.
    Empty,
    Hits(Vec<SearchHit>),
}

impl SearchOutcome {
    #[must_use]
    pub fn hits(&self) -> &[SearchHit] {
        match self {
            Self::Empty => &[],
            Self::Hits(hits) => hits,
        }
    }
}

struct Candidate {
    template_id: i32,
    template: String,
    timestamp: DateTime<Local>,
    hydrated: Hydrated,
}

impl Store {
    /// Finds the `k` templates closest to `query`.
    ///
    /// A coarse scan over the template vectors keeps the best
    /// `coarse_candidates`; each is hydrated with its latest occurrence and
    /// re-scored against the query. With `recency_bias`, hits scoring below
    /// the relevance floor are dropped and the rest are ordered newest
    /// first; otherwise they are ordered by score.
    ///
    /// # Errors
    ///
    /// Returns an error if `query` has the wrong dimension, or if the files
    /// or the embedder fail.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        recency_bias: bool,
    ) -> Result<SearchOutcome, Error> {
        // another process may have appended since this store was opened
        if self.vectors.len()? == 0 {
            return Ok(SearchOutcome::Empty);
        }
        if query.len() != self.dimension {
            return Err(Error::Dimension {
                expected: self.dimension,
                found: query.len(),
            });
        }

        let mut scores = self.vectors.scores(query)?;
        let n = self.options.coarse_candidates.min(scores.len());
        if n == 0 {
            return Ok(SearchOutcome::Hits(Vec::new()));
        }
        if n < scores.len() {
            scores.select_nth_unstable_by(n - 1, |a, b| OrderedFloat(b.1).cmp(&OrderedFloat(a.1)));
            scores.truncate(n);
        }

        let candidates = self.hydrate_candidates(&scores)?;
        if candidates.is_empty() {
            return Ok(SearchOutcome::Hits(Vec::new()));
        }
        let texts: Vec<String> = candidates.iter().map(|c| c.hydrated.text()).collect();
        let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let vectors = embed_checked(self.embedder.as_ref(), &text_refs, self.dimension)?;

        let mut hits: Vec<SearchHit> = candidates
            .into_iter()
            .zip(texts)
            .zip(&vectors)
            .map(|((c, text), v)| SearchHit {
                score: dot(query, v),
                template_id: c.template_id,
                template: c.template,
                timestamp: c.timestamp,
                text,
                hydrated: c.hydrated,
            })
            .collect();
        if recency_bias {
            let floor = self.options.relevance_floor;
            hits.retain(|h| h.score >= floor);
            hits.sort_by(|a, b| {
                b.timestamp
                    .cmp(&a.timestamp)
                    .then_with(|| OrderedFloat(b.score).cmp(&OrderedFloat(a.score)))
            });
        } else {
            hits.sort_by(|a, b| OrderedFloat(b.score).cmp(&OrderedFloat(a.score)));
        }
        hits.truncate(k);
        Ok(SearchOutcome::Hits(hits))
    }

    /// Embeds `text` and searches with it.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding or the search fails.
    pub fn search_text(
        &self,
        text: &str,
        k: usize,
        recency_bias: bool,
    ) -> Result<SearchOutcome, Error> {
        let query = embed_checked(self.embedder.as_ref(), &[text], self.dimension)?;
        match query.first() {
            Some(query) => self.search(query, k, recency_bias),
            None => Ok(SearchOutcome::Hits(Vec::new())),
        }
    }

    fn hydrate_candidates(&self, scores: &[(u64, f32)]) -> Result<Vec<Candidate>, Error> {
        let conn = self.pool.get()?;
        conn.transaction::<_, Error, _>(|| {
            let mut candidates = Vec::with_capacity(scores.len());
            for &(index, _) in scores {
                let template = match database::template_at(&conn, index as i64)? {
                    Some(template) => template,
                    None => continue,
                };
                let (occurrence, micros) =
                    match database::latest_occurrence(&conn, template.id)? {
                        Some(latest) => latest,
                        None => continue,
                    };
                let timestamp = match local_time(micros) {
                    Some(t) => t,
                    None => continue,
                };
                let params = database::parameters_of(&conn, occurrence)?;
                candidates.push(Candidate {
                    template_id: template.id,
                    hydrated: hydrate(&template.text, &params),
                    template: template.text,
                    timestamp,
                });
            }
            Ok(candidates)
        })
    }
}

fn local_time(micros: i64) -> Option<DateTime<Local>> {
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    Utc.timestamp_opt(secs, nanos)
        .single()
        .map(|t| t.with_timezone(&Local))
}
