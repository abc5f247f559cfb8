// SPDX-License-Identifier: GPL-3.0-or-later

//! Token-overlap similarity between free-form track descriptions and the
//! matcher that picks the best destination candidate for a source track.

use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;
use tunebridge_config::DEFAULT_MATCH_THRESHOLD;
use tunebridge_domain::{CandidateTrack, SourceTrack};

/// Words that describe a release rather than identify a song. Removed by
/// substring, in this order.
const STOP_WORDS: &[&str] = &[
    "feat",
    "ft",
    "remix",
    "original mix",
    "official video",
    "official audio",
    "music video",
    "lyrics",
    "lyric video",
    "official music video",
    "full video",
    "hd",
    "hq",
    "4k",
    "mv",
    "official",
    "live",
    "performance",
];

const SEPARATORS: &[char] = &[
    '(', ')', '[', ']', '{', '}', '-', '_', ',', '.', '&', '|', '/', '\\', '"', '\'',
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatchingError {
    #[error("match threshold {0} is outside 0..=100")]
    InvalidThreshold(u8),
}

/// Lowercase, replace punctuation and separators with spaces, drop stop
/// words, and collapse runs of whitespace.
pub fn normalize(raw: &str) -> String {
    let mut text: String = raw
        .to_lowercase()
        .chars()
        .map(|c| if SEPARATORS.contains(&c) { ' ' } else { c })
        .collect();

    for word in STOP_WORDS {
        text = text.replace(word, " ");
    }

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Confidence (0-100) that two descriptions name the same track.
///
/// Counts tokens of `a` present in the token set of `b` and divides by the
/// shorter token list, so extra descriptive words on one side do not
/// penalize a match. Not symmetric.
pub fn score(a: &str, b: &str) -> u8 {
    let left = normalize(a);
    let right = normalize(b);
    let left_tokens: Vec<&str> = left.split_whitespace().collect();
    let right_tokens: Vec<&str> = right.split_whitespace().collect();

    if left_tokens.is_empty() || right_tokens.is_empty() {
        return 0;
    }

    let right_set: HashSet<&str> = right_tokens.iter().copied().collect();
    let common = left_tokens
        .iter()
        .filter(|token| right_set.contains(*token))
        .count();
    let shorter = left_tokens.len().min(right_tokens.len());

    (common * 100 / shorter).min(100) as u8
}

/// Truncate at the first `(`, `[`, `" - "` or `,` and trim.
pub fn clean_metadata(raw: &str) -> String {
    let mut value = raw;
    for marker in ["(", "[", " - ", ","] {
        if let Some(idx) = value.find(marker) {
            value = &value[..idx];
        }
    }
    value.trim().to_string()
}

/// Outcome of matching one source track. `candidate` is set only when
/// `score` cleared the threshold; `score` is always the best observed.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub candidate: Option<CandidateTrack>,
    pub score: u8,
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        self.candidate.is_some()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TrackMatcher {
    threshold: u8,
}

impl Default for TrackMatcher {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

impl TrackMatcher {
    /// `threshold` is the minimum score, 0..=100, a candidate needs to match.
    pub fn new(threshold: u8) -> Result<Self, MatchingError> {
        if threshold > 100 {
            return Err(MatchingError::InvalidThreshold(threshold));
        }
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Pick the best-scoring candidate. The first maximum wins on ties and a
    /// candidate scoring zero is never selected.
    pub fn find_match(&self, source: &SourceTrack, candidates: &[CandidateTrack]) -> MatchResult {
        let wanted = format!("{} {}", source.artist, source.title);

        let mut best: Option<&CandidateTrack> = None;
        let mut best_score = 0u8;
        for candidate in candidates {
            let candidate_score = score(&wanted, &format!("{} {}", candidate.artist, candidate.title));
            if candidate_score > best_score {
                best = Some(candidate);
                best_score = candidate_score;
            }
        }

        debug!(
            target: "matching",
            source = %wanted,
            candidates = candidates.len(),
            score = best_score,
            threshold = self.threshold,
            "scored candidates"
        );

        MatchResult {
            candidate: best
                .filter(|_| best_score >= self.threshold)
                .cloned(),
            score: best_score,
        }
    }
}
