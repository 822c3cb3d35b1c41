//! Resource matching
//!
//! - [`rank`] drives the interactive picker: a fuzzy subsequence match over
//!   `"<name> :: <id>"`, best score first
//! - [`quick_search`] drives the HTTP API: a plain substring match over
//!   projects and EC2 instances only

use crate::model::{Resource, ServiceKind};

const MATCH_BONUS: i64 = 1;
const CONTIGUOUS_BONUS: i64 = 5;
const WORD_START_BONUS: i64 = 8;
/// Upper bound of the penalty for characters skipped before the first match
const MAX_LEADING_GAP_PENALTY: i64 = 15;

/// Text the fuzzy matcher runs against
pub fn candidate_text(res: &Resource) -> String {
    format!("{} :: {}", res.name, res.id)
}

/// Score `query` against `candidate`, or `None` when the query characters
/// do not all appear in order. An empty query matches everything with 0.
pub fn fuzzy_score(candidate: &str, query: &str) -> Option<i64> {
    let query: Vec<char> = query.chars().flat_map(char::to_lowercase).collect();
    if query.is_empty() {
        return Some(0);
    }

    let mut score = 0;
    let mut next = 0;
    let mut prev_matched = false;
    let mut prev_char: Option<char> = None;
    let mut leading_gap: i64 = 0;

    for c in candidate.chars().flat_map(char::to_lowercase) {
        if next < query.len() && c == query[next] {
            if next == 0 {
                score -= leading_gap.min(MAX_LEADING_GAP_PENALTY);
            }
            score += MATCH_BONUS;
            if prev_matched {
                score += CONTIGUOUS_BONUS;
            }
            if prev_char.map_or(true, |p| !p.is_alphanumeric()) {
                score += WORD_START_BONUS;
            }
            next += 1;
            prev_matched = true;
        } else {
            if next == 0 {
                leading_gap += 1;
            }
            prev_matched = false;
        }
        prev_char = Some(c);
    }

    (next == query.len()).then_some(score)
}

/// A record with its score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ranked<'a> {
    pub resource: &'a Resource,
    pub score: i64,
}

/// Matching records, highest score first; ties keep snapshot order
pub fn rank<'a>(records: &'a [Resource], query: &str) -> Vec<Ranked<'a>> {
    let mut ranked: Vec<Ranked<'a>> = records
        .iter()
        .filter_map(|res| {
            fuzzy_score(&candidate_text(res), query).map(|score| Ranked { resource: res, score })
        })
        .collect();

    // sort_by is stable
    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    ranked
}

/// Projects and EC2 instances whose `"<name> <id>"` contains `query`,
/// ignoring case. An empty query returns nothing.
pub fn quick_search(records: &[Resource], query: &str) -> Vec<Resource> {
    if query.is_empty() {
        return Vec::new();
    }
    let needle = query.to_lowercase();

    records
        .iter()
        .filter(|res| matches!(res.service, ServiceKind::Project | ServiceKind::Ec2))
        .filter(|res| format!("{} {}", res.name, res.id).to_lowercase().contains(&needle))
        .cloned()
        .collect()
}
