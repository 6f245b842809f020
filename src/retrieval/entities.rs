//! Entity Extraction
//!
//! Turns a query into candidate entity strings: entities spotted by an
//! optional NER model first, then matches of a fixed catalogue of domain
//! surface patterns, deduplicated case-insensitively (first casing wins).
//!
//! Extraction is pure; the NER call happens beforehand (see
//! [`super::recognizer`]) and its spans are passed in.

use super::recognizer::RecognizedEntity;
use crate::error::RetrievalError;
use regex::Regex;
use std::collections::HashSet;

/// Built-in surface patterns (case-insensitive, matched on the raw query).
const CATALOGUE: &[&str] = &[
    // Visa types
    r"\b(?:skilled worker|health and care worker|global talent|graduate|student|visitor|family|spouse|partner|tier [1-5])\s+visas?\b",
    // Routes named without the word "visa"
    r"\b(?:skilled worker|health and care worker|global talent|innovator founder|high potential individual)\b",
    // Status
    r"\b(?:indefinite leave to remain|settlement|british citizenship)\b",
    // Documents and evidence
    r"\b(?:passports?|bank statements?|certificate of sponsorship|confirmation of acceptance for studies|cas|english language (?:tests?|certificates?|requirements?)|ielts|(?:tuberculosis|tb) test(?: certificates?)?|birth certificates?|marriage certificates?|payslips?|p60|utility bills?|biometric residence permit|brp|criminal record certificates?)\b",
    // Requirements
    r"\b(?:financial requirements?|maintenance funds|salary threshold|minimum income requirement|immigration health surcharge)\b",
];

#[derive(Debug, Clone)]
pub struct EntityExtractor {
    patterns: Vec<Regex>,
}

impl EntityExtractor {
    /// Extractor with the built-in catalogue.
    pub fn new() -> Result<Self, RetrievalError> {
        Self::with_patterns(&[])
    }

    /// Extractor with the built-in catalogue plus `extra` patterns.
    pub fn with_patterns(extra: &[String]) -> Result<Self, RetrievalError> {
        let patterns = CATALOGUE
            .iter()
            .copied()
            .chain(extra.iter().map(String::as_str))
            .map(|p| Regex::new(&format!("(?i){p}")))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Candidate entity strings for `query`, NER spans first.
    pub fn extract(&self, query: &str, recognized: &[RecognizedEntity]) -> Vec<String> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut entities: Vec<String> = Vec::new();
        let mut push = |text: &str| {
            let text = text.trim();
            if !text.is_empty() && seen.insert(text.to_lowercase()) {
                entities.push(text.to_string());
            }
        };

        for entity in recognized {
            push(&entity.text);
        }
        for span in self.pattern_spans(query) {
            push(&query[span.0..span.1]);
        }
        entities
    }

    /// Non-overlapping pattern matches in query order; at one position the
    /// longest match wins.
    fn pattern_spans(&self, query: &str) -> Vec<(usize, usize)> {
        let mut spans: Vec<(usize, usize)> = self
            .patterns
            .iter()
            .flat_map(|re| re.find_iter(query).map(|m| (m.start(), m.end())))
            .collect();
        spans.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(&a.1)));

        let mut accepted: Vec<(usize, usize)> = Vec::new();
        for span in spans {
            if accepted.last().is_some_and(|last| span.0 < last.1) {
                continue;
            }
            accepted.push(span);
        }
        accepted
    }
}
