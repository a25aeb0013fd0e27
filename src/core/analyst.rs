//! Scores a [`Document`] against a [`TermSet`].
//!
//! Matching walks the tokens of each text segment and, at every position,
//! tries the longest window first. A match consumes its tokens, so a shorter
//! term contained in a longer matched phrase is never counted again.
//! Phrases do not span segments.

use crate::core::terms::TermSet;
use crate::core::text::tokenize_from;
use crate::domain::model::{AnalysisResult, Classification, Document, TermEntry, TermMatch};
use crate::utils::error::AnalysisError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;

/// Which parts of a document are analyzed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextScope {
    /// Extracted text blocks.
    #[default]
    Body,
    /// Title, meta description and meta keywords.
    TitleAndMeta,
    /// Title and meta followed by the text blocks.
    Full,
}

impl FromStr for TextScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "body" => Ok(TextScope::Body),
            "title_and_meta" | "meta" => Ok(TextScope::TitleAndMeta),
            "full" => Ok(TextScope::Full),
            other => Err(format!(
                "unknown scope '{}', expected body, title_and_meta or full",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnalysisOptions {
    pub scope: TextScope,
}

#[derive(Debug, Clone, Default)]
pub struct Analyst {
    options: AnalysisOptions,
}

#[derive(Default)]
struct Tally {
    matches: Vec<TermMatch>,
    index: HashMap<String, usize>,
    score: f64,
    by_category: BTreeMap<String, f64>,
    by_theme: BTreeMap<(String, Option<String>), f64>,
}

impl Tally {
    fn record(&mut self, entry: &TermEntry, position: usize) {
        self.score += entry.weight;
        if let Some(category) = &entry.category {
            *self.by_category.entry(category.clone()).or_insert(0.0) += entry.weight;
            *self
                .by_theme
                .entry((category.clone(), entry.theme.clone()))
                .or_insert(0.0) += entry.weight;
        }

        match self.index.get(&entry.term) {
            Some(&i) => self.matches[i].positions.push(position),
            None => {
                self.index.insert(entry.term.clone(), self.matches.len());
                self.matches.push(TermMatch {
                    term: entry.term.clone(),
                    category: entry.category.clone(),
                    theme: entry.theme.clone(),
                    weight: entry.weight,
                    positions: vec![position],
                });
            }
        }
    }

    /// Highest positive (category, theme) subtotal; the first in key order wins ties.
    fn classification(&self) -> Option<Classification> {
        let mut best: Option<(&(String, Option<String>), f64)> = None;
        for (key, &score) in &self.by_theme {
            if score > 0.0 && best.map_or(true, |(_, s)| score > s) {
                best = Some((key, score));
            }
        }
        best.map(|((category, theme), score)| Classification {
            category: category.clone(),
            theme: theme.clone(),
            score,
        })
    }
}

impl Analyst {
    pub fn new(options: AnalysisOptions) -> Self {
        Self { options }
    }

    pub fn scope(&self) -> TextScope {
        self.options.scope
    }

    pub fn analyze(
        &self,
        document: Arc<Document>,
        terms: &TermSet,
    ) -> Result<AnalysisResult, AnalysisError> {
        if terms.is_empty() {
            return Err(AnalysisError::NoTerms);
        }

        let window = terms.max_phrase_tokens().max(1);
        let mut tally = Tally::default();
        let mut token_count = 0;
        let mut base = 0;
        let mut key = String::new();

        for segment in segments(&document, self.options.scope) {
            let tokens = tokenize_from(segment, base);
            let Some(last) = tokens.last() else {
                continue;
            };
            base = last.end() + 1;
            token_count += tokens.len();

            let mut i = 0;
            while i < tokens.len() {
                let longest = window.min(tokens.len() - i);
                let mut consumed = 1;
                for len in (1..=longest).rev() {
                    key.clear();
                    for (n, token) in tokens[i..i + len].iter().enumerate() {
                        if n > 0 {
                            key.push(' ');
                        }
                        key.push_str(&token.text);
                    }
                    if let Some(entry) = terms.get_normalized(&key) {
                        tally.record(entry, tokens[i].offset);
                        consumed = len;
                        break;
                    }
                }
                i += consumed;
            }
        }

        tracing::debug!(
            "Analyzed {} token(s): {} distinct match(es), score {}",
            token_count,
            tally.matches.len(),
            tally.score
        );

        let classification = tally.classification();
        Ok(AnalysisResult {
            document,
            matches: tally.matches,
            score: tally.score,
            score_by_category: tally.by_category,
            classification,
            token_count,
            termset_version: terms.version(),
        })
    }
}

fn segments(document: &Document, scope: TextScope) -> Vec<&str> {
    let header = || {
        [
            document.title.as_deref(),
            document.meta.description.as_deref(),
            document.meta.keywords.as_deref(),
        ]
        .into_iter()
        .flatten()
    };
    let body = || document.text_blocks.iter().map(String::as_str);

    match scope {
        TextScope::Body => body().collect(),
        TextScope::TitleAndMeta => header().collect(),
        TextScope::Full => header().chain(body()).collect(),
    }
}
