//! Resolves a product category from free chat text.
//!
//! The vocabulary is the set of category, subcategory and product names seen
//! in the purchase history. Resolution runs in two fixed stages:
//!
//! 1. **Exact term**: a vocabulary name whose tokens appear contiguously in
//!    the query. The longest match wins, then the most specific field
//!    (product, subcategory, category). Two different names tied at the top
//!    are ambiguous.
//! 2. **Keyword**: a single query token that occurs as a token inside any
//!    vocabulary name scopes to every record carrying that token. Two or more
//!    such tokens are ambiguous.
//!
//! Anything else fails with [`DomainError::AmbiguousQuery`].

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::domain::normalize_key;
use crate::domain::purchase::PurchaseRecord;
use crate::errors::DomainError;

const STOPWORDS: &[&str] = &[
    "a", "about", "an", "and", "any", "are", "best", "brand", "buy", "can", "do", "for", "good",
    "give", "have", "i", "in", "is", "me", "my", "of", "on", "or", "please", "product", "recommend",
    "recommendation", "should", "show", "some", "suggest", "suggestion", "that", "the", "to",
    "top", "try", "what", "which", "with", "you",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryField {
    ProductName,
    Subcategory,
    Category,
}

impl CategoryField {
    fn value_of<'a>(&self, record: &'a PurchaseRecord) -> &'a str {
        match self {
            Self::ProductName => &record.product_name,
            Self::Subcategory => &record.subcategory,
            Self::Category => &record.category,
        }
    }
}

/// Record filter produced by category resolution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CategoryScope {
    /// Records whose `field` equals `value` (case-insensitive).
    Exact { field: CategoryField, value: String },
    /// Records whose product, subcategory or category name contains the token.
    Keyword { keyword: String },
}

impl CategoryScope {
    pub fn label(&self) -> &str {
        match self {
            Self::Exact { value, .. } => value,
            Self::Keyword { keyword } => keyword,
        }
    }

    pub fn matches(&self, record: &PurchaseRecord) -> bool {
        match self {
            Self::Exact { field, value } => {
                normalize_key(field.value_of(record)) == normalize_key(value)
            }
            Self::Keyword { keyword } => {
                [CategoryField::ProductName, CategoryField::Subcategory, CategoryField::Category]
                    .iter()
                    .any(|field| tokenize(field.value_of(record)).iter().any(|t| t == keyword))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct VocabularyTerm {
    tokens: Vec<String>,
    field: CategoryField,
    display: String,
}

#[derive(Clone, Debug, Default)]
pub struct CategoryResolver {
    terms: Vec<VocabularyTerm>,
}

impl CategoryResolver {
    pub fn from_records(records: &[PurchaseRecord]) -> Self {
        let mut seen = BTreeMap::new();
        for record in records {
            for field in
                [CategoryField::ProductName, CategoryField::Subcategory, CategoryField::Category]
            {
                let display = field.value_of(record).trim();
                if display.is_empty() {
                    continue;
                }
                seen.entry((field, normalize_key(display))).or_insert_with(|| display.to_string());
            }
        }

        let terms = seen
            .into_iter()
            .filter_map(|((field, key), display)| {
                let tokens = tokenize(&key);
                (!tokens.is_empty()).then_some(VocabularyTerm { tokens, field, display })
            })
            .collect();

        Self { terms }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn resolve(&self, query: &str) -> Result<CategoryScope, DomainError> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return Err(ambiguous(query, Vec::new()));
        }

        if let Some(scope) = self.resolve_exact(query, &query_tokens)? {
            return Ok(scope);
        }

        self.resolve_keyword(query, &query_tokens)
    }

    fn resolve_exact(
        &self,
        query: &str,
        query_tokens: &[String],
    ) -> Result<Option<CategoryScope>, DomainError> {
        let mut matches = self
            .terms
            .iter()
            .filter(|term| contains_run(query_tokens, &term.tokens))
            .collect::<Vec<_>>();
        if matches.is_empty() {
            return Ok(None);
        }

        matches.sort_by(|left, right| {
            right.tokens.len().cmp(&left.tokens.len()).then(left.field.cmp(&right.field))
        });
        let best = matches[0];
        let tied = matches
            .iter()
            .filter(|term| term.tokens.len() == best.tokens.len() && term.field == best.field)
            .map(|term| term.display.clone())
            .collect::<BTreeSet<_>>();

        if tied.len() > 1 {
            return Err(ambiguous(query, tied.into_iter().collect()));
        }

        Ok(Some(CategoryScope::Exact { field: best.field, value: best.display.clone() }))
    }

    fn resolve_keyword(
        &self,
        query: &str,
        query_tokens: &[String],
    ) -> Result<CategoryScope, DomainError> {
        let keywords = query_tokens
            .iter()
            .filter(|token| token.len() > 2 && !STOPWORDS.contains(&token.as_str()))
            .filter(|token| self.terms.iter().any(|term| term.tokens.contains(token)))
            .cloned()
            .collect::<BTreeSet<_>>();

        match keywords.len() {
            1 => {
                let keyword = keywords.into_iter().next().unwrap_or_default();
                Ok(CategoryScope::Keyword { keyword })
            }
            0 => Err(ambiguous(query, Vec::new())),
            _ => Err(ambiguous(query, keywords.into_iter().collect())),
        }
    }
}

fn ambiguous(query: &str, candidates: Vec<String>) -> DomainError {
    DomainError::AmbiguousQuery { query: query.trim().to_string(), candidates }
}

fn contains_run(haystack: &[String], needle: &[String]) -> bool {
    !needle.is_empty()
        && haystack.len() >= needle.len()
        && haystack.windows(needle.len()).any(|window| window == needle)
}

/// Lowercase alphanumeric tokens with a naive plural fold (`shampoos` ->
/// `shampoo`, `glass` unchanged).
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|character: char| !character.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(singular)
        .collect()
}

fn singular(token: &str) -> String {
    if token.len() > 3 && token.ends_with('s') && !token.ends_with("ss") {
        token[..token.len() - 1].to_string()
    } else {
        token.to_string()
    }
}
