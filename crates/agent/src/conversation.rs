//! Chat intent classification and product keyword extraction.

use serde::Serialize;

const RESTOCK_PHRASES: &[&str] =
    &["restock", "restocking", "restocked", "need to restock", "restock status"];
const OVERCONSUMPTION_PHRASES: &[&str] = &["too much", "excessive", "overconsumption"];
const MOST_PURCHASED_PHRASES: &[&str] = &["bought the most", "purchased the most", "top purchases"];
const QUANTITY_PHRASES: &[&str] = &["number of", "how much", "quantity"];
const SUGGEST_WORDS: &[&str] = &["suggest", "recommend", "recommendation", "brand", "brands", "best"];

/// Markers whose following words name the product being asked about, tried
/// in order.
const PRODUCT_MARKERS: &[&[&str]] = &[
    &["too", "much"],
    &["number", "of"],
    &["bought", "the", "most"],
    &["quantity", "of"],
    &["how", "much"],
    &["consumed"],
    &["purchased"],
    &["having"],
    &["consuming"],
    &["buying"],
    &["purchasing"],
    &["about"],
    &["for"],
];

/// Words preceding these name the product (`cola consumption`).
const PRODUCT_SUFFIXES: &[&str] = &["consumption", "usage", "intake"];

/// Filler trimmed from either end of an extracted product phrase.
const FILLER_WORDS: &[&str] = &[
    "a", "am", "an", "any", "did", "do", "have", "i", "is", "it", "me", "my", "of", "that",
    "the", "this", "what", "bought", "purchased", "consumed", "been", "having", "lately",
    "recently", "now", "so", "far", "too", "much", "many", "there",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageKind {
    Overconsumption,
    MostPurchased,
    Quantity,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum ChatIntent {
    RestockCheck,
    UsageAnalysis { kind: UsageKind, product: Option<String> },
    /// Free-form question for the AI capability, wake word removed.
    AssistantQuestion { question: String, product: Option<String> },
    BrandSuggestion,
    General,
}

impl ChatIntent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RestockCheck => "restock_check",
            Self::UsageAnalysis { .. } => "usage_analysis",
            Self::AssistantQuestion { .. } => "assistant_question",
            Self::BrandSuggestion => "brand_suggestion",
            Self::General => "general",
        }
    }
}

#[derive(Clone, Debug)]
pub struct IntentClassifier {
    wake_word: String,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new("walmart")
    }
}

impl IntentClassifier {
    pub fn new(wake_word: impl Into<String>) -> Self {
        Self { wake_word: wake_word.into().trim().to_lowercase() }
    }

    pub fn wake_word(&self) -> &str {
        &self.wake_word
    }

    /// Classifies in fixed priority order: restock, usage analysis, wake-word
    /// question, brand suggestion, general help.
    pub fn classify(&self, query: &str) -> ChatIntent {
        let normalized = normalize_text(query);
        if normalized.is_empty() {
            return ChatIntent::General;
        }
        let tokens = tokenize(&normalized);

        if contains_any(&normalized, RESTOCK_PHRASES) {
            return ChatIntent::RestockCheck;
        }

        if let Some(kind) = usage_kind(&normalized) {
            let product = match kind {
                UsageKind::MostPurchased => None,
                UsageKind::Overconsumption | UsageKind::Quantity => extract_product(&tokens),
            };
            return ChatIntent::UsageAnalysis { kind, product };
        }

        if !self.wake_word.is_empty() && tokens.iter().any(|token| self.is_wake_word(token)) {
            let remaining = tokens
                .iter()
                .filter(|token| !self.is_wake_word(token))
                .cloned()
                .collect::<Vec<_>>();
            return ChatIntent::AssistantQuestion {
                question: remaining.join(" "),
                product: extract_product(&remaining),
            };
        }

        if tokens.iter().any(|token| SUGGEST_WORDS.contains(&token.as_str())) {
            return ChatIntent::BrandSuggestion;
        }

        ChatIntent::General
    }

    /// The wake word itself or its possessive form.
    fn is_wake_word(&self, token: &str) -> bool {
        token == self.wake_word || token.strip_suffix("'s") == Some(self.wake_word.as_str())
    }
}

fn usage_kind(normalized: &str) -> Option<UsageKind> {
    if contains_any(normalized, OVERCONSUMPTION_PHRASES) {
        Some(UsageKind::Overconsumption)
    } else if contains_any(normalized, MOST_PURCHASED_PHRASES) {
        Some(UsageKind::MostPurchased)
    } else if contains_any(normalized, QUANTITY_PHRASES) {
        Some(UsageKind::Quantity)
    } else {
        None
    }
}

/// Product phrase named in a tokenized query, if any.
pub fn extract_product(tokens: &[String]) -> Option<String> {
    for marker in PRODUCT_MARKERS {
        if let Some(position) = find_run(tokens, marker) {
            let phrase = trim_filler(&tokens[position + marker.len()..]);
            if let Some(product) = phrase {
                return Some(product);
            }
        }
    }

    for (index, token) in tokens.iter().enumerate() {
        if index > 0 && PRODUCT_SUFFIXES.contains(&token.as_str()) {
            let previous = &tokens[index - 1];
            if previous.len() > 1 && !FILLER_WORDS.contains(&previous.as_str()) {
                return Some(previous.clone());
            }
        }
    }

    None
}

fn trim_filler(words: &[String]) -> Option<String> {
    let start = words.iter().position(|word| !FILLER_WORDS.contains(&word.as_str()))?;
    let end = words.iter().rposition(|word| !FILLER_WORDS.contains(&word.as_str()))?;
    let phrase = words[start..=end].join(" ");
    (phrase.len() > 1).then_some(phrase)
}

fn find_run(tokens: &[String], marker: &[&str]) -> Option<usize> {
    if marker.is_empty() || tokens.len() < marker.len() {
        return None;
    }
    tokens.windows(marker.len()).position(|window| {
        window.iter().zip(marker.iter()).all(|(token, expected)| token == expected)
    })
}

fn contains_any(normalized: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|phrase| normalized.contains(phrase))
}

pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().map(str::to_lowercase).collect::<Vec<_>>().join(" ")
}

fn tokenize(text: &str) -> Vec<String> {
    text.replace('\u{2019}', "'")
        .split(|character: char| !(character.is_alphanumeric() || character == '\''))
        .map(|token| token.trim_matches('\''))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{extract_product, tokenize, ChatIntent, IntentClassifier, UsageKind};

    fn classify(query: &str) -> ChatIntent {
        IntentClassifier::default().classify(query)
    }

    #[test]
    fn restock_outranks_every_other_intent() {
        assert_eq!(classify("Check if to be restocked"), ChatIntent::RestockCheck);
        assert_eq!(classify("walmart suggest a restock plan"), ChatIntent::RestockCheck);
    }

    #[test]
    fn usage_phrases_map_to_usage_kinds() {
        assert_eq!(
            classify("walmart am I having too much cola"),
            ChatIntent::UsageAnalysis {
                kind: UsageKind::Overconsumption,
                product: Some("cola".to_string())
            }
        );
        assert_eq!(
            classify("walmart what have I bought the most"),
            ChatIntent::UsageAnalysis { kind: UsageKind::MostPurchased, product: None }
        );
        assert_eq!(
            classify("how much toothpaste have I purchased?"),
            ChatIntent::UsageAnalysis {
                kind: UsageKind::Quantity,
                product: Some("toothpaste".to_string())
            }
        );
        assert_eq!(
            classify("is my soda consumption excessive"),
            ChatIntent::UsageAnalysis {
                kind: UsageKind::Overconsumption,
                product: Some("soda".to_string())
            }
        );
    }

    #[test]
    fn wake_word_routes_to_assistant_without_the_wake_word() {
        let intent = classify("Walmart, is green tea good for me?");
        assert_eq!(
            intent,
            ChatIntent::AssistantQuestion {
                question: "is green tea good for me".to_string(),
                product: None,
            }
        );

        let custom = IntentClassifier::new("Cartwise").classify("cartwise anything about milk");
        assert_eq!(
            custom,
            ChatIntent::AssistantQuestion {
                question: "anything about milk".to_string(),
                product: Some("milk".to_string()),
            }
        );
    }

    #[test]
    fn possessive_wake_word_still_addresses_the_assistant() {
        for query in ["walmart's advice on cola", "Walmart\u{2019}s advice on cola"] {
            let ChatIntent::AssistantQuestion { question, .. } = classify(query) else {
                panic!("`{query}` should reach the assistant");
            };
            assert_eq!(question, "advice on cola");
        }

        assert_eq!(classify("walmarts suggest cola brands"), ChatIntent::BrandSuggestion);
    }

    #[test]
    fn suggestion_words_route_to_brand_suggestion() {
        assert_eq!(classify("Suggest brands for cola"), ChatIntent::BrandSuggestion);
        assert_eq!(classify("best shampoo"), ChatIntent::BrandSuggestion);
        assert_eq!(classify("Recommend brands for shampoo").name(), "brand_suggestion");
    }

    #[test]
    fn empty_and_unrelated_queries_are_general() {
        assert_eq!(classify(""), ChatIntent::General);
        assert_eq!(classify("   \t "), ChatIntent::General);
        assert_eq!(classify("hello there"), ChatIntent::General);
    }

    #[test]
    fn product_extraction_trims_filler() {
        let tokens = tokenize("what is the number of cola that i have bought");
        assert_eq!(extract_product(&tokens), Some("cola".to_string()));

        let tokens = tokenize("am i having too much");
        assert_eq!(extract_product(&tokens), None);
    }
}
