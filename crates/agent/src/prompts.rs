use serde::Serialize;
use tera::{Context, Tera};
use thiserror::Error;

use cartwise_core::usage::UsageSummary;

const USAGE_INSIGHT: &str = "usage_insight.tera";
const PURCHASE_PATTERNS: &str = "purchase_patterns.tera";
const ASSISTANT_QUESTION: &str = "assistant_question.tera";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt template error: {0}")]
    Template(#[from] tera::Error),
}

#[derive(Serialize)]
struct RankedProduct<'a> {
    product: &'a str,
    count: usize,
}

/// Prompt templates embedded at build time.
#[derive(Clone, Debug)]
pub struct PromptLibrary {
    tera: Tera,
}

impl PromptLibrary {
    pub fn new() -> Result<Self, PromptError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            (USAGE_INSIGHT, include_str!("../../../templates/prompts/usage_insight.tera")),
            (PURCHASE_PATTERNS, include_str!("../../../templates/prompts/purchase_patterns.tera")),
            (
                ASSISTANT_QUESTION,
                include_str!("../../../templates/prompts/assistant_question.tera"),
            ),
        ])?;
        Ok(Self { tera })
    }

    pub fn usage_insight(
        &self,
        product: &str,
        usage: &UsageSummary,
        concern: bool,
    ) -> Result<String, PromptError> {
        let mut context = Context::new();
        context.insert("product", product);
        context.insert("usage", usage);
        context.insert("average", &format!("{:.1}", usage.average_quantity));
        context.insert("frequency", usage.frequency.label());
        context.insert(
            "last_purchase",
            &usage
                .last_purchase
                .map(|date| date.to_string())
                .unwrap_or_else(|| "Not available".to_string()),
        );
        context.insert("concern", &concern);
        Ok(self.tera.render(USAGE_INSIGHT, &context)?)
    }

    pub fn purchase_patterns(&self, ranked: &[(String, usize)]) -> Result<String, PromptError> {
        let products = ranked
            .iter()
            .map(|(product, count)| RankedProduct { product, count: *count })
            .collect::<Vec<_>>();
        let mut context = Context::new();
        context.insert("products", &products);
        Ok(self.tera.render(PURCHASE_PATTERNS, &context)?)
    }

    pub fn assistant_question(
        &self,
        question: &str,
        product: Option<&str>,
        purchase_count: usize,
    ) -> Result<String, PromptError> {
        let mut context = Context::new();
        context.insert("question", question);
        context.insert("product", &product);
        context.insert("purchase_count", &purchase_count);
        Ok(self.tera.render(ASSISTANT_QUESTION, &context)?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use cartwise_core::usage::{PurchaseFrequency, UsageSummary};

    use super::PromptLibrary;

    #[test]
    fn usage_prompt_carries_statistics() {
        let library = PromptLibrary::new().expect("templates");
        let usage = UsageSummary {
            product: "Cola 500ml".to_string(),
            total_purchases: 12,
            total_quantity: 30,
            average_quantity: 2.5,
            last_purchase: NaiveDate::from_ymd_opt(2024, 1, 15),
            frequency: PurchaseFrequency::Weekly,
        };

        let prompt = library.usage_insight("cola", &usage, true).expect("render");

        assert!(prompt.contains("Product: cola"));
        assert!(prompt.contains("Total purchases: 12"));
        assert!(prompt.contains("Average per purchase: 2.5"));
        assert!(prompt.contains("Last purchase: 2024-01-15"));
        assert!(prompt.contains("too much"));
    }

    #[test]
    fn ranking_prompt_numbers_products() {
        let library = PromptLibrary::new().expect("templates");
        let prompt = library
            .purchase_patterns(&[("Cola 500ml".to_string(), 3), ("1L Milk".to_string(), 2)])
            .expect("render");

        assert!(prompt.contains("1. Cola 500ml: 3 purchases"));
        assert!(prompt.contains("2. 1L Milk: 2 purchases"));
    }

    #[test]
    fn assistant_prompt_mentions_context_only_when_known() {
        let library = PromptLibrary::new().expect("templates");

        let with_product =
            library.assistant_question("is cola bad", Some("cola"), 4).expect("render");
        let without = library.assistant_question("what is new", None, 0).expect("render");

        assert!(with_product.contains("purchased cola 4 times"));
        assert!(with_product.contains("Question: is cola bad"));
        assert!(!without.contains("has purchased"));
    }
}
