//! Query router: classifies a chat message and dispatches it to the
//! estimators, the brand recommender or the AI capability.
//!
//! Every AI call is bounded by the configured timeout. Any
//! [`AiUnavailableError`] is absorbed here and replaced by a locally generated
//! reply, so `handle` never fails.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use cartwise_core::brands::{BrandRecommender, DEFAULT_DISPLAY_LIMIT};
use cartwise_core::config::AppConfig;
use cartwise_core::dataset::PurchaseDataset;
use cartwise_core::domain::brand::{BrandRecommendation, ExploratorySource};
use cartwise_core::domain::purchase::UserId;
use cartwise_core::domain::restock::RestockDueItem;
use cartwise_core::restock::RestockEstimator;
use cartwise_core::usage::{most_purchased, product_usage};

use crate::advice::{
    fallback_advice, most_purchased_text, usage_summary_text, Degradation,
};
use crate::conversation::{ChatIntent, IntentClassifier, UsageKind};
use crate::llm::{build_client, completion_budget, AiUnavailableError, LlmClient};
use crate::prompts::{PromptError, PromptLibrary};

pub const HELP_TEXT: &str = "I'm your shopping assistant! Try: 'Check if to be restocked', \
'Suggest brands for cola', 'walmart am I having too much cola', \
'walmart what have I bought the most', 'Recommend brands for shampoo'.";

const MISSING_PRODUCT: &str = "Please specify what product you're asking about. Try: 'am I \
having too much cola' or 'how much toothpaste have I purchased?'";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatReply {
    pub intent: String,
    pub reply: String,
    /// True when a local reply stood in for the AI capability.
    pub degraded: bool,
}

impl ChatReply {
    fn new(intent: &ChatIntent, reply: impl Into<String>) -> Self {
        Self { intent: intent.name().to_string(), reply: reply.into(), degraded: false }
    }

    fn degraded(intent: &ChatIntent, reply: impl Into<String>) -> Self {
        Self { degraded: true, ..Self::new(intent, reply) }
    }
}

#[derive(Clone, Debug)]
pub struct RouterSettings {
    pub wake_word: String,
    pub display_limit: usize,
    pub ai_timeout: Duration,
    /// Fixed reference instant for restock checks; `None` means now.
    pub as_of: Option<NaiveDateTime>,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            wake_word: "walmart".to_string(),
            display_limit: DEFAULT_DISPLAY_LIMIT,
            ai_timeout: Duration::from_secs(20),
            as_of: None,
        }
    }
}

impl RouterSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            wake_word: config.assistant.wake_word.clone(),
            display_limit: config.assistant.display_limit,
            ai_timeout: completion_budget(&config.llm),
            as_of: None,
        }
    }
}

pub struct ChatRouter {
    dataset: Arc<PurchaseDataset>,
    llm: Option<Arc<dyn LlmClient>>,
    prompts: PromptLibrary,
    classifier: IntentClassifier,
    settings: RouterSettings,
}

impl ChatRouter {
    pub fn new(
        dataset: Arc<PurchaseDataset>,
        llm: Option<Arc<dyn LlmClient>>,
        settings: RouterSettings,
    ) -> Result<Self, PromptError> {
        Ok(Self {
            dataset,
            llm,
            prompts: PromptLibrary::new()?,
            classifier: IntentClassifier::new(settings.wake_word.clone()),
            settings,
        })
    }

    pub fn from_config(
        dataset: Arc<PurchaseDataset>,
        config: &AppConfig,
    ) -> Result<Self, PromptError> {
        Self::new(dataset, build_client(&config.llm), RouterSettings::from_config(config))
    }

    pub fn dataset(&self) -> &PurchaseDataset {
        &self.dataset
    }

    pub fn ai_enabled(&self) -> bool {
        self.llm.is_some()
    }

    pub fn classify(&self, query: &str) -> ChatIntent {
        self.classifier.classify(query)
    }

    fn as_of(&self) -> NaiveDateTime {
        self.settings.as_of.unwrap_or_else(|| Utc::now().naive_utc())
    }

    pub async fn handle(&self, user_id: &UserId, query: &str) -> ChatReply {
        let intent = self.classifier.classify(query);
        info!(
            event_name = "chat.route.classified",
            user_id = %user_id,
            intent = intent.name(),
            "chat message classified"
        );

        let reply = match &intent {
            ChatIntent::RestockCheck => self.restock_reply(&intent, user_id),
            ChatIntent::UsageAnalysis { kind, product } => {
                self.usage_reply(&intent, user_id, *kind, product.as_deref()).await
            }
            ChatIntent::AssistantQuestion { question, product } => {
                self.assistant_reply(&intent, user_id, question, product.as_deref()).await
            }
            ChatIntent::BrandSuggestion => self.brand_reply(&intent, user_id, query),
            ChatIntent::General => ChatReply::new(&intent, HELP_TEXT),
        };

        if reply.degraded {
            info!(
                event_name = "chat.route.degraded",
                user_id = %user_id,
                intent = intent.name(),
                "answered with a local reply"
            );
        }
        reply
    }

    fn restock_reply(&self, intent: &ChatIntent, user_id: &UserId) -> ChatReply {
        let estimator = RestockEstimator::new(self.as_of());
        let due = estimator.due_for_restock(user_id, &self.dataset);
        ChatReply::new(intent, format_restock(&due))
    }

    fn brand_reply(&self, intent: &ChatIntent, user_id: &UserId, query: &str) -> ChatReply {
        match BrandRecommender::new(&self.dataset).recommend(user_id, query) {
            Ok(recommendation) => ChatReply::new(
                intent,
                format_brands(&recommendation.truncated(self.settings.display_limit)),
            ),
            Err(error) => {
                let reply = error.clarification().unwrap_or_else(|| error.to_string());
                ChatReply::new(intent, reply)
            }
        }
    }

    async fn usage_reply(
        &self,
        intent: &ChatIntent,
        user_id: &UserId,
        kind: UsageKind,
        product: Option<&str>,
    ) -> ChatReply {
        if kind == UsageKind::MostPurchased {
            let ranked = most_purchased(user_id, self.settings.display_limit, &self.dataset);
            let listing = most_purchased_text(&ranked);
            if ranked.is_empty() {
                return ChatReply::new(intent, listing);
            }
            return match self.ask_ai(self.prompts.purchase_patterns(&ranked)).await {
                Ok(analysis) => ChatReply::new(intent, format!("{listing}\n\nAnalysis:\n{analysis}")),
                Err(_) => ChatReply::degraded(intent, listing),
            };
        }

        let Some(product) = product else {
            return ChatReply::new(intent, MISSING_PRODUCT);
        };
        let usage = product_usage(user_id, product, &self.dataset);

        match kind {
            UsageKind::Overconsumption => {
                if usage.is_empty() {
                    return ChatReply::new(intent, fallback_advice(product, &usage));
                }
                match self.ask_ai(self.prompts.usage_insight(product, &usage, true)).await {
                    Ok(advice) => ChatReply::new(intent, advice),
                    Err(_) => ChatReply::degraded(intent, fallback_advice(product, &usage)),
                }
            }
            _ => {
                let summary = usage_summary_text(product, &usage);
                if usage.is_empty() {
                    return ChatReply::new(intent, summary);
                }
                match self.ask_ai(self.prompts.usage_insight(product, &usage, false)).await {
                    Ok(insight) => {
                        ChatReply::new(intent, format!("{summary}\n\nInsights:\n{insight}"))
                    }
                    Err(_) => ChatReply::degraded(intent, summary),
                }
            }
        }
    }

    async fn assistant_reply(
        &self,
        intent: &ChatIntent,
        user_id: &UserId,
        question: &str,
        product: Option<&str>,
    ) -> ChatReply {
        if question.trim().is_empty() {
            return ChatReply::new(intent, HELP_TEXT);
        }
        let purchase_count = product
            .map(|product| product_usage(user_id, product, &self.dataset).total_purchases)
            .unwrap_or(0);

        match self.ask_ai(self.prompts.assistant_question(question, product, purchase_count)).await
        {
            Ok(answer) => ChatReply::new(intent, answer),
            Err(_) => {
                ChatReply::degraded(intent, Degradation::assistant_unavailable().user_message)
            }
        }
    }

    async fn ask_ai(
        &self,
        prompt: Result<String, PromptError>,
    ) -> Result<String, AiUnavailableError> {
        let Some(client) = &self.llm else {
            return Err(AiUnavailableError::Disabled);
        };
        let prompt =
            prompt.map_err(|error| AiUnavailableError::Malformed(error.to_string()))?;

        let outcome = match tokio::time::timeout(self.settings.ai_timeout, client.complete(&prompt))
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(AiUnavailableError::Timeout(self.settings.ai_timeout)),
        };

        if let Err(error) = &outcome {
            warn!(
                event_name = "llm.complete.failed",
                error = %error,
                "ai capability unavailable; using local reply"
            );
        }
        outcome
    }
}

pub fn format_restock(due: &[RestockDueItem]) -> String {
    if due.is_empty() {
        return "Great news! You have nothing to restock right now.".to_string();
    }

    let mut text = String::from("Products that need restocking:\n");
    for item in due {
        if item.days_overdue > 0 {
            text.push_str(&format!(
                "\n- {} - due since {} ({} days overdue)",
                item.product_name, item.predicted_date, item.days_overdue
            ));
        } else {
            text.push_str(&format!("\n- {} - due on {}", item.product_name, item.predicted_date));
        }
    }
    text.push_str(&format!("\n\nTotal items to restock: {}", due.len()));
    text
}

pub fn format_brands(recommendation: &BrandRecommendation) -> String {
    if recommendation.is_empty() {
        return format!("No suggestions found for '{}'.", recommendation.category);
    }

    let mut text = format!("Brand suggestions for {}:", recommendation.category);
    if !recommendation.primary_brands.is_empty() {
        text.push_str(&format!(
            "\nYour preferred brands: {}",
            recommendation.primary_brands.join(", ")
        ));
    }
    if !recommendation.exploratory_brands.is_empty() {
        let label = match recommendation.exploratory_source {
            ExploratorySource::SimilarUsers => "Popular with shoppers like you",
            _ if recommendation.primary_brands.is_empty() => "Popular brands",
            _ => "Try these brands",
        };
        text.push_str(&format!("\n{label}: {}", recommendation.exploratory_brands.join(", ")));
    }
    text
}
