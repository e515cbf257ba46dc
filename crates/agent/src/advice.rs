//! Local replies used when the AI capability is disabled or failing.

use cartwise_core::usage::UsageSummary;

const SUGARY_DRINKS: &[&str] = &["cola", "soda", "energy", "drink", "soft drink"];
const ALCOHOL: &[&str] = &["beer", "wine", "alcohol", "whisky", "vodka"];
const TOBACCO: &[&str] = &["cigarette", "cigarettes", "tobacco"];
const SUPPLEMENTS: &[&str] = &["vitamin", "supplement", "medicine"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProductClass {
    SugaryDrink,
    Alcohol,
    Tobacco,
    Supplement,
    Other,
}

impl ProductClass {
    pub fn of(product: &str) -> Self {
        let product = product.to_lowercase();
        let is = |words: &[&str]| words.iter().any(|word| product.contains(word));
        if is(SUGARY_DRINKS) {
            Self::SugaryDrink
        } else if is(ALCOHOL) {
            Self::Alcohol
        } else if is(TOBACCO) {
            Self::Tobacco
        } else if is(SUPPLEMENTS) {
            Self::Supplement
        } else {
            Self::Other
        }
    }
}

/// Why a reply was produced locally instead of by the AI capability.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Degradation {
    pub reason_code: &'static str,
    pub user_message: String,
}

impl Degradation {
    pub fn assistant_unavailable() -> Self {
        Self {
            reason_code: "ai_unavailable",
            user_message: "The shopping assistant is unavailable right now. Try 'Check if to be \
                           restocked' or 'Suggest brands for cola' in the meantime."
                .to_string(),
        }
    }
}

/// Health-oriented advice derived from purchase counts alone.
pub fn fallback_advice(product: &str, usage: &UsageSummary) -> String {
    let total = usage.total_purchases;
    let frequency = usage.frequency.label();

    if usage.is_empty() {
        return format!(
            "You haven't purchased any {product} yet. This is actually good for your health!"
        );
    }

    match ProductClass::of(product) {
        ProductClass::SugaryDrink if total > 10 => format!(
            "You've purchased {product} {total} times ({frequency}). Consider reducing sugary \
             drink consumption and switching to water or unsweetened beverages."
        ),
        ProductClass::SugaryDrink => format!(
            "Your {product} consumption is moderate ({total} purchases). Keep it occasional and \
             consider alternatives like water or herbal tea."
        ),
        ProductClass::Alcohol if total > 5 => format!(
            "You've purchased {product} {total} times ({frequency}). Consider moderating alcohol \
             consumption and exploring non-alcoholic alternatives."
        ),
        ProductClass::Alcohol => format!(
            "Your {product} consumption appears moderate. Remember to drink responsibly."
        ),
        ProductClass::Tobacco => format!(
            "You've purchased {product} {total} times. Quitting brings significant health \
             benefits; a healthcare professional can help."
        ),
        ProductClass::Supplement => format!(
            "You've purchased {product} {total} times ({frequency}). Follow recommended dosages \
             and check supplement use with a healthcare provider."
        ),
        ProductClass::Other if total > 20 => format!(
            "You've purchased {product} {total} times ({frequency}). This is a high consumption \
             level. Consider diversifying your purchases."
        ),
        ProductClass::Other if total > 10 => format!(
            "You've purchased {product} {total} times ({frequency}). This is moderate \
             consumption. Balance it with a variety of options."
        ),
        ProductClass::Other => format!(
            "You've purchased {product} {total} times ({frequency}). This appears to be \
             reasonable consumption."
        ),
    }
}

/// Plain statistics block for quantity questions.
pub fn usage_summary_text(product: &str, usage: &UsageSummary) -> String {
    if usage.is_empty() {
        return format!("You haven't purchased any {product} yet.");
    }
    let mut text = format!(
        "Your {product} purchase summary:\n\
         - Total purchases: {}\n\
         - Total quantity: {}\n\
         - Average per purchase: {:.1}\n\
         - Purchase frequency: {}",
        usage.total_purchases,
        usage.total_quantity,
        usage.average_quantity,
        usage.frequency.label()
    );
    if let Some(last) = usage.last_purchase {
        text.push_str(&format!("\n- Last purchase: {last}"));
    }
    text
}

/// Ranked list for "what have I bought the most" questions.
pub fn most_purchased_text(ranked: &[(String, usize)]) -> String {
    if ranked.is_empty() {
        return "No purchase history found.".to_string();
    }
    let mut text = format!("Your top {} purchased products:", ranked.len());
    for (index, (product, count)) in ranked.iter().enumerate() {
        text.push_str(&format!("\n{}. {product}: {count} purchases", index + 1));
    }
    let (top, count) = &ranked[0];
    if *count > 10 {
        text.push_str(&format!(
            "\n\n{top} dominates your shopping. Consider whether that matches your needs."
        ));
    }
    text
}
