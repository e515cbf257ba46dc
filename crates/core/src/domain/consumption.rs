use serde::{Deserialize, Serialize};

/// Static reference row: how much of a product one person uses per day.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionProfile {
    pub product_name: String,
    pub per_person_daily_consumption: f64,
}
