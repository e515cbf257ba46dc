use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Expected restock volume for one (location, product, month) bucket.
///
/// Field names are report columns and must not be renamed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemandForecastRow {
    pub shipping_location: String,
    pub product_name: String,
    /// Calendar month formatted as `YYYY-MM`.
    pub month: String,
    pub expected_units: u64,
}

/// How a prediction contributes to its bucket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemandWeighting {
    /// Each prediction counts as one unit.
    #[default]
    Count,
    /// Each prediction contributes the pair's typical purchase quantity.
    Quantity,
}

impl DemandWeighting {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Quantity => "quantity",
        }
    }
}

impl std::str::FromStr for DemandWeighting {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "count" => Ok(Self::Count),
            "quantity" => Ok(Self::Quantity),
            other => {
                Err(format!("unsupported demand weighting `{other}` (expected count|quantity)"))
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemandLevel {
    Low,
    Medium,
    High,
}

impl DemandLevel {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

/// Location label that disables location filtering.
pub const ALL_LOCATIONS: &str = "All";

/// Narrows forecast rows by location, month and product name.
///
/// Empty values and `All` for the location leave that dimension unfiltered.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastFilter {
    pub location: Option<String>,
    pub month: Option<String>,
    pub product_search: Option<String>,
}

impl ForecastFilter {
    pub fn is_empty(&self) -> bool {
        self.location().is_none() && self.month().is_none() && self.product_search().is_none()
    }

    /// Rejects a month that is not `YYYY-MM`.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(month) = self.month() {
            let well_formed = month.len() == 7
                && NaiveDate::parse_from_str(&format!("{month}-01"), "%Y-%m-%d").is_ok();
            if !well_formed {
                return Err(format!("month `{month}` must be formatted YYYY-MM"));
            }
        }
        Ok(())
    }

    fn location(&self) -> Option<&str> {
        active(&self.location).filter(|location| !location.eq_ignore_ascii_case(ALL_LOCATIONS))
    }

    fn month(&self) -> Option<&str> {
        active(&self.month)
    }

    fn product_search(&self) -> Option<&str> {
        active(&self.product_search)
    }

    pub fn matches(&self, row: &DemandForecastRow) -> bool {
        let location_ok = self
            .location()
            .map_or(true, |location| row.shipping_location.trim().eq_ignore_ascii_case(location));
        let month_ok = self.month().map_or(true, |month| row.month == month);
        let product_ok = self.product_search().map_or(true, |search| {
            row.product_name.to_lowercase().contains(&search.to_lowercase())
        });
        location_ok && month_ok && product_ok
    }

    pub fn apply(&self, rows: Vec<DemandForecastRow>) -> Vec<DemandForecastRow> {
        if self.is_empty() {
            return rows;
        }
        rows.into_iter().filter(|row| self.matches(row)).collect()
    }
}

fn active(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|value| !value.is_empty())
}
