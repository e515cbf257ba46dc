use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::domain::purchase::UserId;

/// Projected reorder for one (user, product) pair.
///
/// Field names are the report columns consumed by warehouse-planning exports
/// and must not be renamed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RestockPrediction {
    pub user_id: UserId,
    pub product_name: String,
    pub estimated_family_size: u32,
    pub mean_days_between_orders: f64,
    #[serde(with = "report_datetime")]
    pub predicted_next_date: NaiveDateTime,
    pub is_overdue: bool,
}

impl RestockPrediction {
    /// Recomputes `is_overdue` against a new reference instant.
    pub fn reevaluate(mut self, as_of: NaiveDateTime) -> Self {
        self.is_overdue = self.predicted_next_date < as_of;
        self
    }

    pub fn days_overdue(&self, as_of: NaiveDateTime) -> i64 {
        (as_of.date() - self.predicted_next_date.date()).num_days()
    }
}

/// Entry of a user's "due for restock" list, earliest first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestockDueItem {
    pub product_name: String,
    pub predicted_date: NaiveDate,
    pub days_overdue: i64,
}

/// Report date format: `YYYY-MM-DD`, with a time part only when the
/// projection falls inside a day. Sub-second digits are kept so a parsed value
/// equals the projection it was written from.
pub mod report_datetime {
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
    use serde::{Deserialize, Deserializer, Serializer};

    const DATE_FORMAT: &str = "%Y-%m-%d";
    const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

    pub fn format(value: &NaiveDateTime) -> String {
        if value.time() == NaiveTime::MIN {
            value.format(DATE_FORMAT).to_string()
        } else {
            value.format(DATETIME_FORMAT).to_string()
        }
    }

    pub fn parse(value: &str) -> Option<NaiveDateTime> {
        let trimmed = value.trim();
        NaiveDateTime::parse_from_str(trimmed, DATETIME_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f"))
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
                    .ok()
                    .map(|date| date.and_time(NaiveTime::MIN))
            })
    }

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| {
            serde::de::Error::custom(format!("expected YYYY-MM-DD[ HH:MM:SS[.fff]], got `{raw}`"))
        })
    }
}

pub fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}
