pub mod brands;
pub mod config;
pub mod dataset;
pub mod demand;
pub mod domain;
pub mod errors;
pub mod restock;
pub mod usage;

pub use brands::{BrandRecommender, CategoryResolver, CategoryScope};
pub use dataset::{PurchaseDataset, SimilarityIndex};
pub use demand::{classify_demand, DemandAggregator};
pub use domain::brand::{BrandRecommendation, ExploratorySource};
pub use domain::consumption::ConsumptionProfile;
pub use domain::forecast::{DemandForecastRow, DemandLevel, DemandWeighting, ForecastFilter};
pub use domain::purchase::{PurchaseRecord, UserId};
pub use domain::restock::{RestockDueItem, RestockPrediction};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use restock::RestockEstimator;
pub use usage::{most_purchased, product_usage, PurchaseFrequency, UsageSummary};
