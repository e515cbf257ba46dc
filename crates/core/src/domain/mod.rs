pub mod brand;
pub mod consumption;
pub mod forecast;
pub mod purchase;
pub mod restock;

/// Case-insensitive key used to join product, brand and category names.
pub fn normalize_key(value: &str) -> String {
    value.trim().to_lowercase()
}
