pub mod holt_winters;
pub mod random_forest;
