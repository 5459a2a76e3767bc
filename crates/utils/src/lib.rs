pub mod database;
pub mod products;

// Re-export commonly used items
pub use crate::database::{ensure_database_exists, read_database, write_database};
pub use crate::products::{
    find_duplicate_product_keys, merge_products_with_deduplication, product_key, MergeStats,
};
