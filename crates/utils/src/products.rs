use anyhow::{anyhow, Result};
use serde_json::Value;
use std::collections::HashSet;

/// Merges new products into an existing database with duplicate detection.
/// Products are considered duplicates if they share the same
/// `(code, identificationCode)` pair.
///
/// # Arguments
/// * `template` - The existing database.json as a Value
/// * `new_products` - Vector of new product objects to merge
///
/// # Returns
/// * `Result<(Value, MergeStats)>` - The merged database and statistics about the merge
///
/// # Example
/// ```no_run
/// use utils::merge_products_with_deduplication;
/// use serde_json::json;
///
/// let database = json!({"products": []});
/// let new_products = vec![json!({"code": "INV001", "identificationCode": "ID-1"})];
/// let (merged, stats) = merge_products_with_deduplication(database, new_products).unwrap();
/// println!("Added: {}, Skipped: {}", stats.added, stats.skipped);
/// ```
pub fn merge_products_with_deduplication(
    mut template: Value,
    new_products: Vec<Value>,
) -> Result<(Value, MergeStats)> {
    let arr = template
        .get_mut("products")
        .and_then(|v| v.as_array_mut())
        .ok_or_else(|| anyhow!("database.json missing 'products' array"))?;

    // Build a set of existing composite keys
    let existing_keys: HashSet<String> = arr.iter().filter_map(product_key).collect();

    let mut stats = MergeStats {
        added: 0,
        skipped: 0,
        total: new_products.len(),
    };

    // Only add products whose composite key doesn't already exist
    for product in new_products {
        let key = product_key(&product)
            .ok_or_else(|| anyhow!("Product missing 'code' field"))?;

        if existing_keys.contains(&key) {
            stats.skipped += 1;
        } else {
            arr.push(product);
            stats.added += 1;
        }
    }

    Ok((template, stats))
}

/// Statistics about a product merge operation
#[derive(Debug, Clone)]
pub struct MergeStats {
    pub added: usize,
    pub skipped: usize,
    pub total: usize,
}

impl MergeStats {
    pub fn has_duplicates(&self) -> bool {
        self.skipped > 0
    }
}

/// Builds the `code|identificationCode` composite key of a product object.
/// Returns None when `code` is missing; a missing identification code counts
/// as empty, so two records without one still collide on the same code.
pub fn product_key(product: &Value) -> Option<String> {
    let code = product.get("code").and_then(|v| v.as_str())?;
    let identification = product
        .get("identificationCode")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    Some(format!("{}|{}", code, identification))
}

/// Finds and returns the composite keys that already exist in the database.
/// Useful for reporting which products of a batch were duplicates.
pub fn find_duplicate_product_keys(database: &Value, keys: &[String]) -> Result<Vec<String>> {
    let arr = database
        .get("products")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow!("database.json missing 'products' array"))?;

    let existing_keys: HashSet<String> = arr.iter().filter_map(product_key).collect();

    let duplicates: Vec<String> = keys
        .iter()
        .filter(|key| existing_keys.contains(*key))
        .cloned()
        .collect();

    Ok(duplicates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_with_no_duplicates() {
        let database = json!({
            "products": [
                {"code": "INV001", "identificationCode": "ID-1", "description": "Papel"}
            ]
        });

        let new_products = vec![
            json!({"code": "INV002", "identificationCode": "ID-2", "description": "Tinta"}),
            json!({"code": "INV003", "identificationCode": "ID-3", "description": "Grapas"}),
        ];

        let (merged, stats) = merge_products_with_deduplication(database, new_products).unwrap();

        assert_eq!(stats.added, 2);
        assert_eq!(stats.skipped, 0);
        assert_eq!(stats.total, 2);

        let products = merged.get("products").unwrap().as_array().unwrap();
        assert_eq!(products.len(), 3);
    }

    #[test]
    fn test_merge_with_duplicates() {
        let database = json!({
            "products": [
                {"code": "INV001", "identificationCode": "ID-1"},
                {"code": "INV002", "identificationCode": "ID-2"}
            ]
        });

        let new_products = vec![
            json!({"code": "INV002", "identificationCode": "ID-2"}), // duplicate
            json!({"code": "INV003", "identificationCode": "ID-3"}), // new
        ];

        let (merged, stats) = merge_products_with_deduplication(database, new_products).unwrap();

        assert_eq!(stats.added, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.total, 2);
        assert!(stats.has_duplicates());

        let products = merged.get("products").unwrap().as_array().unwrap();
        assert_eq!(products.len(), 3); // Should still be 3, not 4
    }

    #[test]
    fn test_same_code_different_identification_is_not_a_duplicate() {
        let database = json!({
            "products": [
                {"code": "INV001", "identificationCode": "ID-1"}
            ]
        });

        let new_products = vec![json!({"code": "INV001", "identificationCode": "ID-2"})];

        let (merged, stats) = merge_products_with_deduplication(database, new_products).unwrap();

        assert_eq!(stats.added, 1);
        assert_eq!(stats.skipped, 0);
        assert_eq!(merged.get("products").unwrap().as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_importing_the_same_batch_twice_is_idempotent() {
        let database = json!({"products": []});
        let batch = vec![
            json!({"code": "A", "identificationCode": "1"}),
            json!({"code": "B", "identificationCode": "2"}),
        ];

        let (merged, first) = merge_products_with_deduplication(database, batch.clone()).unwrap();
        assert_eq!(first.added, 2);
        assert_eq!(first.skipped, 0);

        let (merged, second) = merge_products_with_deduplication(merged, batch).unwrap();
        assert_eq!(second.added, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(merged.get("products").unwrap().as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_find_duplicate_product_keys() {
        let database = json!({
            "products": [
                {"code": "INV001", "identificationCode": "ID-1"},
                {"code": "INV002", "identificationCode": "ID-2"}
            ]
        });

        let check_keys = vec![
            "INV001|ID-1".to_string(),
            "INV009|ID-9".to_string(),
            "INV002|ID-2".to_string(),
        ];

        let duplicates = find_duplicate_product_keys(&database, &check_keys).unwrap();

        assert_eq!(duplicates.len(), 2);
        assert!(duplicates.contains(&"INV001|ID-1".to_string()));
        assert!(duplicates.contains(&"INV002|ID-2".to_string()));
        assert!(!duplicates.contains(&"INV009|ID-9".to_string()));
    }
}
