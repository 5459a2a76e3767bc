use async_trait::async_trait;
use models::{Database, Product, User};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::error::{ApiError, Result};

/// The composite lookup key of a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductKey {
    pub code: String,
    pub identification_code: String,
}

impl ProductKey {
    pub fn new(code: impl Into<String>, identification_code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            identification_code: identification_code.into(),
        }
    }

    fn matches(&self, product: &Product) -> bool {
        product.code == self.code && product.identification_code == self.identification_code
    }
}

/// Outcome of an insert attempt against the persisted collection. Duplicates
/// are an expected answer during imports, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

/// Repository trait for the persisted product collection.
/// This abstraction allows swapping the file-backed store for a hosted table
/// service without touching the handlers.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn list_all(&self) -> Result<Vec<Product>>;
    async fn find_by_key(&self, key: &ProductKey) -> Result<Option<Product>>;
    async fn find_by_code_substring(&self, text: &str) -> Result<Vec<Product>>;
    async fn find_by_months_remaining_at_most(&self, months: i64) -> Result<Vec<Product>>;
    async fn insert(&self, product: Product) -> Result<InsertOutcome>;
    async fn replace(&self, key: &ProductKey, product: Product) -> Result<Product>;
    async fn set_image_path(&self, key: &ProductKey, image_path: &str) -> Result<Product>;
    async fn clear_all(&self) -> Result<usize>;
}

/// Repository trait for staff accounts.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert(&self, user: User) -> Result<User>;
    async fn list_all(&self) -> Result<Vec<User>>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn find_by_id(&self, id: &str) -> Result<Option<User>>;
    async fn update(&self, user: User) -> Result<User>;
}

/// File-based implementation over database.json.
///
/// Every mutation is a read-modify-write cycle serialized by a process-local
/// mutex; two server processes importing overlapping files at once are not
/// coordinated (accepted limitation).
pub struct FileInventoryRepository {
    db_path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileInventoryRepository {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<Database> {
        let contents = match tokio::fs::read_to_string(&self.db_path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Database::default())
            }
            Err(err) => return Err(err.into()),
        };
        let database: Database = serde_json::from_str(&contents)?;
        Ok(database)
    }

    async fn store(&self, database: &Database) -> Result<()> {
        if let Some(parent) = self.db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let formatted = serde_json::to_string_pretty(database)?;
        tokio::fs::write(&self.db_path, formatted).await?;
        Ok(())
    }
}

#[async_trait]
impl ProductRepository for FileInventoryRepository {
    async fn list_all(&self) -> Result<Vec<Product>> {
        Ok(self.load().await?.products)
    }

    async fn find_by_key(&self, key: &ProductKey) -> Result<Option<Product>> {
        let products = self.load().await?.products;
        Ok(products.into_iter().find(|p| key.matches(p)))
    }

    async fn find_by_code_substring(&self, text: &str) -> Result<Vec<Product>> {
        let needle = text.to_lowercase();
        let products = self.load().await?.products;
        Ok(products
            .into_iter()
            .filter(|p| p.code.to_lowercase().contains(&needle))
            .collect())
    }

    async fn find_by_months_remaining_at_most(&self, months: i64) -> Result<Vec<Product>> {
        let products = self.load().await?.products;
        Ok(products
            .into_iter()
            .filter(|p| p.months_remaining <= months)
            .collect())
    }

    async fn insert(&self, product: Product) -> Result<InsertOutcome> {
        let _guard = self.write_lock.lock().await;
        let mut database = self.load().await?;

        let key = product.composite_key();
        if database.products.iter().any(|p| p.composite_key() == key) {
            return Ok(InsertOutcome::Duplicate);
        }

        database.products.push(product);
        self.store(&database).await?;
        Ok(InsertOutcome::Inserted)
    }

    async fn replace(&self, key: &ProductKey, product: Product) -> Result<Product> {
        let _guard = self.write_lock.lock().await;
        let mut database = self.load().await?;

        let position = database
            .products
            .iter()
            .position(|p| key.matches(p))
            .ok_or(ApiError::ProductNotFound)?;

        // Moving a record onto another record's key would merge two products
        let new_key = product.composite_key();
        if new_key != format!("{}|{}", key.code, key.identification_code)
            && database
                .products
                .iter()
                .any(|p| p.composite_key() == new_key)
        {
            return Err(ApiError::DuplicateProduct {
                code: product.code,
                identification_code: product.identification_code,
            });
        }

        database.products[position] = product.clone();

        self.store(&database).await?;
        Ok(product)
    }

    async fn set_image_path(&self, key: &ProductKey, image_path: &str) -> Result<Product> {
        let _guard = self.write_lock.lock().await;
        let mut database = self.load().await?;

        let slot = database
            .products
            .iter_mut()
            .find(|p| key.matches(p))
            .ok_or(ApiError::ProductNotFound)?;
        slot.image_path = image_path.to_string();
        let updated = slot.clone();

        self.store(&database).await?;
        Ok(updated)
    }

    async fn clear_all(&self) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut database = self.load().await?;
        let removed = database.products.len();
        database.products.clear();
        self.store(&database).await?;
        Ok(removed)
    }
}

#[async_trait]
impl UserRepository for FileInventoryRepository {
    async fn insert(&self, user: User) -> Result<User> {
        let _guard = self.write_lock.lock().await;
        let mut database = self.load().await?;

        if database.users.iter().any(|u| u.email == user.email) {
            return Err(ApiError::UserExists(user.email));
        }

        database.users.push(user.clone());
        self.store(&database).await?;
        Ok(user)
    }

    async fn list_all(&self) -> Result<Vec<User>> {
        Ok(self.load().await?.users)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self.load().await?.users;
        Ok(users.into_iter().find(|u| u.email == email))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        let users = self.load().await?.users;
        Ok(users.into_iter().find(|u| u.id == id))
    }

    async fn update(&self, user: User) -> Result<User> {
        let _guard = self.write_lock.lock().await;
        let mut database = self.load().await?;

        let slot = database
            .users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or(ApiError::UserNotFound)?;
        *slot = user.clone();

        self.store(&database).await?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::months_remaining;

    fn sample_product(code: &str, identification: &str) -> Product {
        let stock = 10.0;
        let consumption = 4.0;
        Product {
            code: code.to_string(),
            description: format!("Producto {}", code),
            budget_line: String::new(),
            unit: "UNI".to_string(),
            warehouse: "Bodega 01".to_string(),
            stock_on_hand: stock,
            monthly_consumption: consumption,
            months_remaining: months_remaining(stock, consumption),
            classification_code: String::new(),
            identification_code: identification.to_string(),
            procedure_number: String::new(),
            procedure_type: String::new(),
            image_path: String::new(),
            category: String::new(),
            supplier: String::new(),
        }
    }

    fn temp_repository(tag: &str) -> (FileInventoryRepository, PathBuf) {
        let dir = std::env::temp_dir().join(format!("inventario-repo-{}-{}", tag, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("database.json");
        (FileInventoryRepository::new(&path), dir)
    }

    #[tokio::test]
    async fn test_insert_rejects_cross_batch_duplicates() {
        let (repo, dir) = temp_repository("insert");

        let first = ProductRepository::insert(&repo, sample_product("P1", "ID-1")).await.unwrap();
        assert_eq!(first, InsertOutcome::Inserted);

        let again = ProductRepository::insert(&repo, sample_product("P1", "ID-1")).await.unwrap();
        assert_eq!(again, InsertOutcome::Duplicate);

        let other_identification = ProductRepository::insert(&repo, sample_product("P1", "ID-2")).await.unwrap();
        assert_eq!(other_identification, InsertOutcome::Inserted);

        assert_eq!(ProductRepository::list_all(&repo).await.unwrap().len(), 2);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_search_and_report_filters() {
        let (repo, dir) = temp_repository("filters");

        let mut low = sample_product("02-00548", "ID-1");
        low.stock_on_hand = 3.0;
        low.monthly_consumption = 3.0;
        low.recompute_months_remaining();
        ProductRepository::insert(&repo, low).await.unwrap();
        ProductRepository::insert(&repo, sample_product("AB-100", "ID-2")).await.unwrap();

        let by_code = repo.find_by_code_substring("00548").await.unwrap();
        assert_eq!(by_code.len(), 1);
        assert_eq!(by_code[0].code, "02-00548");

        // Case-insensitive match on the code
        let lowercase = repo.find_by_code_substring("ab-").await.unwrap();
        assert_eq!(lowercase.len(), 1);

        let urgent = repo.find_by_months_remaining_at_most(1).await.unwrap();
        assert_eq!(urgent.len(), 1);
        assert_eq!(urgent[0].code, "02-00548");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_replace_and_image_path() {
        let (repo, dir) = temp_repository("replace");
        ProductRepository::insert(&repo, sample_product("P1", "ID-1")).await.unwrap();

        let key = ProductKey::new("P1", "ID-1");
        let mut updated = sample_product("P1", "ID-1");
        updated.stock_on_hand = 1.0;
        updated.monthly_consumption = 1.0;
        updated.recompute_months_remaining();
        let stored = repo.replace(&key, updated).await.unwrap();
        assert_eq!(stored.months_remaining, 1);

        let with_image = repo.set_image_path(&key, "/uploads/p1.png").await.unwrap();
        assert_eq!(with_image.image_path, "/uploads/p1.png");

        let missing = ProductKey::new("NOPE", "ID-9");
        assert!(repo.set_image_path(&missing, "/x").await.is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_clear_all() {
        let (repo, dir) = temp_repository("clear");
        ProductRepository::insert(&repo, sample_product("P1", "ID-1")).await.unwrap();
        ProductRepository::insert(&repo, sample_product("P2", "ID-2")).await.unwrap();

        assert_eq!(repo.clear_all().await.unwrap(), 2);
        assert!(ProductRepository::list_all(&repo).await.unwrap().is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
