pub mod error;
pub mod handlers;
pub mod repository;
pub mod router;
pub mod server;
pub mod storage;

pub use error::{ApiError, Result};
pub use handlers::AppState;
pub use repository::{
    FileInventoryRepository, InsertOutcome, ProductKey, ProductRepository, UserRepository,
};
pub use router::create_router;
pub use server::run_server;
pub use storage::{ImageStore, LocalImageStore};
