use backend_api::{run_server, AppState, FileInventoryRepository, LocalImageStore};
use std::sync::Arc;
use std::{env, path::PathBuf};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Environment variables (with sane defaults)
    let database_path_raw =
        env::var("DATABASE_PATH").unwrap_or_else(|_| "database/database.json".to_string());
    let uploads_dir_raw = env::var("UPLOADS_DIR").unwrap_or_else(|_| "uploads".to_string());
    let public_base = env::var("PUBLIC_BASE_URL").unwrap_or_else(|_| "/uploads".to_string());
    let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .unwrap_or(3000);

    let database_path = PathBuf::from(&database_path_raw);
    let uploads_dir = PathBuf::from(&uploads_dir_raw);

    println!("Inventario API Server");
    println!("=====================");
    println!("Database path: {}", database_path.display());
    println!("Uploads dir:   {}", uploads_dir.display());
    println!("Listening on:  {}:{}", host, port);
    println!(
        "Environment overrides: DATABASE_PATH='{}' UPLOADS_DIR='{}'",
        database_path_raw, uploads_dir_raw
    );
    println!();

    // Pre-flight: make sure the database document and uploads dir exist
    let database_path = utils::ensure_database_exists(&database_path)?;
    std::fs::create_dir_all(&uploads_dir)?;

    // Create the repositories and image store; both repository traits are
    // served by the same file-backed store
    let repository = Arc::new(FileInventoryRepository::new(&database_path));
    let state = AppState {
        products: repository.clone(),
        users: repository,
        images: Arc::new(LocalImageStore::new(&uploads_dir, public_base)),
    };

    // Start the server
    run_server(state, &uploads_dir, &host, port).await?;

    Ok(())
}
