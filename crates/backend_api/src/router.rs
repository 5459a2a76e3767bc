use axum::{
    routing::{get, post},
    Router,
};
use std::path::Path;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::handlers::{self, AppState};

/// Create the main application router with all API endpoints
pub fn create_router<P: AsRef<Path>>(state: AppState, uploads_dir: P) -> Router {
    // Create CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the router
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Product endpoints
        .route(
            "/api/products",
            get(handlers::list_products)
                .post(handlers::create_product)
                .put(handlers::replace_product)
                .delete(handlers::clear_products),
        )
        .route("/api/products/search", get(handlers::search_products))
        .route("/api/products/report", get(handlers::report_products))
        .route("/api/products/template", get(handlers::download_template))
        .route("/api/products/import", post(handlers::import_products))
        .route(
            "/api/products/image",
            post(handlers::upload_product_image).delete(handlers::delete_product_image),
        )
        // Auth and user management
        .route("/api/auth/login", post(handlers::login))
        .route(
            "/api/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        .route(
            "/api/users/:id/reset-password",
            post(handlers::reset_user_password),
        )
        .route("/api/users/:id/activate", post(handlers::activate_user))
        .route("/api/users/:id/deactivate", post(handlers::deactivate_user))
        .route("/api/users/:id/password", post(handlers::change_user_password))
        // Uploaded product images
        .nest_service("/uploads", ServeDir::new(uploads_dir))
        // Add shared state
        .with_state(state)
        // Add middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
