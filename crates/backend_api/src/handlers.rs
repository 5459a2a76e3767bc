use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use models::{Product, Role, User};

use crate::{
    error::ApiError,
    repository::{InsertOutcome, ProductKey, ProductRepository, UserRepository},
    storage::{validate_image, ImageStore},
    Result,
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub products: Arc<dyn ProductRepository>,
    pub users: Arc<dyn UserRepository>,
    pub images: Arc<dyn ImageStore>,
}

/// Identity headers supplied by the session collaborator in front of this
/// API. The import pipeline only uses them for the audit log line.
const USER_EMAIL_HEADER: &str = "x-user-email";
const USER_ROLE_HEADER: &str = "x-user-role";

fn caller_email(headers: &HeaderMap) -> String {
    headers
        .get(USER_EMAIL_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

fn require_admin(headers: &HeaderMap) -> Result<()> {
    let role = headers
        .get(USER_ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if role == "admin" {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

// ── Products ──

/// GET /api/products
/// Returns the complete product list
pub async fn list_products(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let products = state.products.list_all().await?;
    Ok(Json(products))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub code: String,
}

/// GET /api/products/search?code=...
/// Case-insensitive substring search on the product code
pub async fn search_products(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse> {
    let products = state.products.find_by_code_substring(&params.code).await?;
    Ok(Json(products))
}

#[derive(Debug, Deserialize)]
pub struct ReportParams {
    pub months: i64,
}

/// GET /api/products/report?months=N
/// Products whose months-remaining estimate is N or less
pub async fn report_products(
    State(state): State<AppState>,
    Query(params): Query<ReportParams>,
) -> Result<impl IntoResponse> {
    let products = state
        .products
        .find_by_months_remaining_at_most(params.months)
        .await?;
    Ok(Json(products))
}

/// Incoming product payload. `monthsRemaining` is deliberately absent: the
/// estimate is always recomputed server-side.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInput {
    pub code: String,
    pub description: String,
    #[serde(default)]
    pub budget_line: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub warehouse: String,
    #[serde(default)]
    pub stock_on_hand: f64,
    #[serde(default)]
    pub monthly_consumption: f64,
    #[serde(default)]
    pub classification_code: String,
    #[serde(default)]
    pub identification_code: String,
    #[serde(default)]
    pub procedure_number: String,
    #[serde(default)]
    pub procedure_type: String,
    #[serde(default)]
    pub image_path: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub supplier: String,
}

impl ProductInput {
    fn into_product(self) -> Result<Product> {
        if self.code.trim().is_empty() || self.description.trim().is_empty() {
            return Err(ApiError::BadRequest(
                "code and description are required".to_string(),
            ));
        }

        let mut product = Product {
            code: self.code.trim().to_string(),
            description: self.description.trim().to_string(),
            budget_line: self.budget_line,
            unit: non_empty_or(self.unit, "Unidad"),
            warehouse: non_empty_or(self.warehouse, "Bodega General"),
            stock_on_hand: self.stock_on_hand,
            monthly_consumption: self.monthly_consumption,
            months_remaining: 0,
            classification_code: self.classification_code,
            identification_code: self.identification_code.trim().to_string(),
            procedure_number: self.procedure_number,
            procedure_type: non_empty_or(self.procedure_type, "Licitación Directa"),
            image_path: self.image_path,
            category: self.category,
            supplier: self.supplier,
        };
        product.recompute_months_remaining();
        Ok(product)
    }
}

fn non_empty_or(value: String, default: &str) -> String {
    if value.trim().is_empty() {
        default.to_string()
    } else {
        value
    }
}

/// POST /api/products
/// Manual registration of a single product
pub async fn create_product(
    State(state): State<AppState>,
    Json(input): Json<ProductInput>,
) -> Result<impl IntoResponse> {
    let product = input.into_product()?;

    match state.products.insert(product.clone()).await? {
        InsertOutcome::Inserted => Ok((StatusCode::CREATED, Json(product))),
        InsertOutcome::Duplicate => Err(ApiError::DuplicateProduct {
            code: product.code,
            identification_code: product.identification_code,
        }),
    }
}

/// Composite key of the record being addressed, passed as query parameters so
/// empty identification codes stay addressable.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductKeyParams {
    pub code: String,
    #[serde(default)]
    pub identification_code: String,
}

impl ProductKeyParams {
    fn into_key(self) -> ProductKey {
        ProductKey::new(self.code, self.identification_code)
    }
}

/// PUT /api/products?code=...&identificationCode=...
/// Full-record replace; the months estimate is recomputed
pub async fn replace_product(
    State(state): State<AppState>,
    Query(key): Query<ProductKeyParams>,
    Json(input): Json<ProductInput>,
) -> Result<impl IntoResponse> {
    let product = input.into_product()?;
    let stored = state.products.replace(&key.into_key(), product).await?;
    Ok(Json(stored))
}

/// DELETE /api/products
/// Administrative bulk clear of the whole collection
pub async fn clear_products(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    require_admin(&headers)?;
    let removed = state.products.clear_all().await?;
    tracing::warn!(removed, cleared_by = %caller_email(&headers), "product collection cleared");

    Ok(Json(serde_json::json!({
        "status": "success",
        "removed": removed,
    })))
}

// ── Import ──

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub total: usize,
    pub imported: usize,
    pub already_existing: usize,
    pub duplicates_in_batch: usize,
}

/// POST /api/products/import
/// Multipart CSV upload. In-file duplicates are collapsed by the importer;
/// records already persisted are skipped and counted, never fatal.
pub async fn import_products(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse> {
    let mut file_bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        if field.name() == Some("file") || file_bytes.is_none() {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(e.to_string()))?;
            file_bytes = Some(bytes.to_vec());
        }
    }

    let file_bytes = file_bytes
        .ok_or_else(|| ApiError::BadRequest("missing multipart field 'file'".to_string()))?;

    let batch = importer::ProductCsvImporter::new().import_batch(&file_bytes)?;
    let total = batch.records.len();

    let mut imported = 0usize;
    let mut already_existing = 0usize;
    for product in batch.records {
        match state.products.insert(product).await? {
            InsertOutcome::Inserted => imported += 1,
            InsertOutcome::Duplicate => already_existing += 1,
        }
    }

    tracing::info!(
        imported_by = %caller_email(&headers),
        total,
        imported,
        already_existing,
        duplicates_in_batch = batch.duplicates_in_batch,
        "product import finished"
    );

    Ok(Json(ImportSummary {
        total,
        imported,
        already_existing,
        duplicates_in_batch: batch.duplicates_in_batch,
    }))
}

/// GET /api/products/template
/// Downloadable CSV template matching the import layout
pub async fn download_template() -> Result<impl IntoResponse> {
    let template = importer::template_csv()?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        "text/csv; charset=utf-8".parse().unwrap(),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        format!("attachment; filename=\"{}\"", importer::TEMPLATE_FILE_NAME)
            .parse()
            .unwrap(),
    );

    Ok((StatusCode::OK, headers, template))
}

// ── Product images ──

/// POST /api/products/image?code=...&identificationCode=...
/// Validates size and type before any write, stores the blob, records the URL
pub async fn upload_product_image(
    State(state): State<AppState>,
    Query(key): Query<ProductKeyParams>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse> {
    let key = key.into_key();
    let previous = state
        .products
        .find_by_key(&key)
        .await?
        .ok_or(ApiError::ProductNotFound)?;

    let mut upload: Option<(String, String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        if field.name() == Some("image") || upload.is_none() {
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let name_hint = field.file_name().unwrap_or("imagen").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(e.to_string()))?;
            upload = Some((content_type, name_hint, bytes.to_vec()));
        }
    }

    let (content_type, name_hint, bytes) = upload
        .ok_or_else(|| ApiError::BadRequest("missing multipart field 'image'".to_string()))?;

    validate_image(&content_type, bytes.len())?;

    let public_url = state.images.upload(&bytes, &name_hint).await?;
    let product = state.products.set_image_path(&key, &public_url).await?;

    // Replacing an image leaves no orphan blob behind
    if !previous.image_path.is_empty() {
        if let Err(err) = state.images.delete(&previous.image_path).await {
            tracing::warn!(%err, url = %previous.image_path, "could not remove replaced image");
        }
    }

    Ok(Json(product))
}

/// DELETE /api/products/image?code=...&identificationCode=...
/// Detaches the image from the record and removes the blob
pub async fn delete_product_image(
    State(state): State<AppState>,
    Query(key): Query<ProductKeyParams>,
) -> Result<impl IntoResponse> {
    let key = key.into_key();
    let product = state
        .products
        .find_by_key(&key)
        .await?
        .ok_or(ApiError::ProductNotFound)?;

    if product.image_path.is_empty() {
        return Ok(Json(product));
    }

    let url = product.image_path.clone();
    let updated = state.products.set_image_path(&key, "").await?;
    if let Err(err) = state.images.delete(&url).await {
        tracing::warn!(%err, %url, "could not remove detached image");
    }

    Ok(Json(updated))
}

// ── Auth and users ──

/// Account representation returned by the API; the hash never leaves the server.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub created_at: String,
    pub updated_at: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub active: bool,
    pub temp_password: bool,
    pub must_change_password: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_password_change: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login: Option<String>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            created_at: user.created_at,
            updated_at: user.updated_at,
            name: user.name,
            email: user.email,
            role: user.role,
            active: user.active,
            temp_password: user.temp_password,
            must_change_password: user.must_change_password,
            last_password_change: user.last_password_change,
            created_by: user.created_by,
            last_login: user.last_login,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /api/auth/login
/// Verifies the credentials, stamps the last login, returns the account with
/// its must-change-password flag
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse> {
    if !users::validate_email(&request.email) {
        return Err(ApiError::InvalidCredentials);
    }

    let mut user = state
        .users
        .find_by_email(&request.email)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    if !users::authenticate(&user, &request.password) {
        return Err(ApiError::InvalidCredentials);
    }

    user.last_login = Some(Utc::now().to_rfc3339());
    let user = state.users.update(user).await?;

    Ok(Json(UserView::from(user)))
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub role: Option<Role>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedUserResponse {
    pub user: UserView,
    /// Shown once; never persisted in clear.
    pub temp_password: String,
}

/// POST /api/users
/// Admin creates an account; the response carries the one-time temporary password
pub async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateUserRequest>,
) -> Result<impl IntoResponse> {
    require_admin(&headers)?;

    if !users::validate_email(&request.email) {
        return Err(ApiError::InvalidEmailDomain(users::EMAIL_DOMAIN));
    }

    let created = users::create_user(
        request.name,
        request.email,
        request.role.unwrap_or(Role::User),
        Some(caller_email(&headers)),
    )?;

    let user = state.users.insert(created.user).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedUserResponse {
            user: UserView::from(user),
            temp_password: created.temp_password,
        }),
    ))
}

/// GET /api/users
pub async fn list_users(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let users = state.users.list_all().await?;
    let views: Vec<UserView> = users.into_iter().map(UserView::from).collect();
    Ok(Json(views))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordResponse {
    pub user: UserView,
    pub temp_password: String,
}

/// POST /api/users/:id/reset-password
/// Issues a fresh temporary password and re-arms the must-change flag
pub async fn reset_user_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    require_admin(&headers)?;

    let mut user = state
        .users
        .find_by_id(&id)
        .await?
        .ok_or(ApiError::UserNotFound)?;

    let temp_password = users::reset_password(&mut user)?;
    let user = state.users.update(user).await?;

    Ok(Json(ResetPasswordResponse {
        user: UserView::from(user),
        temp_password,
    }))
}

/// POST /api/users/:id/activate
pub async fn activate_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    set_user_active(state, headers, id, true).await
}

/// POST /api/users/:id/deactivate
pub async fn deactivate_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    set_user_active(state, headers, id, false).await
}

async fn set_user_active(
    state: AppState,
    headers: HeaderMap,
    id: String,
    active: bool,
) -> Result<Json<UserView>> {
    require_admin(&headers)?;

    let mut user = state
        .users
        .find_by_id(&id)
        .await?
        .ok_or(ApiError::UserNotFound)?;

    user.active = active;
    user.updated_at = Utc::now().to_rfc3339();
    let user = state.users.update(user).await?;

    Ok(Json(UserView::from(user)))
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub password: String,
}

/// POST /api/users/:id/password
/// Self-service password change, strength-checked
pub async fn change_user_password(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse> {
    let violations = users::validate_password_strength(&request.password);
    if !violations.is_empty() {
        return Err(ApiError::WeakPassword(violations.join(", ")));
    }

    let mut user = state
        .users
        .find_by_id(&id)
        .await?
        .ok_or(ApiError::UserNotFound)?;

    users::change_password(&mut user, &request.password)?;
    let user = state.users.update(user).await?;

    Ok(Json(UserView::from(user)))
}

// ── Health ──

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "inventario-api"
    }))
}
