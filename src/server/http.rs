use super::state::AppState;
use crate::application::{
    AccountRequest, CheckoutSelection, GalleryError, GenerationError, GuestRequest, ImageSource,
    LedgerError, MonetizationError,
};
use crate::domain::{Account, ImageFormat, PremiumPlan, ShotType, Theme, CREDIT_PACKAGES};
use crate::infrastructure::{ImageProviderError, RepositoryError};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, header::HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/generate", post(generate))
        .route("/api/account", get(get_account))
        .route("/api/packages", get(list_packages))
        .route("/api/events/gift", post(claim_gift))
        .route("/api/payments/checkout", post(create_checkout))
        .route("/api/payments/webhook", post(payments_webhook))
        .route("/api/gallery", get(list_gallery).post(share_to_gallery))
        .route("/api/cleanup", get(run_cleanup).post(run_cleanup))
        .route("/auth/callback", get(auth_callback))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}

fn extract_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|cookies| {
            cookies.split(';').map(str::trim).find_map(|pair| {
                pair.strip_prefix(name)
                    .and_then(|rest| rest.strip_prefix('='))
            })
        })
        .filter(|v| !v.is_empty())
}

fn parse_theme(theme: &str) -> Theme {
    Theme::from_str(theme).unwrap_or_else(|_| Theme::Unknown(theme.to_string()))
}

/// Resolves the bearer token to an account, creating the profile on first
/// sign-in.
async fn resolve_account(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Account, (StatusCode, Json<serde_json::Value>)> {
    let token = extract_bearer_token(headers).ok_or((
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({"error": "Missing or invalid authorization token"})),
    ))?;

    let user = state.auth.get_user(token).await.map_err(|e| {
        info!(error = %e, "Token rejected");
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "Invalid token"})),
        )
    })?;

    state
        .ledger
        .ensure_account(&user.id, &user.email, user.name)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to resolve account");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Failed to resolve account"})),
            )
        })
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        generate,
        get_account,
        list_packages,
        claim_gift,
        create_checkout,
        payments_webhook,
        list_gallery,
        share_to_gallery,
        run_cleanup,
    ),
    components(
        schemas(
            GenerateRequest,
            GiftRequest,
            CheckoutRequest,
            ShareRequest,
            HealthResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Generation", description = "Portrait generation endpoints"),
        (name = "Account", description = "Account profile endpoints"),
        (name = "Payments", description = "Checkout and webhook endpoints"),
        (name = "Gallery", description = "Public gallery endpoints"),
        (name = "Maintenance", description = "Retention cleanup endpoints"),
    ),
    info(
        title = "DearMyKids API",
        version = "0.1.0",
        description = "API for generating future-career portraits of children",
        license(name = "MIT OR Apache-2.0")
    )
)]
struct ApiDoc;

/// Health check response
#[derive(Serialize, ToSchema)]
struct HealthResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Health check endpoint
///
/// Verifies database connectivity and returns service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = HealthResponse)
    )
)]
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match sqlx::query("SELECT 1").fetch_one(&state.pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                error: None,
            }),
        ),
        Err(e) => {
            error!(error = %e, "Health check failed: DB connectivity issue");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy".to_string(),
                    error: Some("Database connectivity failed".to_string()),
                }),
            )
        }
    }
}

#[derive(Deserialize, ToSchema)]
struct GenerateRequest {
    /// Base64-encoded source photo (JPEG)
    image: Option<String>,
    /// Key of an already-uploaded source object, as an alternative to `image`
    storage_path: Option<String>,
    #[schema(example = "astronaut")]
    theme: String,
    #[schema(example = "square")]
    format: Option<String>,
    #[schema(example = "portrait")]
    shot_type: Option<String>,
    /// Force the anonymous flow even when a token is present
    #[serde(default)]
    is_guest: bool,
}

/// Generate a portrait
///
/// With a bearer token the result is stored and billed against the account's
/// free slot or credits. Without one, a single free-combination generation is
/// returned inline and never persisted.
#[utoipa::path(
    post,
    path = "/api/generate",
    tag = "Generation",
    request_body = GenerateRequest,
    responses(
        (status = 200, description = "Portrait generated", body = Object),
        (status = 400, description = "Invalid request", body = Object),
        (status = 402, description = "Not enough credits", body = Object),
        (status = 403, description = "Premium options require an account", body = Object),
        (status = 429, description = "Rate limited by the image provider", body = Object),
        (status = 502, description = "Image provider failed", body = Object)
    )
)]
async fn generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<GenerateRequest>,
) -> impl IntoResponse {
    let theme = parse_theme(&req.theme);

    let source = match (req.image, req.storage_path) {
        (Some(data), _) => ImageSource::Base64(data),
        (None, Some(path)) => ImageSource::StoragePath(path),
        (None, None) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "Source image is required"})),
            );
        }
    };

    let format = match req.format.as_deref() {
        None => ImageFormat::default(),
        Some(s) => match ImageFormat::from_str(s) {
            Ok(f) => f,
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({
                        "error": "Invalid format",
                        "allowed": ["square", "portrait", "landscape"]
                    })),
                );
            }
        },
    };

    let shot_type = match req.shot_type.as_deref() {
        None => ShotType::default(),
        Some(s) => match ShotType::from_str(s) {
            Ok(t) => t,
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({
                        "error": "Invalid shot_type",
                        "allowed": ["portrait", "full_body", "headshot"]
                    })),
                );
            }
        },
    };

    if req.is_guest || extract_bearer_token(&headers).is_none() {
        let request = GuestRequest {
            source,
            theme,
            format,
            shot_type,
        };

        return match state.generation.generate_guest(request).await {
            Ok(result) => (
                StatusCode::OK,
                Json(serde_json::json!({
                    "success": true,
                    "imageUrl": result.data_url,
                })),
            ),
            Err(e) => map_generation_error(e),
        };
    }

    let account = match resolve_account(&state, &headers).await {
        Ok(account) => account,
        Err(resp) => return resp,
    };

    let request = AccountRequest {
        account_id: account.id,
        source,
        theme,
        format,
        shot_type,
    };

    match state.generation.generate_for_account(request).await {
        Ok(result) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "imageId": result.image_id,
                "imageUrl": result.url,
                "isFreeTier": result.is_free_tier,
                "expiresAt": result.expires_at,
            })),
        ),
        Err(e) => map_generation_error(e),
    }
}

fn map_generation_error(e: GenerationError) -> (StatusCode, Json<serde_json::Value>) {
    match e {
        GenerationError::InvalidRequest(msg) => {
            (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": msg})))
        }
        GenerationError::PremiumRequired => (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({
                "error": "Premium options require a signed-in account with credits",
                "code": "PREMIUM_REQUIRED"
            })),
        ),
        GenerationError::NeedsCredits | GenerationError::FreeLimitReached => (
            StatusCode::PAYMENT_REQUIRED,
            Json(serde_json::json!({
                "error": "Not enough credits",
                "needsCredits": true
            })),
        ),
        GenerationError::Provider(ImageProviderError::RateLimited) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({"error": "Rate limited, please retry"})),
        ),
        GenerationError::Provider(e) => {
            error!(error = %e, "Image provider failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({"error": "Image generation failed"})),
            )
        }
        e => {
            error!(error = %e, "Generation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Image generation failed"})),
            )
        }
    }
}

/// Account profile
///
/// Returns the signed-in account's balance, free-slot allowance, and referral
/// code. Creates the profile on first call.
#[utoipa::path(
    get,
    path = "/api/account",
    tag = "Account",
    responses(
        (status = 200, description = "Account profile", body = Object),
        (status = 401, description = "Invalid or missing authorization token", body = Object)
    )
)]
async fn get_account(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let account = match resolve_account(&state, &headers).await {
        Ok(account) => account,
        Err(resp) => return resp,
    };

    let today = Utc::now().date_naive();
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "id": account.id,
            "email": account.email,
            "displayName": account.display_name,
            "credits": account.credits,
            "freeSlotsRemaining": account.free_slots_remaining(today, state.free_daily_limit),
            "isPremium": account.is_premium,
            "subscriptionStatus": account.subscription_status,
            "referralCode": account.referral_code,
        })),
    )
}

/// Credit package catalog
#[utoipa::path(
    get,
    path = "/api/packages",
    tag = "Payments",
    responses((status = 200, description = "Available credit packages", body = Object))
)]
async fn list_packages() -> impl IntoResponse {
    let packages: Vec<_> = CREDIT_PACKAGES
        .iter()
        .map(|p| {
            serde_json::json!({
                "id": p.id,
                "nameKo": p.name_ko,
                "nameEn": p.name_en,
                "descriptionKo": p.description_ko,
                "descriptionEn": p.description_en,
                "credits": p.credits,
                "priceKrw": p.price_krw,
                "priceUsdCents": p.price_usd_cents,
                "popular": p.popular,
                "savingsKo": p.savings_ko,
                "savingsEn": p.savings_en,
            })
        })
        .collect();

    (StatusCode::OK, Json(serde_json::json!({ "packages": packages })))
}

#[derive(Deserialize, ToSchema)]
struct GiftRequest {
    #[schema(example = "trial")]
    package_id: Option<String>,
}

/// Claim the one-time welcome gift
#[utoipa::path(
    post,
    path = "/api/events/gift",
    tag = "Payments",
    request_body = GiftRequest,
    responses(
        (status = 200, description = "Gift outcome", body = Object),
        (status = 400, description = "Unknown package", body = Object),
        (status = 401, description = "Invalid or missing authorization token", body = Object)
    )
)]
async fn claim_gift(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<GiftRequest>,
) -> impl IntoResponse {
    let account = match resolve_account(&state, &headers).await {
        Ok(account) => account,
        Err(resp) => return resp,
    };

    let package_id = req.package_id.as_deref().unwrap_or("trial");
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    match state.ledger.grant_gift(account.id, package_id, user_agent).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "granted": outcome.granted,
                "newCredits": outcome.new_credits,
                "message": outcome.message,
            })),
        ),
        Err(LedgerError::UnknownPackage(p)) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": format!("Unknown package: {}", p)})),
        ),
        Err(e) => {
            error!(error = %e, "Gift claim failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Gift claim failed"})),
            )
        }
    }
}

#[derive(Deserialize, ToSchema)]
struct CheckoutRequest {
    #[schema(example = "starter")]
    package_id: Option<String>,
    #[schema(example = "premium_monthly")]
    plan: Option<String>,
}

/// Create a hosted checkout
#[utoipa::path(
    post,
    path = "/api/payments/checkout",
    tag = "Payments",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Checkout URL", body = Object),
        (status = 400, description = "Invalid selection", body = Object),
        (status = 401, description = "Invalid or missing authorization token", body = Object),
        (status = 503, description = "Item not available for purchase", body = Object)
    )
)]
async fn create_checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CheckoutRequest>,
) -> impl IntoResponse {
    let account = match resolve_account(&state, &headers).await {
        Ok(account) => account,
        Err(resp) => return resp,
    };

    let selection = match (req.package_id, req.plan) {
        (Some(package_id), None) => CheckoutSelection::Package(package_id),
        (None, Some(plan)) => match PremiumPlan::from_str(&plan) {
            Ok(plan) => CheckoutSelection::Plan(plan),
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({
                        "error": "Invalid plan",
                        "allowed": ["premium_monthly", "premium_yearly"]
                    })),
                );
            }
        },
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": "Provide exactly one of package_id or plan"
                })),
            );
        }
    };

    match state.monetization.create_checkout(&account, selection).await {
        Ok(url) => (StatusCode::OK, Json(serde_json::json!({"checkoutUrl": url}))),
        Err(MonetizationError::UnknownPackage(p)) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": format!("Unknown package: {}", p)})),
        ),
        Err(MonetizationError::VariantNotConfigured(item)) => {
            warn!(item, "Checkout for unconfigured item");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({"error": "Item not available for purchase"})),
            )
        }
        Err(e) => {
            error!(error = %e, "Checkout creation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Checkout creation failed"})),
            )
        }
    }
}

/// Payment provider webhook
///
/// Signature is verified against the raw body before any parsing; replayed
/// event ids are acknowledged without side effects.
#[utoipa::path(
    post,
    path = "/api/payments/webhook",
    tag = "Payments",
    responses(
        (status = 200, description = "Event processed", body = Object),
        (status = 400, description = "Malformed payload", body = Object),
        (status = 401, description = "Signature verification failed", body = Object)
    )
)]
async fn payments_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = match headers.get("x-signature").and_then(|v| v.to_str().ok()) {
        Some(s) => s,
        None => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({"error": "Missing signature"})),
            );
        }
    };

    match state.monetization.handle_webhook(&body, signature).await {
        Ok(_) => (StatusCode::OK, Json(serde_json::json!({"received": true}))),
        Err(MonetizationError::InvalidSignature) => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "Invalid signature"})),
        ),
        Err(MonetizationError::InvalidPayload(msg)) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": msg})),
        ),
        Err(e) => {
            error!(error = %e, "Webhook processing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Webhook processing failed"})),
            )
        }
    }
}

/// Public gallery
#[utoipa::path(
    get,
    path = "/api/gallery",
    tag = "Gallery",
    responses(
        (status = 200, description = "Recent public images", body = Object),
        (status = 500, description = "Failed to list gallery", body = Object)
    )
)]
async fn list_gallery(State(state): State<AppState>) -> impl IntoResponse {
    match state.gallery.list_public().await {
        Ok(entries) => {
            let images: Vec<_> = entries
                .into_iter()
                .map(|e| {
                    serde_json::json!({
                        "id": e.id,
                        "url": e.public_url,
                        "theme": e.theme,
                        "createdAt": e.created_at,
                    })
                })
                .collect();
            (StatusCode::OK, Json(serde_json::json!({ "images": images })))
        }
        Err(e) => {
            error!(error = %e, "Failed to list gallery");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Failed to list gallery"})),
            )
        }
    }
}

#[derive(Deserialize, ToSchema)]
struct ShareRequest {
    image_id: Uuid,
}

/// Share an image to the public gallery
///
/// Owner-only. The first share of an image grants a +1 credit bonus.
#[utoipa::path(
    post,
    path = "/api/gallery",
    tag = "Gallery",
    request_body = ShareRequest,
    responses(
        (status = 200, description = "Share outcome", body = Object),
        (status = 401, description = "Invalid or missing authorization token", body = Object),
        (status = 403, description = "Image belongs to another account", body = Object),
        (status = 404, description = "Image not found", body = Object)
    )
)]
async fn share_to_gallery(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ShareRequest>,
) -> impl IntoResponse {
    let account = match resolve_account(&state, &headers).await {
        Ok(account) => account,
        Err(resp) => return resp,
    };

    match state.gallery.share(account.id, req.image_id).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "shared": outcome.shared,
                "bonusGranted": outcome.bonus_granted,
            })),
        ),
        Err(GalleryError::NotOwner) => (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({"error": "Image belongs to another account"})),
        ),
        Err(GalleryError::Repository(RepositoryError::NotFound(_))) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Image not found"})),
        ),
        Err(e) => {
            error!(error = %e, "Gallery share failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Gallery share failed"})),
            )
        }
    }
}

/// Retention cleanup
///
/// Deletes results past their retention deadline. Authorized by the cleanup
/// secret (manual runs) or the scheduler secret (cron).
#[utoipa::path(
    post,
    path = "/api/cleanup",
    tag = "Maintenance",
    responses(
        (status = 200, description = "Sweep report", body = Object),
        (status = 401, description = "Invalid or missing authorization token", body = Object),
        (status = 500, description = "Sweep failed", body = Object)
    )
)]
async fn run_cleanup(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let authorized = match extract_bearer_token(&headers) {
        Some(token) => {
            token == state.cleanup_secret
                || state.scheduler_secret.as_deref() == Some(token)
        }
        None => false,
    };
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "Missing or invalid authorization token"})),
        );
    }

    match state.retention.sweep(Utc::now()).await {
        Ok(report) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "deleted": report.deleted,
                "storageFailures": report.storage_failures,
            })),
        ),
        Err(e) => {
            error!(error = %e, "Retention sweep failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Sweep failed"})),
            )
        }
    }
}

#[derive(Deserialize)]
struct AuthCallbackParams {
    code: Option<String>,
    next: Option<String>,
}

const REFERRAL_COOKIE: &str = "dearmykids_referral";

/// OAuth callback: exchanges the code, provisions the account on first
/// sign-in, applies any referral cookie, and redirects into the app.
async fn auth_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<AuthCallbackParams>,
) -> Response {
    let next = params
        .next
        .filter(|n| n.starts_with('/') && !n.starts_with("//"))
        .unwrap_or_else(|| "/create".to_string());

    let code = match params.code {
        Some(code) => code,
        None => return Redirect::to(&state.app_base_url).into_response(),
    };

    let user = match state.auth.exchange_code(&code).await {
        Ok(user) => user,
        Err(e) => {
            warn!(error = %e, "Auth code exchange failed");
            return Redirect::to(&format!("{}/login?error=auth", state.app_base_url))
                .into_response();
        }
    };

    let account = match state.ledger.ensure_account(&user.id, &user.email, user.name).await {
        Ok(account) => account,
        Err(e) => {
            error!(error = %e, "Failed to provision account");
            return Redirect::to(&format!("{}/login?error=auth", state.app_base_url))
                .into_response();
        }
    };

    if account.referred_by.is_none() {
        if let Some(code) = extract_cookie(&headers, REFERRAL_COOKIE) {
            if let Err(e) = state.ledger.apply_referral_bonus(account.id, code).await {
                warn!(error = %e, "Referral bonus failed");
            }
        }
    }

    Redirect::to(&format!("{}{}", state.app_base_url, next)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn extract_bearer_token_happy_path() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(extract_bearer_token(&headers), Some("abc123"));
    }

    #[test]
    fn extract_bearer_token_rejects_missing_or_empty() {
        let headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), None);

        let mut headers2 = HeaderMap::new();
        headers2.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer_token(&headers2), None);
    }

    #[test]
    fn extract_bearer_token_rejects_wrong_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc123"));
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn extract_cookie_finds_the_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("session=s1; dearmykids_referral=ABCD2345; theme=dark"),
        );
        assert_eq!(
            extract_cookie(&headers, "dearmykids_referral"),
            Some("ABCD2345")
        );
        assert_eq!(extract_cookie(&headers, "missing"), None);
    }

    #[test]
    fn extract_cookie_rejects_empty_values_and_prefix_names() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("dearmykids_referral=; dearmykids_referral_v2=XYZ"),
        );
        assert_eq!(extract_cookie(&headers, "dearmykids_referral"), None);
    }

    #[test]
    fn unknown_theme_parses_to_fallback() {
        assert_eq!(parse_theme("astronaut"), Theme::Astronaut);
        assert_eq!(parse_theme("wizard"), Theme::Unknown("wizard".to_string()));
    }
}
