use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::{info, warn};
use uuid::Uuid;

use outreach_db::models::NewApplication;
use outreach_types::api::{Claims, ManualApplicationRequest};
use outreach_types::models::{Application, ApplicationStatus, Source};

use crate::error::ApiError;
use crate::state::{AppState, run_db};

/// Record an application made outside the mail transport. No email is sent
/// and the record starts as `Not Applied`.
pub async fn log_manual(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ManualApplicationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let application = log_manual_application(&state, &claims, req).await?;
    Ok((StatusCode::CREATED, Json(application)))
}

pub async fn log_manual_application(
    state: &AppState,
    claims: &Claims,
    req: ManualApplicationRequest,
) -> Result<Application, ApiError> {
    let name = req.counterparty_name.trim().to_string();
    let email = req.counterparty_email.trim().to_string();
    let role = req.role.trim().to_string();
    if name.is_empty() || email.is_empty() || role.is_empty() {
        return Err(ApiError::BadRequest(
            "counterparty_name, counterparty_email and role are required".into(),
        ));
    }
    let company = req.company.filter(|c| !c.trim().is_empty());
    let source = req.source.unwrap_or(Source::Manual);

    let id = Uuid::new_v4().to_string();
    let uid = claims.sub.to_string();
    let owner_email = claims.email.clone();
    let row = run_db(state, move |db| {
        db.ensure_user(&uid, &owner_email)?;
        db.insert_application(&NewApplication {
            id: &id,
            user_id: &uid,
            counterparty_name: &name,
            counterparty_email: &email,
            role: &role,
            company: company.as_deref(),
            source,
            thread_id: None,
            message_id: None,
            status: ApplicationStatus::NotApplied,
        })
    })
    .await?;

    info!("Logged manual application {} for {}", row.id, claims.sub);
    Ok(row.into_model()?)
}

/// The caller's records, newest first.
pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let rows = run_db(&state, move |db| db.list_applications_by_owner(&uid)).await?;

    let applications: Vec<Application> = rows
        .into_iter()
        .filter_map(|row| {
            let id = row.id.clone();
            row.into_model()
                .map_err(|e| warn!("Skipping corrupt application '{}': {:#}", id, e))
                .ok()
        })
        .collect();

    Ok(Json(applications))
}
