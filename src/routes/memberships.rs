use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::db;
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::models::membership::{
    CreateMembership, CreateMembershipType, Membership, MembershipType, UpdateMembershipType,
};
use crate::models::user::Role;
use crate::models::DataResponse;
use crate::state::AppState;

fn validate_type_fields(
    title: Option<&str>,
    amount: Option<i64>,
    stripe_id: Option<&str>,
) -> Result<(), AppError> {
    if title.is_some_and(|t| t.trim().is_empty()) {
        return Err(AppError::BadRequest("title is required".to_string()));
    }
    if amount.is_some_and(|a| a < 0) {
        return Err(AppError::BadRequest("amount cannot be negative".to_string()));
    }
    if stripe_id.is_some_and(|s| s.trim().is_empty()) {
        return Err(AppError::BadRequest("stripe id is required".to_string()));
    }
    Ok(())
}

pub async fn list_types(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<DataResponse<Vec<MembershipType>>>, AppError> {
    auth.restrict_to(&[Role::Admin])?;
    let types = db::memberships::list_types(&state.db).await?;
    Ok(Json(DataResponse::new(types)))
}

pub async fn create_type(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(input): Json<CreateMembershipType>,
) -> Result<(StatusCode, Json<DataResponse<MembershipType>>), AppError> {
    auth.restrict_to(&[Role::Admin])?;
    validate_type_fields(
        Some(&input.title),
        Some(input.amount),
        Some(&input.stripe_id),
    )?;
    let created = db::memberships::create_type(&state.db, &input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(created))))
}

pub async fn get_type(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(type_id): Path<String>,
) -> Result<Json<DataResponse<MembershipType>>, AppError> {
    auth.restrict_to(&[Role::Admin])?;
    let found = db::memberships::get_type(&state.db, &type_id).await?;
    Ok(Json(DataResponse::new(found)))
}

pub async fn update_type(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(type_id): Path<String>,
    Json(input): Json<UpdateMembershipType>,
) -> Result<Json<DataResponse<MembershipType>>, AppError> {
    auth.restrict_to(&[Role::Admin])?;
    validate_type_fields(
        input.title.as_deref(),
        input.amount,
        input.stripe_id.as_deref(),
    )?;
    let updated = db::memberships::update_type(&state.db, &type_id, &input).await?;
    Ok(Json(DataResponse::new(updated)))
}

pub async fn delete_type(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(type_id): Path<String>,
) -> Result<StatusCode, AppError> {
    auth.restrict_to(&[Role::Admin])?;
    db::memberships::delete_type(&state.db, &type_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_memberships(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<DataResponse<Vec<Membership>>>, AppError> {
    auth.restrict_to(&[Role::Admin])?;
    let memberships = db::memberships::list_memberships(&state.db).await?;
    Ok(Json(DataResponse::new(memberships)))
}

pub async fn create_membership(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(input): Json<CreateMembership>,
) -> Result<(StatusCode, Json<DataResponse<Membership>>), AppError> {
    auth.restrict_to(&[Role::Admin])?;
    if input.amount < 0 {
        return Err(AppError::BadRequest("amount cannot be negative".to_string()));
    }
    if let Some(ref expires_at) = input.expires_at {
        chrono::DateTime::parse_from_rfc3339(expires_at).map_err(|_| {
            AppError::BadRequest("expiresAt must be an RFC 3339 timestamp".to_string())
        })?;
    }
    let created = db::memberships::create_membership(&state.db, &input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(created))))
}
