use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Multipart, Path, Query, Request, State};
use axum::http::{header, HeaderMap, Response, StatusCode};
use axum::middleware::Next;
use axum::{Extension, Json};
use doc_plane::{
    AccessDecision, Action, Claims, DocumentDetail, IngestionDetail, IngestionPatch,
    IngestionStatus, NewDocument, Page, PageRequest, Principal, RegisterRequest, Role, UserPatch,
    UserSummary,
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
}

impl ListQuery {
    fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page.unwrap_or(1), self.limit.unwrap_or(10))
    }
}

#[derive(Deserialize)]
pub struct IngestionListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<IngestionStatus>,
}

#[derive(Deserialize)]
pub struct RenameRequest {
    pub filename: String,
}

#[derive(Deserialize)]
pub struct TriggerRequest {
    pub document_id: i64,
}

#[derive(Deserialize)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

fn principal(claims: &Claims) -> Principal {
    Principal {
        id: claims.sub,
        role: claims.role,
    }
}

fn authorize(
    state: &AppState,
    claims: &Claims,
    action: Action,
    owner_id: Option<i64>,
) -> Result<(), AppError> {
    let principal = principal(claims);
    match state.access.check(Some(&principal), action, owner_id) {
        AccessDecision::Allow => Ok(()),
        AccessDecision::Deny => Err(AppError::forbidden("insufficient permissions")),
    }
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").or_else(|| value.strip_prefix("bearer "))?;
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

pub async fn bearer_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response<Body>, AppError> {
    let token = extract_bearer_token(req.headers())
        .ok_or_else(|| AppError::unauthorized("missing bearer token"))?;
    let claims = state.auth.verify_token(&token)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserSummary>), AppError> {
    let user = state.auth.register(payload)?;
    Ok((StatusCode::CREATED, Json(user.summary())))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let access_token = state.auth.login(&payload.email, &payload.password)?;
    Ok(Json(LoginResponse { access_token }))
}

/// Tokens are stateless, so logout is a client-side contract: the server
/// acknowledges and the client discards the token.
pub async fn logout(Extension(_claims): Extension<Claims>) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "logged out".to_string(),
    })
}

pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<DocumentDetail>>, AppError> {
    authorize(&state, &claims, Action::ListDocuments, None)?;
    // Non-admins only ever see their own uploads.
    let owner_filter = match claims.role {
        Role::Admin => None,
        _ => Some(claims.sub),
    };
    let page = state
        .documents
        .find_all(query.page_request(), query.search.as_deref(), owner_filter);
    Ok(Json(page))
}

pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<DocumentDetail>), AppError> {
    authorize(&state, &claims, Action::UploadDocument, None)?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(err.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::bad_request("file field is missing a filename"))?;
        let mimetype = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|err| AppError::bad_request(err.to_string()))?;
        let url = state
            .storage
            .upload(&filename, &mimetype, bytes.to_vec())
            .await?;
        let detail = state.documents.save(NewDocument {
            filename,
            mimetype,
            url,
            owner_id: Some(claims.sub),
        })?;
        return Ok((StatusCode::CREATED, Json(detail)));
    }
    Err(AppError::bad_request("multipart field \"file\" is required"))
}

pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, AppError> {
    let document = state.documents.find_one(id)?;
    authorize(
        &state,
        &claims,
        Action::DeleteDocument,
        document.document.owner_id,
    )?;
    state.documents.delete(id)?;
    Ok(Json(MessageResponse {
        message: "document deleted".to_string(),
    }))
}

pub async fn rename_document(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<RenameRequest>,
) -> Result<Json<DocumentDetail>, AppError> {
    let document = state.documents.find_one(id)?;
    authorize(
        &state,
        &claims,
        Action::RenameDocument,
        document.document.owner_id,
    )?;
    let detail = state.documents.rename(id, payload.filename)?;
    Ok(Json(detail))
}

pub async fn trigger_ingestion(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<TriggerRequest>,
) -> Result<(StatusCode, Json<IngestionDetail>), AppError> {
    authorize(&state, &claims, Action::TriggerIngestion, None)?;
    let detail = state.ingestions.trigger(payload.document_id, claims.sub)?;
    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn list_ingestions(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<IngestionListQuery>,
) -> Result<Json<Page<IngestionDetail>>, AppError> {
    authorize(&state, &claims, Action::ListIngestions, None)?;
    let request = PageRequest::new(query.page.unwrap_or(1), query.limit.unwrap_or(10));
    Ok(Json(state.ingestions.find_all(request, query.status)))
}

pub async fn get_ingestion(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<IngestionDetail>, AppError> {
    authorize(&state, &claims, Action::GetIngestion, None)?;
    Ok(Json(state.ingestions.find_one(id)?))
}

pub async fn update_ingestion_status(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(patch): Json<IngestionPatch>,
) -> Result<Json<doc_plane::Ingestion>, AppError> {
    authorize(&state, &claims, Action::UpdateIngestionStatus, None)?;
    Ok(Json(state.ingestions.update_status(id, patch)?))
}

pub async fn cancel_ingestion(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<doc_plane::Ingestion>, AppError> {
    let ingestion = state.ingestions.find_one(id)?;
    authorize(
        &state,
        &claims,
        Action::CancelIngestion,
        Some(ingestion.ingestion.triggered_by_id),
    )?;
    Ok(Json(state.ingestions.cancel(id)?))
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<UserSummary>>, AppError> {
    authorize(&state, &claims, Action::ListUsers, None)?;
    let page = state
        .users
        .find_all(query.page_request(), query.search.as_deref());
    Ok(Json(Page {
        total: page.total,
        data: page.data.into_iter().map(|u| u.summary()).collect(),
    }))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<UserSummary>, AppError> {
    authorize(&state, &claims, Action::GetUser, None)?;
    Ok(Json(state.users.find_by_id(id)?.summary()))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(patch): Json<UserPatch>,
) -> Result<Json<UserSummary>, AppError> {
    authorize(&state, &claims, Action::UpdateUserDetail, Some(id))?;
    Ok(Json(state.users.update_detail(id, patch)?.summary()))
}

pub async fn update_user_role(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateRoleRequest>,
) -> Result<Json<UserSummary>, AppError> {
    authorize(&state, &claims, Action::UpdateUserRole, None)?;
    Ok(Json(state.users.update_role(id, payload.role)?.summary()))
}
