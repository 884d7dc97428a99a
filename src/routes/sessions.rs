use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use uuid::Uuid;
use validator::Validate;

use crate::dto::public_dto::{
    AnswerResponse, FlagResponse, NavigationAction, NavigationRequest, SessionView,
    SetAnswerRequest, SubmitRequest, SubmitResponse,
};
use crate::engine::SessionHandle;
use crate::error::{Error, Result};
use crate::models::test_attempt::SubmitTrigger;
use crate::models::user::CurrentUser;
use crate::AppState;

async fn view(handle: &SessionHandle) -> SessionView {
    let autosave = handle.autosave_status();
    let session = handle.lock().await;
    SessionView::build(&session, autosave)
}

async fn answer_view(handle: &SessionHandle, question_id: &str) -> Result<AnswerResponse> {
    let session = handle.lock().await;
    let answer = session.get_answer(question_id)?.cloned();
    Ok(AnswerResponse {
        question_id: question_id.to_string(),
        answered: answer.as_ref().is_some_and(|a| a.has_content()),
        flagged: session.is_flagged(question_id),
        answer,
    })
}

#[axum::debug_handler]
pub async fn start_session(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(test_id): Path<Uuid>,
) -> Result<Response> {
    let handle = state.attempts.start_session(&user, test_id).await?;
    Ok((StatusCode::CREATED, Json(view(&handle).await)).into_response())
}

#[axum::debug_handler]
pub async fn resume_session(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(attempt_id): Path<Uuid>,
) -> Result<Response> {
    let handle = state.attempts.resume_session(&user, attempt_id).await?;
    Ok(Json(view(&handle).await).into_response())
}

#[axum::debug_handler]
pub async fn get_session(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(attempt_id): Path<Uuid>,
) -> Result<Response> {
    let handle = state.attempts.session(&user, attempt_id).await?;
    Ok(Json(view(&handle).await).into_response())
}

#[axum::debug_handler]
pub async fn set_answer(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path((attempt_id, question_id)): Path<(Uuid, String)>,
    Json(req): Json<SetAnswerRequest>,
) -> Result<Response> {
    let handle = state.attempts.owned_session(&user, attempt_id).await?;
    handle
        .with_session(|s| s.set_answer(&question_id, req.answer))
        .await?;
    Ok(Json(answer_view(&handle, &question_id).await?).into_response())
}

#[axum::debug_handler]
pub async fn get_answer(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path((attempt_id, question_id)): Path<(Uuid, String)>,
) -> Result<Response> {
    let handle = state.attempts.session(&user, attempt_id).await?;
    Ok(Json(answer_view(&handle, &question_id).await?).into_response())
}

#[axum::debug_handler]
pub async fn clear_answer(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path((attempt_id, question_id)): Path<(Uuid, String)>,
) -> Result<Response> {
    let handle = state.attempts.owned_session(&user, attempt_id).await?;
    handle.with_session(|s| s.clear_answer(&question_id)).await?;
    Ok(Json(answer_view(&handle, &question_id).await?).into_response())
}

#[axum::debug_handler]
pub async fn toggle_flag(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path((attempt_id, question_id)): Path<(Uuid, String)>,
) -> Result<Response> {
    let handle = state.attempts.owned_session(&user, attempt_id).await?;
    let flagged = handle.with_session(|s| s.toggle_flag(&question_id)).await?;
    Ok(Json(FlagResponse {
        question_id,
        flagged,
    })
    .into_response())
}

#[axum::debug_handler]
pub async fn navigate(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(attempt_id): Path<Uuid>,
    Json(req): Json<NavigationRequest>,
) -> Result<Response> {
    req.validate()?;
    let handle = state.attempts.owned_session(&user, attempt_id).await?;
    let index = || {
        req.index
            .ok_or_else(|| Error::BadRequest("index is required for this action".to_string()))
    };
    handle
        .with_session(|s| match req.action {
            NavigationAction::Next => s.next(),
            NavigationAction::Previous => s.previous(),
            NavigationAction::GoTo => s.go_to(index()?),
            NavigationAction::Section => s.go_to_section(index()?),
        })
        .await?;
    Ok(Json(view(&handle).await).into_response())
}

#[axum::debug_handler]
pub async fn submit_session(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(attempt_id): Path<Uuid>,
    Json(req): Json<SubmitRequest>,
) -> Result<Response> {
    req.validate()?;
    let receipt = state
        .attempts
        .submit(&user, attempt_id, SubmitTrigger::Manual)
        .await?;
    let status = if receipt.persisted() || receipt.already_submitted {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };
    Ok((status, Json(SubmitResponse::from(receipt))).into_response())
}

#[axum::debug_handler]
pub async fn get_result(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(attempt_id): Path<Uuid>,
) -> Result<Response> {
    let report = state.attempts.result(&user, attempt_id).await?;
    Ok(Json(report).into_response())
}
