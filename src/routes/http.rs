//! HTTP endpoint handlers. These are thin wrappers that forward to the tutor.
//! Each handler is instrumented and logs basic request/result info.

use std::sync::Arc;
use axum::{
  extract::State,
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{info, instrument, warn};

use crate::error::TutorError;
use crate::protocol::*;
use crate::render::render_markdown;
use crate::state::AppState;
use crate::tutor::TutorAnswer;

impl IntoResponse for TutorError {
  fn into_response(self) -> Response {
    let status = match &self {
      TutorError::EmptyQuestion
      | TutorError::EmptyAudio
      | TutorError::InvalidAudio(_)
      | TutorError::EmptySpeech => StatusCode::BAD_REQUEST,
      TutorError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
      TutorError::Provider(_) => StatusCode::BAD_GATEWAY,
    };
    warn!(target: "tutor_backend", %status, error = %self, "HTTP request failed");
    (status, Json(ErrorOut { error: self.user_message().to_string() })).into_response()
  }
}

fn answer_out(answer: TutorAnswer) -> AnswerOut {
  let html = render_markdown(&answer.content.steps);
  AnswerOut { content: answer.content, html, charts: answer.charts }
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, generator: state.tutor.is_enabled() })
}

#[instrument(level = "info", skip(state, body), fields(question_len = body.question.len(), style = %body.teaching_style))]
pub async fn http_post_ask(
  State(state): State<Arc<AppState>>,
  Json(body): Json<AskIn>,
) -> Result<Json<AnswerOut>, TutorError> {
  let answer = state.tutor.answer(&body.into_question()).await?;
  info!(target: "tutor", charts = answer.charts.len(), "HTTP ask answered");
  Ok(Json(answer_out(answer)))
}

#[instrument(level = "info", skip(state, body), fields(question_len = body.question.len()))]
pub async fn http_post_prompt(
  State(state): State<Arc<AppState>>,
  Json(body): Json<AskIn>,
) -> impl IntoResponse {
  let prompt = state.tutor.prompt_for(&body.into_question());
  Json(PromptOut { prompt })
}

#[instrument(level = "info", skip(state, body), fields(raw_len = body.raw.len()))]
pub async fn http_post_format(
  State(state): State<Arc<AppState>>,
  Json(body): Json<FormatIn>,
) -> impl IntoResponse {
  Json(answer_out(state.tutor.process_raw(&body.raw, &body.question)))
}

#[instrument(level = "info", skip(state, body), fields(b64_len = body.audio_base64.len(), mime = %body.mime))]
pub async fn http_post_transcribe(
  State(state): State<Arc<AppState>>,
  Json(body): Json<TranscribeIn>,
) -> Result<Json<TranscribeOut>, TutorError> {
  let text = state.tutor.transcribe_base64(&body.audio_base64, &body.mime).await?;
  info!(target: "tutor", text_len = text.len(), "HTTP transcription done");
  Ok(Json(TranscribeOut { text }))
}

#[instrument(level = "info", skip(state, body), fields(text_len = body.text.len(), subject = body.subject.as_str()))]
pub async fn http_post_speak(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SpeakIn>,
) -> Result<Json<SpeechOut>, TutorError> {
  let speech = state.tutor.speak(&body.text, body.subject).await?;
  info!(target: "tutor", audio_len = speech.audio.len(), "HTTP speech done");
  Ok(Json(SpeechOut { audio_base64: speech.to_base64(), mime: speech.mime.into() }))
}
