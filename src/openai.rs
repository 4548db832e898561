//! Minimal OpenAI client for the tutor.
//!
//! We call chat.completions in plain-text mode (the response is parsed
//! leniently by `extract`, not by the provider), audio.transcriptions for
//! spoken questions and audio.speech to read answers aloud. Calls are instrumented and log model names, latencies, and
//! response sizes (not contents).
//!
//! NOTE: We never log the API key.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::ProviderError;
use crate::domain::Subject;
use crate::tutor::{Generator, Synthesizer, Transcriber};

const CLIENT_UA: &str = "tutor-backend/0.1";

const TUTOR_SYSTEM: &str = "You are a patient, precise tutor. Follow the requested output format exactly.";

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
  pub transcribe_model: String,
  pub tts_model: String,
  pub temperature: f32,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let transcribe_model =
      std::env::var("OPENAI_TRANSCRIBE_MODEL").unwrap_or_else(|_| "whisper-1".into());
    let tts_model = std::env::var("OPENAI_TTS_MODEL").unwrap_or_else(|_| "tts-1".into());

    // answers with full practice + concepts sections can take a while
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(60))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, model, transcribe_model, tts_model, temperature: 0.4 })
  }

  /// Plain-text chat completion.
  #[instrument(level = "info", skip(self, system, user), fields(model = %self.model))]
  async fn chat_plain(&self, system: &str, user: &str) -> Result<String, ProviderError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature: self.temperature,
    };

    let res = self.client.post(&url)
      .header(USER_AGENT, CLIENT_UA)
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await?;
    let res = check_status(res).await?;

    let body: ChatCompletionResponse = res.json().await?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default();

    Ok(text)
  }
}

#[async_trait]
impl Generator for OpenAI {
  async fn generate_text(&self, prompt: &str) -> Result<String, ProviderError> {
    self.chat_plain(TUTOR_SYSTEM, prompt).await
  }
}

#[async_trait]
impl Transcriber for OpenAI {
  #[instrument(level = "info", skip(self, audio), fields(model = %self.transcribe_model, audio_len = audio.len(), %mime))]
  async fn transcribe(&self, audio: Vec<u8>, mime: &str) -> Result<String, ProviderError> {
    let url = format!("{}/audio/transcriptions", self.base_url);
    let part = reqwest::multipart::Part::bytes(audio)
      .file_name(audio_file_name(mime))
      .mime_str(mime)?;
    let form = reqwest::multipart::Form::new()
      .part("file", part)
      .text("model", self.transcribe_model.clone());

    let start = Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, CLIENT_UA)
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .multipart(form).send().await?;
    let res = check_status(res).await?;

    let body: TranscriptionResponse = res.json().await?;
    info!(elapsed = ?start.elapsed(), text_len = body.text.len(), "Transcription received");
    Ok(body.text)
  }
}

#[async_trait]
impl Synthesizer for OpenAI {
  #[instrument(level = "info", skip(self, text), fields(model = %self.tts_model, text_len = text.len(), voice = voice_for(subject)))]
  async fn synthesize(&self, text: &str, subject: Subject) -> Result<Vec<u8>, ProviderError> {
    let url = format!("{}/audio/speech", self.base_url);
    let req = SpeechRequest {
      model: self.tts_model.clone(),
      input: text.into(),
      voice: voice_for(subject).into(),
      response_format: "mp3".into(),
    };

    let start = Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, CLIENT_UA)
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await?;
    let res = check_status(res).await?;

    let audio = res.bytes().await?;
    info!(elapsed = ?start.elapsed(), audio_len = audio.len(), "Speech received");
    Ok(audio.to_vec())
  }
}

/// Each subject has its own tutor voice.
fn voice_for(subject: Subject) -> &'static str {
  match subject {
    Subject::Math => "onyx",
    Subject::Science => "nova",
  }
}

/// Turn a non-2xx response into `ProviderError::Api` with the cleanest message we can find.
async fn check_status(res: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
  let status = res.status();
  if status.is_success() {
    return Ok(res);
  }
  let body = res.text().await.unwrap_or_default();
  let message = extract_openai_error(&body).unwrap_or(body);
  Err(ProviderError::Api { status: status.as_u16(), message })
}

/// The transcription endpoint sniffs the format from the file extension.
fn audio_file_name(mime: &str) -> String {
  let essence = mime.split(';').next().unwrap_or_default().trim();
  let ext = match essence {
    "audio/webm" | "video/webm" => "webm",
    "audio/ogg" => "ogg",
    "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
    "audio/mpeg" | "audio/mp3" => "mp3",
    "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "m4a",
    "audio/flac" => "flac",
    _ => "webm",
  };
  format!("speech.{ext}")
}

// --- DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
  #[serde(default)] text: String,
}

#[derive(Serialize)]
struct SpeechRequest {
  model: String,
  input: String,
  voice: String,
  response_format: String,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
