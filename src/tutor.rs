//! The tutoring pipeline: question → prompt → generator → extraction → whiteboard.
//!
//! `Tutor` is constructed once (see `AppState`) with its providers injected and
//! handed to request handlers; it holds no mutable state. Only the provider
//! calls can fail. Everything after the generator returns is infallible and
//! always yields complete `WhiteboardContent`.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use base64::Engine;
use tracing::{debug, error, info, instrument};

use crate::config::{Prompts, SamplingConfig};
use crate::domain::{Subject, TutorQuestion, WhiteboardContent};
use crate::error::{ProviderError, TutorError};
use crate::extract::{extract_graph_blocks, extract_structured, strip_graph_blocks};
use crate::format::format_whiteboard_content;
use crate::graph::{chart_from_function, ChartSpec};
use crate::prompt::build_prompt;

/// Anything that turns a prompt into free text. The output is not trusted to
/// follow the requested JSON shape.
#[async_trait]
pub trait Generator: Send + Sync {
  async fn generate_text(&self, prompt: &str) -> Result<String, ProviderError>;
}

/// Speech-to-text for captured audio.
#[async_trait]
pub trait Transcriber: Send + Sync {
  async fn transcribe(&self, audio: Vec<u8>, mime: &str) -> Result<String, ProviderError>;
}

/// Text-to-speech in the voice of the subject's tutor. Returns MP3 bytes.
#[async_trait]
pub trait Synthesizer: Send + Sync {
  async fn synthesize(&self, text: &str, subject: Subject) -> Result<Vec<u8>, ProviderError>;
}

pub const SPEECH_MIME: &str = "audio/mpeg";

/// Longest text sent for synthesis, in chars; the rest is not read aloud.
pub const MAX_SPEECH_CHARS: usize = 4096;

#[derive(Clone, Debug)]
pub struct Speech {
  pub audio: Vec<u8>,
  pub mime: &'static str,
}

impl Speech {
  pub fn to_base64(&self) -> String {
    base64::engine::general_purpose::STANDARD.encode(&self.audio)
  }
}

/// Pipeline result: the whiteboard plus any charts for the graph pane.
#[derive(Clone, Debug)]
pub struct TutorAnswer {
  pub content: WhiteboardContent,
  pub charts: Vec<ChartSpec>,
}

#[derive(Clone)]
pub struct Tutor {
  generator: Option<Arc<dyn Generator>>,
  transcriber: Option<Arc<dyn Transcriber>>,
  synthesizer: Option<Arc<dyn Synthesizer>>,
  prompts: Prompts,
  sampling: SamplingConfig,
}

impl Tutor {
  pub fn new(
    generator: Option<Arc<dyn Generator>>,
    transcriber: Option<Arc<dyn Transcriber>>,
    prompts: Prompts,
    sampling: SamplingConfig,
  ) -> Self {
    Self { generator, transcriber, synthesizer: None, prompts, sampling }
  }

  pub fn with_synthesizer(mut self, synthesizer: Option<Arc<dyn Synthesizer>>) -> Self {
    self.synthesizer = synthesizer;
    self
  }

  pub fn is_enabled(&self) -> bool { self.generator.is_some() }

  pub fn prompt_for(&self, question: &TutorQuestion) -> String {
    build_prompt(&self.prompts, question.subject, &question.text, question.teaching_style.as_tag())
  }

  /// Offline half of the pipeline: raw model text → whiteboard + charts.
  #[instrument(level = "debug", skip(self, raw, question), fields(raw_len = raw.len()))]
  pub fn process_raw(&self, raw: &str, question: &str) -> TutorAnswer {
    let mut charts = extract_graph_blocks(raw);
    let extraction = extract_structured(&strip_graph_blocks(raw));
    let content = format_whiteboard_content(&extraction, question, &self.sampling);

    if let Some(f) = content.visual.as_function().filter(|f| !f.points.is_empty()) {
      charts.insert(0, chart_from_function(f));
    }

    info!(
      target: "tutor",
      outcome = extraction.outcome(),
      problems = content.practice.problems.len(),
      related_topics = content.concepts.related_topics.len(),
      charts = charts.len(),
      "Model response formatted"
    );
    TutorAnswer { content, charts }
  }

  /// Run the full pipeline for one question.
  #[instrument(
    level = "info",
    skip(self, question),
    fields(question_len = question.text.len(), style = %question.teaching_style, subject = question.subject.as_str())
  )]
  pub async fn answer(&self, question: &TutorQuestion) -> Result<TutorAnswer, TutorError> {
    if question.text.trim().is_empty() {
      return Err(TutorError::EmptyQuestion);
    }
    let generator = self.generator.as_ref().ok_or(TutorError::Unavailable)?;

    let prompt = self.prompt_for(question);
    let start = Instant::now();
    let raw = match generator.generate_text(&prompt).await {
      Ok(raw) => raw,
      Err(e) => {
        error!(target: "tutor", elapsed = ?start.elapsed(), error = %e, "Generator call failed");
        return Err(e.into());
      }
    };
    info!(target: "tutor", elapsed = ?start.elapsed(), prompt_len = prompt.len(), raw_len = raw.len(), "Generator responded");

    Ok(self.process_raw(&raw, &question.text))
  }

  /// Decode base64 audio and transcribe it.
  #[instrument(level = "info", skip(self, audio_base64), fields(b64_len = audio_base64.len(), %mime))]
  pub async fn transcribe_base64(&self, audio_base64: &str, mime: &str) -> Result<String, TutorError> {
    let transcriber = self.transcriber.as_ref().ok_or(TutorError::Unavailable)?;
    let audio = base64::engine::general_purpose::STANDARD.decode(audio_base64.trim())?;
    if audio.is_empty() {
      return Err(TutorError::EmptyAudio);
    }
    match transcriber.transcribe(audio, mime).await {
      Ok(text) => Ok(text.trim().to_string()),
      Err(e) => {
        error!(target: "tutor", error = %e, "Transcription failed");
        Err(e.into())
      }
    }
  }

  /// Read `text` aloud in the subject's voice.
  #[instrument(level = "info", skip(self, text), fields(text_len = text.len(), subject = subject.as_str()))]
  pub async fn speak(&self, text: &str, subject: Subject) -> Result<Speech, TutorError> {
    let text = text.trim();
    if text.is_empty() {
      return Err(TutorError::EmptySpeech);
    }
    let synthesizer = self.synthesizer.as_ref().ok_or(TutorError::Unavailable)?;
    let text = match text.char_indices().nth(MAX_SPEECH_CHARS) {
      Some((cut, _)) => {
        debug!(target: "tutor", chars = MAX_SPEECH_CHARS, "Speech text truncated");
        &text[..cut]
      }
      None => text,
    };

    let start = Instant::now();
    match synthesizer.synthesize(text, subject).await {
      Ok(audio) => {
        info!(target: "tutor", elapsed = ?start.elapsed(), audio_len = audio.len(), "Speech synthesized");
        Ok(Speech { audio, mime: SPEECH_MIME })
      }
      Err(e) => {
        error!(target: "tutor", elapsed = ?start.elapsed(), error = %e, "Speech synthesis failed");
        Err(e.into())
      }
    }
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;

  use super::*;
  use crate::domain::TeachingStyle;

  /// Generator that replays a canned response and records prompts.
  pub(crate) struct FakeGenerator {
    pub reply: Result<String, u16>,
    pub delay_ms: u64,
    pub calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
  }

  impl FakeGenerator {
    pub(crate) fn replying(text: &str) -> Self {
      Self { reply: Ok(text.to_string()), delay_ms: 0, calls: AtomicUsize::new(0), prompts: Mutex::new(vec![]) }
    }

    pub(crate) fn failing(status: u16) -> Self {
      Self { reply: Err(status), delay_ms: 0, calls: AtomicUsize::new(0), prompts: Mutex::new(vec![]) }
    }
  }

  #[async_trait]
  impl Generator for FakeGenerator {
    async fn generate_text(&self, prompt: &str) -> Result<String, ProviderError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      self.prompts.lock().unwrap().push(prompt.to_string());
      if self.delay_ms > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
      }
      match &self.reply {
        Ok(text) => Ok(text.clone()),
        Err(status) => Err(ProviderError::Api { status: *status, message: "upstream down".into() }),
      }
    }
  }

  pub(crate) struct FakeTranscriber(pub &'static str);

  #[async_trait]
  impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, audio: Vec<u8>, _mime: &str) -> Result<String, ProviderError> {
      assert!(!audio.is_empty());
      Ok(format!("  {}  ", self.0))
    }
  }

  /// Synthesizer that echoes `voice:text` as the audio bytes, or fails with `status`.
  pub(crate) struct FakeSynthesizer {
    pub fail_with: Option<u16>,
    pub texts: Mutex<Vec<String>>,
  }

  impl FakeSynthesizer {
    pub(crate) fn new() -> Self {
      Self { fail_with: None, texts: Mutex::new(vec![]) }
    }
  }

  #[async_trait]
  impl Synthesizer for FakeSynthesizer {
    async fn synthesize(&self, text: &str, subject: Subject) -> Result<Vec<u8>, ProviderError> {
      self.texts.lock().unwrap().push(text.to_string());
      match self.fail_with {
        Some(status) => Err(ProviderError::Api { status, message: "voice unavailable".into() }),
        None => Ok(format!("{}:{}", subject.as_str(), text).into_bytes()),
      }
    }
  }

  pub(crate) fn tutor_with(generator: FakeGenerator) -> (Tutor, Arc<FakeGenerator>) {
    let generator = Arc::new(generator);
    let tutor = Tutor::new(
      Some(generator.clone()),
      Some(Arc::new(FakeTranscriber("what is 2+2"))),
      Prompts::default(),
      SamplingConfig::default(),
    )
    .with_synthesizer(Some(Arc::new(FakeSynthesizer::new())));
    (tutor, generator)
  }

  fn question(text: &str) -> TutorQuestion {
    TutorQuestion { text: text.into(), teaching_style: TeachingStyle::QuickResponse, subject: Subject::Math }
  }

  #[tokio::test]
  async fn answers_through_the_generator() {
    let raw = "```json\n{\"steps\": \"Step 1: add\", \"visual\": {\"type\": \"function\", \"data\": {\"function\": \"x^2\", \"domain\": [-2, 2]}}}\n```";
    let (tutor, generator) = tutor_with(FakeGenerator::replying(raw));

    let answer = tutor.answer(&question("What is 2+2?")).await.unwrap();
    assert_eq!(answer.content.steps, "Your Question: What is 2+2?\n\nStep 1: add");
    assert_eq!(answer.content.visual.as_function().unwrap().function, "x**2");
    assert_eq!(answer.charts.len(), 1);
    assert_eq!(answer.charts[0].datasets[0].data.len(), 201);

    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    let prompts = generator.prompts.lock().unwrap();
    assert!(prompts[0].contains("Question: What is 2+2?"));
    assert!(prompts[0].contains("quick-response"));
  }

  #[tokio::test]
  async fn garbage_output_still_produces_a_board() {
    let (tutor, _) = tutor_with(FakeGenerator::replying("I'm sorry, I can't format that."));
    let answer = tutor.answer(&question("Why?")).await.unwrap();
    assert!(answer.content.steps.ends_with("No steps available"));
    assert_eq!(answer.content.visual.as_function().unwrap().function, "x");
  }

  #[tokio::test]
  async fn inline_graph_blocks_become_charts() {
    let raw = "{\"steps\": \"see chart\"}\n[GRAPH_DATA]{\"type\": \"bar\", \"labels\": [\"a\"], \"datasets\": [{\"label\": \"n\", \"data\": [1]}]}[/GRAPH_DATA]";
    let (tutor, _) = tutor_with(FakeGenerator::replying(raw));
    let answer = tutor.answer(&question("Show counts")).await.unwrap();
    assert!(answer.content.steps.ends_with("see chart"));
    // sampled identity chart first, then the inline one
    assert_eq!(answer.charts.len(), 2);
    assert_eq!(answer.charts[1].kind, crate::graph::ChartKind::Bar);
  }

  #[tokio::test]
  async fn provider_failures_surface_as_errors() {
    let (tutor, _) = tutor_with(FakeGenerator::failing(500));
    let err = tutor.answer(&question("Why?")).await.unwrap_err();
    assert!(matches!(err, TutorError::Provider(ProviderError::Api { status: 500, .. })));
    assert_eq!(err.user_message(), "Error processing your question. Please try again.");
  }

  #[tokio::test]
  async fn rejects_blank_questions_without_calling_out() {
    let (tutor, generator) = tutor_with(FakeGenerator::replying("{}"));
    assert!(matches!(tutor.answer(&question("   ")).await, Err(TutorError::EmptyQuestion)));
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn missing_generator_is_unavailable() {
    let tutor = Tutor::new(None, None, Prompts::default(), SamplingConfig::default());
    assert!(!tutor.is_enabled());
    assert!(matches!(tutor.answer(&question("Why?")).await, Err(TutorError::Unavailable)));
  }

  #[tokio::test]
  async fn transcribes_base64_audio() {
    let (tutor, _) = tutor_with(FakeGenerator::replying("{}"));
    let b64 = base64::engine::general_purpose::STANDARD.encode(b"RIFFfake");
    assert_eq!(tutor.transcribe_base64(&b64, "audio/wav").await.unwrap(), "what is 2+2");
    assert!(matches!(tutor.transcribe_base64("!!not base64!!", "audio/wav").await, Err(TutorError::InvalidAudio(_))));
    assert!(matches!(tutor.transcribe_base64("", "audio/wav").await, Err(TutorError::EmptyAudio)));
  }

  #[tokio::test]
  async fn speaks_in_the_subject_voice() {
    let (tutor, _) = tutor_with(FakeGenerator::replying("{}"));
    let speech = tutor.speak("  The derivative is 2x.  ", Subject::Math).await.unwrap();
    assert_eq!(speech.mime, "audio/mpeg");
    assert_eq!(speech.audio, b"math:The derivative is 2x.");
    assert_eq!(speech.to_base64(), base64::engine::general_purpose::STANDARD.encode(b"math:The derivative is 2x."));

    assert!(matches!(tutor.speak(" \n ", Subject::Science).await, Err(TutorError::EmptySpeech)));
  }

  #[tokio::test]
  async fn long_speech_is_cut_on_a_char_boundary() {
    let synth = Arc::new(FakeSynthesizer::new());
    let tutor = Tutor::new(None, None, Prompts::default(), SamplingConfig::default())
      .with_synthesizer(Some(synth.clone()));
    let text = "é".repeat(MAX_SPEECH_CHARS + 10);
    tutor.speak(&text, Subject::Science).await.unwrap();
    assert_eq!(synth.texts.lock().unwrap()[0].chars().count(), MAX_SPEECH_CHARS);
  }

  #[tokio::test]
  async fn speech_failures_use_the_generic_message() {
    let failing = FakeSynthesizer { fail_with: Some(503), texts: Mutex::new(vec![]) };
    let tutor = Tutor::new(None, None, Prompts::default(), SamplingConfig::default())
      .with_synthesizer(Some(Arc::new(failing)));
    let err = tutor.speak("hello", Subject::Math).await.unwrap_err();
    assert!(matches!(err, TutorError::Provider(ProviderError::Api { status: 503, .. })));
    assert_eq!(err.user_message(), "Error processing your question. Please try again.");

    let silent = Tutor::new(None, None, Prompts::default(), SamplingConfig::default());
    assert!(matches!(silent.speak("hello", Subject::Math).await, Err(TutorError::Unavailable)));
  }
}
