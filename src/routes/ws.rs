//! WebSocket upgrade + message loop.
//!
//! Questions run as background tasks so the socket keeps reading while the
//! model works; that is what lets `cancel`, `end_call` or a newer question
//! supersede a pending one. Task results come back over an mpsc channel and
//! are dropped unless they belong to the session's current request.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument};

use crate::domain::TutorQuestion;
use crate::error::TutorError;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::session::Session;
use crate::state::AppState;
use crate::tutor::{Speech, TutorAnswer};

/// Reported by a request task back to the socket loop.
#[derive(Debug)]
enum TaskEvent {
  Transcript { request_id: String, text: String },
  Answered { request_id: String, result: Result<TutorAnswer, TutorError> },
  Spoken { request_id: String, result: Result<Speech, TutorError> },
}

enum Step {
  Client(Option<Result<Message, axum::Error>>),
  Task(TaskEvent),
}

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "tutor_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "tutor_backend", "WebSocket connected");
  let (tx, mut rx) = mpsc::unbounded_channel::<TaskEvent>();
  let mut session = Session::default();

  loop {
    let step = tokio::select! {
      incoming = socket.recv() => Step::Client(incoming),
      Some(event) = rx.recv() => Step::Task(event),
    };

    let replies = match step {
      Step::Client(Some(Ok(Message::Text(txt)))) => match serde_json::from_str::<ClientWsMessage>(&txt) {
        Ok(incoming) => {
          debug!(target: "tutor_backend", "WS received: {}", short_debug(&incoming));
          handle_client_ws(incoming, &mut session, &state, &tx)
        }
        Err(e) => vec![ServerWsMessage::Error { request_id: None, message: format!("Invalid JSON: {}", e) }],
      },
      Step::Client(Some(Ok(Message::Ping(payload)))) => {
        let _ = socket.send(Message::Pong(payload)).await;
        continue;
      }
      Step::Client(Some(Ok(Message::Close(_)))) | Step::Client(None) => break,
      Step::Client(Some(Err(e))) => {
        error!(target: "tutor_backend", error = %e, "WS receive error");
        break;
      }
      Step::Client(Some(Ok(_))) => continue,
      Step::Task(event) => handle_task_event(event, &mut session).into_iter().collect(),
    };

    if !send_all(&mut socket, replies).await {
      break;
    }
  }

  // dropping the session aborts whatever is still in flight
  drop(session);
  info!(target: "tutor_backend", "WebSocket disconnected");
}

async fn send_all(socket: &mut WebSocket, replies: Vec<ServerWsMessage>) -> bool {
  for reply in replies {
    let out = serde_json::to_string(&reply).unwrap_or_else(|e| {
      serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
    });
    if let Err(e) = socket.send(Message::Text(out)).await {
      error!(target: "tutor_backend", error = %e, "WS send error");
      return false;
    }
  }
  true
}

/// Audio payloads are large; keep them out of debug logs.
fn short_debug(msg: &ClientWsMessage) -> String {
  match msg {
    ClientWsMessage::AskAudio { audio_base64, mime, .. } => format!("AskAudio {{ mime: {mime:?}, b64_len: {} }}", audio_base64.len()),
    ClientWsMessage::Speak { text } => format!("Speak {{ text_len: {} }}", text.len()),
    other => format!("{other:?}"),
  }
}

fn call_state(session: &Session) -> ServerWsMessage {
  ServerWsMessage::CallState { active: session.call_active(), subject: session.subject(), board: session.board() }
}

fn handle_client_ws(
  msg: ClientWsMessage,
  session: &mut Session,
  state: &Arc<AppState>,
  tx: &mpsc::UnboundedSender<TaskEvent>,
) -> Vec<ServerWsMessage> {
  match msg {
    ClientWsMessage::Ping => vec![ServerWsMessage::Pong],

    ClientWsMessage::SelectSubject { subject } => {
      session.select_subject(subject);
      info!(target: "tutor", subject = subject.as_str(), "WS subject selected");
      vec![call_state(session)]
    }

    ClientWsMessage::StartCall => {
      if !session.start_call() {
        return vec![ServerWsMessage::Error { request_id: None, message: "Select a subject first.".into() }];
      }
      info!(target: "tutor", "WS call started");
      vec![call_state(session)]
    }

    ClientWsMessage::EndCall => {
      session.end_call();
      info!(target: "tutor", "WS call ended");
      vec![call_state(session)]
    }

    ClientWsMessage::Cancel => {
      if let Some(id) = session.cancel() {
        info!(target: "tutor", request_id = %id, "WS request cancelled");
      }
      vec![ServerWsMessage::Board { board: session.board() }]
    }

    ClientWsMessage::Ask { question, teaching_style } => {
      let question = TutorQuestion { text: question, teaching_style, subject: session.subject().unwrap_or_default() };
      let tutor = state.tutor.clone();
      let tx = tx.clone();
      let request_id = session.spawn_request(move |request_id| async move {
        let result = tutor.answer(&question).await;
        let _ = tx.send(TaskEvent::Answered { request_id, result });
      });
      info!(target: "tutor", %request_id, "WS ask dispatched");
      vec![ServerWsMessage::Processing { request_id, board: session.board() }]
    }

    ClientWsMessage::AskAudio { audio_base64, mime, teaching_style } => {
      let subject = session.subject().unwrap_or_default();
      let tutor = state.tutor.clone();
      let tx = tx.clone();
      let request_id = session.spawn_request(move |request_id| async move {
        let text = match tutor.transcribe_base64(&audio_base64, &mime).await {
          Ok(text) => text,
          Err(e) => {
            let _ = tx.send(TaskEvent::Answered { request_id, result: Err(e) });
            return;
          }
        };
        let _ = tx.send(TaskEvent::Transcript { request_id: request_id.clone(), text: text.clone() });
        let question = TutorQuestion { text, teaching_style, subject };
        let result = tutor.answer(&question).await;
        let _ = tx.send(TaskEvent::Answered { request_id, result });
      });
      info!(target: "tutor", %request_id, "WS audio ask dispatched");
      vec![ServerWsMessage::Processing { request_id, board: session.board() }]
    }

    ClientWsMessage::Speak { text } => {
      let subject = session.subject().unwrap_or_default();
      let tutor = state.tutor.clone();
      let tx = tx.clone();
      let request_id = session.spawn_speech(move |request_id| async move {
        let result = tutor.speak(&text, subject).await;
        let _ = tx.send(TaskEvent::Spoken { request_id, result });
      });
      info!(target: "tutor", %request_id, "WS speech dispatched");
      Vec::new()
    }
  }
}

fn handle_task_event(event: TaskEvent, session: &mut Session) -> Option<ServerWsMessage> {
  match event {
    TaskEvent::Transcript { request_id, text } => {
      session.is_current(&request_id).then_some(ServerWsMessage::Transcript { request_id, text })
    }
    TaskEvent::Answered { request_id, result } => {
      if !session.finish(&request_id) {
        debug!(target: "tutor", %request_id, "Dropping stale result");
        return None;
      }
      match result {
        Ok(TutorAnswer { content, charts }) => {
          session.show(content.clone());
          Some(ServerWsMessage::Whiteboard { request_id, content, board: session.board(), charts })
        }
        Err(e) => {
          error!(target: "tutor", %request_id, error = %e, "WS ask failed");
          Some(ServerWsMessage::Error { request_id: Some(request_id), message: e.user_message().to_string() })
        }
      }
    }
    TaskEvent::Spoken { request_id, result } => {
      if !session.finish_speech(&request_id) {
        debug!(target: "tutor", %request_id, "Dropping stale speech");
        return None;
      }
      match result {
        Ok(speech) => Some(ServerWsMessage::Speech {
          request_id,
          audio_base64: speech.to_base64(),
          mime: speech.mime.into(),
        }),
        Err(e) => {
          error!(target: "tutor", %request_id, error = %e, "WS speech failed");
          Some(ServerWsMessage::Error { request_id: Some(request_id), message: e.user_message().to_string() })
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::Subject;
  use crate::render::Board;
  use crate::tutor::tests::{tutor_with, FakeGenerator};

  fn state(generator: FakeGenerator) -> Arc<AppState> {
    let (tutor, _) = tutor_with(generator);
    Arc::new(AppState::with_tutor(tutor))
  }

  fn ask(question: &str) -> ClientWsMessage {
    serde_json::from_value(serde_json::json!({"type": "ask", "question": question, "teachingStyle": "quick-response"})).unwrap()
  }

  #[test]
  fn parses_client_messages() {
    let msg: ClientWsMessage = serde_json::from_str(r#"{"type":"select_subject","subject":"science"}"#).unwrap();
    assert!(matches!(msg, ClientWsMessage::SelectSubject { subject: Subject::Science }));
    let msg: ClientWsMessage = serde_json::from_str(r#"{"type":"ask_audio","audioBase64":"AAAA","mime":"audio/webm"}"#).unwrap();
    assert!(matches!(msg, ClientWsMessage::AskAudio { .. }));
    assert!(serde_json::from_str::<ClientWsMessage>(r#"{"type":"dance"}"#).is_err());
  }

  #[tokio::test]
  async fn answer_flows_back_to_the_board() {
    let state = state(FakeGenerator::replying(r#"{"steps": "Step 1: think"}"#));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut session = Session::default();

    handle_client_ws(ClientWsMessage::SelectSubject { subject: Subject::Math }, &mut session, &state, &tx);
    let replies = handle_client_ws(ask("Why?"), &mut session, &state, &tx);
    let ServerWsMessage::Processing { request_id, board } = &replies[0] else { panic!("expected processing") };
    assert_eq!(*board, Board::Loading);

    let event = rx.recv().await.unwrap();
    let Some(ServerWsMessage::Whiteboard { request_id: done_id, content, board, .. }) = handle_task_event(event, &mut session) else {
      panic!("expected whiteboard");
    };
    assert_eq!(&done_id, request_id);
    assert_eq!(content.steps, "Your Question: Why?\n\nStep 1: think");
    assert!(matches!(board, Board::Content { .. }));
  }

  #[tokio::test]
  async fn stale_results_are_dropped() {
    let state = state(FakeGenerator::replying("{}"));
    let mut session = Session::default();
    let stale = TaskEvent::Answered {
      request_id: "old".into(),
      result: Err(TutorError::EmptyQuestion),
    };
    assert!(handle_task_event(stale, &mut session).is_none());

    let (tx, _rx) = mpsc::unbounded_channel();
    handle_client_ws(ask("first"), &mut session, &state, &tx);
    let replies = handle_client_ws(ClientWsMessage::Cancel, &mut session, &state, &tx);
    assert!(matches!(&replies[0], ServerWsMessage::Board { board: Board::Placeholder { .. } }));
  }

  #[test]
  fn call_requires_subject() {
    let state = state(FakeGenerator::replying("{}"));
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut session = Session::default();
    let replies = handle_client_ws(ClientWsMessage::StartCall, &mut session, &state, &tx);
    assert!(matches!(&replies[0], ServerWsMessage::Error { .. }));
  }

  #[tokio::test]
  async fn speak_replies_with_audio_in_the_subject_voice() {
    let state = state(FakeGenerator::replying("{}"));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut session = Session::default();

    handle_client_ws(ClientWsMessage::SelectSubject { subject: Subject::Science }, &mut session, &state, &tx);
    let msg: ClientWsMessage = serde_json::from_str(r#"{"type":"speak","text":"Photosynthesis makes sugar."}"#).unwrap();
    assert!(handle_client_ws(msg, &mut session, &state, &tx).is_empty());
    // speaking does not put the board into the loading state
    assert!(!session.is_processing());

    let event = rx.recv().await.unwrap();
    let Some(ServerWsMessage::Speech { audio_base64, mime, .. }) = handle_task_event(event, &mut session) else {
      panic!("expected speech");
    };
    assert_eq!(mime, "audio/mpeg");
    let expected = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, b"science:Photosynthesis makes sugar.");
    assert_eq!(audio_base64, expected);

    let blank = ClientWsMessage::Speak { text: "  ".into() };
    handle_client_ws(blank, &mut session, &state, &tx);
    let event = rx.recv().await.unwrap();
    let Some(ServerWsMessage::Error { message, .. }) = handle_task_event(event, &mut session) else {
      panic!("expected error");
    };
    assert_eq!(message, "There is nothing to read aloud yet.");
  }
}
