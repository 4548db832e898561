//! Per-connection tutoring session.
//!
//! Holds the view state the whiteboard depends on (subject, call, last
//! content) plus one in-flight question and one in-flight speech request.
//! Starting a new request aborts the previous one of the same kind, and
//! completions are only accepted for the current request id, so a slow stale
//! answer can never overwrite a newer board.

use std::future::Future;

use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{Subject, WhiteboardContent};
use crate::render::{render_whiteboard, Board, BoardView};

struct InFlight {
  id: String,
  handle: JoinHandle<()>,
}

/// At most one task at a time; spawning into an occupied slot aborts the old task.
#[derive(Default)]
struct Slot(Option<InFlight>);

impl Slot {
  fn spawn<F, Fut>(&mut self, make: F) -> String
  where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
  {
    self.cancel();
    let id = Uuid::new_v4().to_string();
    let handle = tokio::spawn(make(id.clone()));
    self.0 = Some(InFlight { id: id.clone(), handle });
    id
  }

  fn cancel(&mut self) -> Option<String> {
    let InFlight { id, handle } = self.0.take()?;
    handle.abort();
    debug!(target: "tutor", request_id = %id, "Request superseded");
    Some(id)
  }

  fn is_current(&self, id: &str) -> bool {
    self.0.as_ref().is_some_and(|f| f.id == id)
  }

  fn finish(&mut self, id: &str) -> bool {
    if !self.is_current(id) {
      return false;
    }
    self.0 = None;
    true
  }
}

#[derive(Default)]
pub struct Session {
  subject: Option<Subject>,
  call_active: bool,
  content: Option<WhiteboardContent>,
  question: Slot,
  speech: Slot,
}

impl Session {
  pub fn subject(&self) -> Option<Subject> { self.subject }

  pub fn call_active(&self) -> bool { self.call_active }

  pub fn is_processing(&self) -> bool { self.question.0.is_some() }

  /// Switching subject clears the board and drops any pending answer or speech.
  pub fn select_subject(&mut self, subject: Subject) {
    if self.subject != Some(subject) {
      self.cancel();
      self.speech.cancel();
      self.content = None;
    }
    self.subject = Some(subject);
  }

  /// A call needs a subject; returns false when none is selected.
  pub fn start_call(&mut self) -> bool {
    if self.subject.is_none() {
      return false;
    }
    self.call_active = true;
    true
  }

  pub fn end_call(&mut self) {
    self.call_active = false;
    self.cancel();
    self.speech.cancel();
  }

  /// Spawn a request task, superseding whatever was in flight. The closure
  /// receives the new request id so results can be tagged with it.
  pub fn spawn_request<F, Fut>(&mut self, make: F) -> String
  where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
  {
    self.question.spawn(make)
  }

  /// Abort the in-flight question, if any, and return its id.
  pub fn cancel(&mut self) -> Option<String> {
    self.question.cancel()
  }

  pub fn is_current(&self, request_id: &str) -> bool {
    self.question.is_current(request_id)
  }

  /// Mark `request_id` as done. False means it was stale and its result must be dropped.
  pub fn finish(&mut self, request_id: &str) -> bool {
    self.question.finish(request_id)
  }

  /// Speech runs beside the question: a new question leaves it alone, a newer
  /// `speak` replaces it.
  pub fn spawn_speech<F, Fut>(&mut self, make: F) -> String
  where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
  {
    self.speech.spawn(make)
  }

  pub fn finish_speech(&mut self, request_id: &str) -> bool {
    self.speech.finish(request_id)
  }

  pub fn show(&mut self, content: WhiteboardContent) {
    self.content = Some(content);
  }

  pub fn board(&self) -> Board {
    render_whiteboard(&BoardView {
      content: self.content.as_ref(),
      processing: self.is_processing(),
      subject: self.subject,
      call_active: self.call_active,
    })
  }
}

impl Drop for Session {
  fn drop(&mut self) {
    self.cancel();
    self.speech.cancel();
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use tokio::sync::mpsc;

  use super::*;
  use crate::render::{ASK_QUESTION, SELECT_SUBJECT, START_CALL};

  #[tokio::test]
  async fn new_request_supersedes_the_old_one() {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let mut session = Session::default();

    let slow_tx = tx.clone();
    let first = session.spawn_request(move |id| async move {
      tokio::time::sleep(Duration::from_millis(50)).await;
      let _ = slow_tx.send(id);
    });
    let fast_tx = tx.clone();
    let second = session.spawn_request(move |id| async move {
      let _ = fast_tx.send(id);
    });

    assert!(!session.is_current(&first));
    assert!(session.is_current(&second));
    assert_eq!(rx.recv().await.as_deref(), Some(second.as_str()));
    // the aborted task never reports back
    assert!(tokio::time::timeout(Duration::from_millis(150), rx.recv()).await.is_err());

    assert!(!session.finish(&first));
    assert!(session.finish(&second));
    assert!(!session.is_processing());
  }

  #[tokio::test]
  async fn end_call_cancels_pending_work() {
    let mut session = Session::default();
    session.select_subject(Subject::Math);
    assert!(session.start_call());
    let id = session.spawn_request(|_| async {
      tokio::time::sleep(Duration::from_secs(5)).await;
    });
    assert_eq!(session.board(), Board::Loading);

    session.end_call();
    assert!(!session.call_active());
    assert!(!session.is_current(&id));
    assert_eq!(session.board(), Board::Placeholder { message: START_CALL.into() });
  }

  #[test]
  fn board_follows_view_state() {
    let mut session = Session::default();
    assert_eq!(session.board(), Board::Placeholder { message: SELECT_SUBJECT.into() });
    assert!(!session.start_call());

    session.select_subject(Subject::Science);
    assert!(session.start_call());
    assert_eq!(session.board(), Board::Placeholder { message: ASK_QUESTION.into() });
    assert_eq!(session.subject(), Some(Subject::Science));
  }

  #[tokio::test]
  async fn speech_is_independent_of_questions() {
    let mut session = Session::default();
    session.select_subject(Subject::Math);
    let speech = session.spawn_speech(|_| async {
      tokio::time::sleep(Duration::from_secs(5)).await;
    });
    let question = session.spawn_request(|_| async {});

    // a new question does not silence the tutor
    assert!(session.is_current(&question));
    assert!(!session.finish_speech("other"));

    let newer = session.spawn_speech(|_| async {});
    assert!(!session.finish_speech(&speech));
    assert!(session.finish_speech(&newer));

    let pending = session.spawn_speech(|_| async {
      tokio::time::sleep(Duration::from_secs(5)).await;
    });
    session.select_subject(Subject::Science);
    assert!(!session.finish_speech(&pending));
  }
}
