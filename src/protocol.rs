//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{Subject, TeachingStyle, TutorQuestion, WhiteboardContent};
use crate::graph::ChartSpec;
use crate::render::Board;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    SelectSubject {
        subject: Subject,
    },
    StartCall,
    EndCall,
    Ask {
        question: String,
        #[serde(rename = "teachingStyle", default)]
        teaching_style: TeachingStyle,
    },
    AskAudio {
        #[serde(rename = "audioBase64")]
        audio_base64: String,
        mime: String,
        #[serde(rename = "teachingStyle", default)]
        teaching_style: TeachingStyle,
    },
    Cancel,
    /// Read text aloud in the current subject's voice.
    Speak {
        text: String,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    CallState {
        active: bool,
        subject: Option<Subject>,
        board: Board,
    },
    Processing {
        #[serde(rename = "requestId")]
        request_id: String,
        board: Board,
    },
    Transcript {
        #[serde(rename = "requestId")]
        request_id: String,
        text: String,
    },
    Whiteboard {
        #[serde(rename = "requestId")]
        request_id: String,
        content: WhiteboardContent,
        board: Board,
        charts: Vec<ChartSpec>,
    },
    Board {
        board: Board,
    },
    Speech {
        #[serde(rename = "requestId")]
        request_id: String,
        #[serde(rename = "audioBase64")]
        audio_base64: String,
        mime: String,
    },
    Error {
        #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        message: String,
    },
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskIn {
    pub question: String,
    #[serde(default)]
    pub teaching_style: TeachingStyle,
    #[serde(default)]
    pub subject: Subject,
}

impl AskIn {
    pub fn into_question(self) -> TutorQuestion {
        TutorQuestion { text: self.question, teaching_style: self.teaching_style, subject: self.subject }
    }
}

#[derive(Serialize)]
pub struct AnswerOut {
    pub content: WhiteboardContent,
    pub html: String,
    pub charts: Vec<ChartSpec>,
}

#[derive(Serialize)]
pub struct PromptOut {
    pub prompt: String,
}

#[derive(Deserialize)]
pub struct FormatIn {
    pub raw: String,
    #[serde(default)]
    pub question: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscribeIn {
    pub audio_base64: String,
    pub mime: String,
}
#[derive(Serialize)]
pub struct TranscribeOut {
    pub text: String,
}

#[derive(Deserialize)]
pub struct SpeakIn {
    pub text: String,
    #[serde(default)]
    pub subject: Subject,
}
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechOut {
    pub audio_base64: String,
    pub mime: String,
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub generator: bool,
}
