//! Error types for the tutor pipeline and its external providers.
//!
//! Malformed model output is not an error anywhere in this crate; only failed
//! provider calls and unusable requests are.

use thiserror::Error;

pub const GENERIC_FAILURE: &str = "Error processing your question. Please try again.";

/// Failures talking to the text-generation, transcription or speech provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned HTTP {status}: {message}")]
    Api { status: u16, message: String },
}

#[derive(Error, Debug)]
pub enum TutorError {
    #[error("question text is empty")]
    EmptyQuestion,

    #[error("audio payload is empty")]
    EmptyAudio,

    #[error("audio payload is not valid base64: {0}")]
    InvalidAudio(#[from] base64::DecodeError),

    #[error("nothing to read aloud")]
    EmptySpeech,

    #[error("provider not configured")]
    Unavailable,

    #[error("provider call failed: {0}")]
    Provider(#[from] ProviderError),
}

impl TutorError {
    /// Message safe to show the student.
    pub fn user_message(&self) -> &'static str {
        match self {
            TutorError::EmptyQuestion => "Please ask a question first.",
            TutorError::EmptyAudio | TutorError::InvalidAudio(_) => {
                "Sorry, I couldn't process that audio. Please try again."
            }
            TutorError::EmptySpeech => "There is nothing to read aloud yet.",
            TutorError::Unavailable | TutorError::Provider(_) => GENERIC_FAILURE,
        }
    }
}
