//! Application state: the tutor pipeline with its providers wired in.
//!
//! Prompts and sampling come from TOML (TUTOR_CONFIG_PATH) or defaults. The
//! OpenAI client is optional; without OPENAI_API_KEY the server still runs and
//! the offline endpoints (prompt preview, formatting) keep working.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::config::load_tutor_config_from_env;
use crate::openai::OpenAI;
use crate::tutor::{Generator, Synthesizer, Transcriber, Tutor};

#[derive(Clone)]
pub struct AppState {
    pub tutor: Tutor,
}

impl AppState {
    /// Build state from env: load config, init OpenAI, assemble the tutor.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_tutor_config_from_env().unwrap_or_default();
        info!(target: "tutor_backend", resolution = cfg.sampling.resolution, "Sampling configured");

        let openai = OpenAI::from_env().map(Arc::new);
        let (generator, transcriber, synthesizer) = match &openai {
            Some(oa) => {
                info!(target: "tutor_backend", base_url = %oa.base_url, model = %oa.model, transcribe_model = %oa.transcribe_model, tts_model = %oa.tts_model, "OpenAI enabled.");
                (
                    Some(oa.clone() as Arc<dyn Generator>),
                    Some(oa.clone() as Arc<dyn Transcriber>),
                    Some(oa.clone() as Arc<dyn Synthesizer>),
                )
            }
            None => {
                warn!(target: "tutor_backend", "OpenAI disabled (no OPENAI_API_KEY). Questions will be rejected as unavailable.");
                (None, None, None)
            }
        };

        let tutor = Tutor::new(generator, transcriber, cfg.prompts, cfg.sampling).with_synthesizer(synthesizer);
        Self::with_tutor(tutor)
    }

    pub fn with_tutor(tutor: Tutor) -> Self {
        Self { tutor }
    }
}
