//! Loading tutor configuration (prompt texts + graph sampling) from TOML.
//!
//! See `TutorConfig`, `Prompts` and `SamplingConfig` for the expected schema:
//!
//! ```toml
//! [prompts]
//! style_step_by_step = "Walk through every step..."
//!
//! [sampling]
//! resolution = 400
//! ```

use serde::Deserialize;
use tracing::{error, info, warn};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct TutorConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub sampling: SamplingConfig,
}

/// Graph sampling parameters.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
  /// Number of intervals across the domain; `resolution + 1` points are evaluated.
  pub resolution: usize,
}

impl Default for SamplingConfig {
  fn default() -> Self { Self { resolution: 200 } }
}

impl SamplingConfig {
  pub const MIN_RESOLUTION: usize = 10;
  pub const MAX_RESOLUTION: usize = 2000;

  /// Pull `resolution` into `MIN_RESOLUTION..=MAX_RESOLUTION`.
  pub fn clamped(self) -> Self {
    let resolution = self.resolution.clamp(Self::MIN_RESOLUTION, Self::MAX_RESOLUTION);
    if resolution != self.resolution {
      warn!(target: "tutor_backend", configured = self.resolution, resolution, "Sampling resolution out of range; clamped");
    }
    Self { resolution }
  }
}

/// Prompt texts sent to the generator. Defaults target math/science tutoring;
/// override any of them in TOML to tune tone or structure.
///
/// Placeholders: `{subject}`, `{question}`, `{teaching_style}` in `intro_template`.
/// The other sections are appended verbatim.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub intro_template: String,
  pub response_format: String,
  pub guidelines: String,
  pub style_step_by_step: String,
  pub style_quick_response: String,
  pub style_interactive: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      intro_template: "You are an expert {subject} tutor. Please analyze the following question and provide a detailed response in the specified JSON format. Use a {teaching_style} teaching approach.\n\nQuestion: {question}".into(),
      response_format: r#"Please structure your response in this exact JSON format:
{
  "steps": "Provide a clear step-by-step solution here, using markdown formatting. Break down the solution into clear, numbered steps.",

  "visual": {
    "type": "function",
    "data": {
      "function": "The mathematical function in JavaScript notation (e.g. 'Math.sin(x)')",
      "domain": [-10, 10],
      "keyPoints": {
        "intercepts": [[x1, y1], [x2, y2]],
        "maxima": [[x, y]],
        "minima": [[x, y]]
      }
    }
  },

  "practice": {
    "problems": [
      {
        "question": "A similar but different problem",
        "difficulty": "easy|medium|hard",
        "hint": "Optional hint for the student",
        "solution": "Brief solution to the practice problem"
      }
    ]
  },

  "concepts": {
    "title": "Main topic title",
    "description": "Brief overview of the main concept",
    "relatedTopics": [
      {
        "name": "Related concept name",
        "description": "Explanation of how this concept relates"
      }
    ],
    "examples": [
      {
        "problem": "Example problem",
        "solution": "Example solution"
      }
    ]
  }
}

Keep the EXACT same keys and nesting. Respond with the JSON object only."#.into(),
      guidelines: "Important guidelines:\n1. For math expressions, use LaTeX inside $ or $$ markers.\n2. For the visual section, the function must use the single variable x in valid JavaScript notation.\n3. Break down steps into clear numbered points.\n4. Include at least one practice problem.\n5. Link the concepts to the main topic.".into(),
      style_step_by_step: "Teaching style: provide very detailed explanations with each step clearly numbered.".into(),
      style_quick_response: "Teaching style: focus on the key points and main solution steps. Keep it concise.".into(),
      style_interactive: "Teaching style: use real-world examples and applications, and include more practice problems and examples.".into(),
    }
  }
}

/// Attempt to load `TutorConfig` from TUTOR_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_tutor_config_from_env() -> Option<TutorConfig> {
  let path = std::env::var("TUTOR_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<TutorConfig>(&s) {
      Ok(mut cfg) => {
        info!(target: "tutor_backend", %path, "Loaded tutor config (TOML)");
        cfg.sampling = cfg.sampling.clamped();
        Some(cfg)
      }
      Err(e) => {
        error!(target: "tutor_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "tutor_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
