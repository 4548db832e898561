//! Prompt construction for the tutor model.
//!
//! The JSON shape is spelled out in full on every request. Models still drift
//! from it, so `extract` stays defensive regardless.

use crate::config::Prompts;
use crate::domain::{Subject, TeachingStyle};
use crate::util::fill_template;

/// Style-specific guidance. Unrecognized styles get none; their tag still
/// appears literally in the intro.
fn style_guidance<'a>(prompts: &'a Prompts, style: &TeachingStyle) -> Option<&'a str> {
  match style {
    TeachingStyle::StepByStep => Some(&prompts.style_step_by_step),
    TeachingStyle::QuickResponse => Some(&prompts.style_quick_response),
    TeachingStyle::Interactive => Some(&prompts.style_interactive),
    TeachingStyle::Other(_) => None,
  }
}

/// Build the full instruction text for one question. Pure and deterministic.
pub fn build_prompt(prompts: &Prompts, subject: Subject, question: &str, teaching_style: &str) -> String {
  let style = TeachingStyle::from(teaching_style);
  let intro = fill_template(
    &prompts.intro_template,
    &[
      ("subject", subject.as_str()),
      ("teaching_style", teaching_style.trim()),
      ("question", question.trim()),
    ],
  );

  let mut sections = vec![intro, prompts.response_format.clone()];
  if let Some(guidance) = style_guidance(prompts, &style) {
    sections.push(guidance.to_string());
  }
  sections.push(prompts.guidelines.clone());
  sections.join("\n\n")
}
