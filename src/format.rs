//! Turns an extraction result into fully-populated `WhiteboardContent`.
//!
//! Every section has a default, so the renderer never sees a missing field:
//! absent steps become "No steps available", an absent or invalid visual becomes
//! the identity function over [-10, 10], and incomplete practice problems or
//! related topics are dropped one by one rather than rejecting the section.
//!
//! Practice problems and related topics are carried through as typed arrays;
//! the `text` renderings are derived from them, never parsed back.

use tracing::warn;

use crate::config::SamplingConfig;
use crate::domain::{
  ConceptExample, Concepts, FunctionGraphData, Practice, Problem, RelatedTopic, Visual, WhiteboardContent,
};
use crate::extract::{Extraction, ParsedConcepts, ParsedPractice, ParsedResponse, VisualSpec};
use crate::normalize::{normalize_function, sample_points};
use crate::util::non_blank;

pub const NO_STEPS: &str = "No steps available";
pub const DEFAULT_FUNCTION: &str = "x";
pub const DEFAULT_DOMAIN: [f64; 2] = [-10.0, 10.0];

pub fn format_steps(parsed: Option<&ParsedResponse>) -> String {
  non_blank(parsed.and_then(|p| p.steps.as_deref()))
    .unwrap_or(NO_STEPS)
    .to_string()
}

/// Identity function over the default domain, sampled.
pub fn default_visual(sampling: &SamplingConfig) -> Visual {
  function_visual(DEFAULT_FUNCTION, DEFAULT_DOMAIN, sampling)
}

fn function_visual(function: &str, domain: [f64; 2], sampling: &SamplingConfig) -> Visual {
  let function = normalize_function(function);
  let points = sample_points(&function, domain, sampling.resolution);
  if points.is_empty() {
    warn!(target: "tutor", %function, ?domain, "Function visual produced no finite points");
  }
  Visual::Function(FunctionGraphData { function, domain, points })
}

pub fn format_visual(parsed: Option<&ParsedResponse>, sampling: &SamplingConfig) -> Visual {
  match parsed.and_then(|p| p.visual.as_ref()) {
    Some(VisualSpec::Function { function, domain }) => {
      function_visual(function, domain.unwrap_or(DEFAULT_DOMAIN), sampling)
    }
    Some(VisualSpec::Geometric(g)) => Visual::Geometric(g.clone()),
    Some(VisualSpec::Data(d)) => Visual::Data(d.clone()),
    None => default_visual(sampling),
  }
}

/// Keeps problems that have both a question and a solution.
pub fn format_practice(practice: Option<&ParsedPractice>) -> Practice {
  let problems: Vec<Problem> = practice
    .map(|p| p.problems.as_slice())
    .unwrap_or_default()
    .iter()
    .filter_map(|p| {
      let question = non_blank(p.question.as_deref())?;
      let solution = non_blank(p.solution.as_deref())?;
      Some(Problem {
        question: question.to_string(),
        difficulty: non_blank(p.difficulty.as_deref()).map(str::to_string),
        solution: solution.to_string(),
        hint: non_blank(p.hint.as_deref()).map(str::to_string),
      })
    })
    .collect();

  let text = practice_text(&problems);
  Practice { problems, text }
}

fn practice_text(problems: &[Problem]) -> String {
  problems
    .iter()
    .map(|p| {
      let mut lines = vec![format!("Question: {}", p.question)];
      if let Some(d) = &p.difficulty {
        lines.push(format!("Difficulty: {d}"));
      }
      lines.push(format!("Solution: {}", p.solution));
      lines.join("\n")
    })
    .collect::<Vec<_>>()
    .join("\n\n")
}

pub fn format_concepts(concepts: Option<&ParsedConcepts>) -> Concepts {
  let Some(c) = concepts else { return Concepts::default() };

  let title = non_blank(c.title.as_deref()).unwrap_or_default().to_string();
  let description = non_blank(c.description.as_deref()).unwrap_or_default().to_string();
  let related_topics: Vec<RelatedTopic> = c
    .related_topics
    .iter()
    .filter_map(|t| {
      Some(RelatedTopic {
        name: non_blank(t.name.as_deref())?.to_string(),
        description: non_blank(t.description.as_deref())?.to_string(),
      })
    })
    .collect();
  let examples: Vec<ConceptExample> = c
    .examples
    .iter()
    .filter_map(|e| {
      Some(ConceptExample {
        problem: non_blank(e.problem.as_deref())?.to_string(),
        solution: non_blank(e.solution.as_deref())?.to_string(),
      })
    })
    .collect();

  let text = concepts_text(&title, &description, &related_topics);
  Concepts { title, description, related_topics, examples, text }
}

fn concepts_text(title: &str, description: &str, topics: &[RelatedTopic]) -> String {
  let mut parts: Vec<String> = Vec::new();
  if !title.is_empty() {
    parts.push(title.to_string());
  }
  if !description.is_empty() {
    parts.push(description.to_string());
  }
  if !topics.is_empty() {
    let bullets: Vec<String> = topics.iter().map(|t| format!("• {}: {}", t.name, t.description)).collect();
    parts.push(format!("Related Topics:\n{}", bullets.join("\n")));
  }
  parts.join("\n\n")
}

/// Assemble the whiteboard. Never fails: unusable extractions produce the
/// all-default board, which still restates the question.
pub fn format_whiteboard_content(extraction: &Extraction, question: &str, sampling: &SamplingConfig) -> WhiteboardContent {
  let parsed = extraction.parsed();
  WhiteboardContent {
    steps: format!("Your Question: {}\n\n{}", question.trim(), format_steps(parsed)),
    visual: format_visual(parsed, sampling),
    practice: format_practice(parsed.and_then(|p| p.practice.as_ref())),
    concepts: format_concepts(parsed.and_then(|p| p.concepts.as_ref())),
  }
}
