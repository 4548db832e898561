//! Domain models: tutoring questions, teaching styles, and the whiteboard content
//! contract handed to the renderer.
//!
//! `WhiteboardContent` has no optional sections: every field is populated, with
//! defaults substituted for anything the model failed to provide.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How the tutor should pace and phrase its answer.
///
/// Unknown tags are carried through verbatim as `Other` so the prompt can still
/// mention them; they never fail deserialization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TeachingStyle {
  StepByStep,
  QuickResponse,
  Interactive,
  Other(String),
}

impl TeachingStyle {
  pub fn as_tag(&self) -> &str {
    match self {
      TeachingStyle::StepByStep => "step-by-step",
      TeachingStyle::QuickResponse => "quick-response",
      TeachingStyle::Interactive => "interactive",
      TeachingStyle::Other(s) => s,
    }
  }
}

impl Default for TeachingStyle {
  fn default() -> Self { TeachingStyle::StepByStep }
}

impl From<&str> for TeachingStyle {
  fn from(tag: &str) -> Self {
    match tag.trim().to_ascii_lowercase().as_str() {
      "step-by-step" => TeachingStyle::StepByStep,
      // the web client historically sent "quick"
      "quick-response" | "quick" => TeachingStyle::QuickResponse,
      "interactive" => TeachingStyle::Interactive,
      _ => TeachingStyle::Other(tag.to_string()),
    }
  }
}

impl From<String> for TeachingStyle {
  fn from(tag: String) -> Self { TeachingStyle::from(tag.as_str()) }
}

impl From<TeachingStyle> for String {
  fn from(style: TeachingStyle) -> Self { style.as_tag().to_string() }
}

impl fmt::Display for TeachingStyle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_tag()) }
}

/// Which tutor the student is talking to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
  #[default]
  Math,
  Science,
}

impl Subject {
  pub fn as_str(&self) -> &'static str {
    match self {
      Subject::Math => "math",
      Subject::Science => "science",
    }
  }
}

/// One student utterance, consumed once by the pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorQuestion {
  pub text: String,
  #[serde(default)]
  pub teaching_style: TeachingStyle,
  #[serde(default)]
  pub subject: Subject,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
  pub x: f64,
  pub y: f64,
}

/// A plottable function. `points` are always sampled locally, never taken from the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionGraphData {
  pub function: String,
  pub domain: [f64; 2],
  pub points: Vec<Point>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
  Line,
  Polygon,
  Rectangle,
  Circle,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeometricShape {
  #[serde(rename = "type")]
  pub kind: ShapeKind,
  pub points: Vec<[f64; 2]>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub color: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub fill_color: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeometricData {
  pub shapes: Vec<GeometricShape>,
  #[serde(default)]
  pub grid_lines: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
  pub label: String,
  pub value: f64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub color: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataGraphData {
  pub data: Vec<DataPoint>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
}

/// Visual section of the whiteboard, serialized as `{"type": ..., "data": {...}}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Visual {
  Function(FunctionGraphData),
  Geometric(GeometricData),
  Data(DataGraphData),
}

impl Visual {
  pub fn as_function(&self) -> Option<&FunctionGraphData> {
    match self {
      Visual::Function(f) => Some(f),
      _ => None,
    }
  }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Problem {
  pub question: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub difficulty: Option<String>,
  pub solution: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub hint: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelatedTopic {
  pub name: String,
  pub description: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConceptExample {
  pub problem: String,
  pub solution: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Practice {
  pub problems: Vec<Problem>,
  /// Display rendering of `problems`.
  pub text: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Concepts {
  pub title: String,
  pub description: String,
  pub related_topics: Vec<RelatedTopic>,
  pub examples: Vec<ConceptExample>,
  /// Display rendering of the section.
  pub text: String,
}

/// Pipeline output. This is the only shape the renderer depends on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WhiteboardContent {
  pub steps: String,
  pub visual: Visual,
  pub practice: Practice,
  pub concepts: Concepts,
}
