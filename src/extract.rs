//! Structured extraction from raw model text.
//!
//! The generator is asked for a strict JSON object but routinely returns it
//! wrapped in a ```json fence, surrounded by prose, truncated, or with fields of
//! the wrong type. Extraction never fails: it reports `Empty` or `Malformed`
//! for unusable text, and otherwise a `ParsedResponse` in which any field may be
//! absent.
//!
//! Order of attempts:
//! 1. the first ```json fenced block, if there is one (the rest of the text is
//!    then ignored, even if the block does not parse);
//! 2. otherwise the whole text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::domain::{DataGraphData, DataPoint, GeometricData};
use crate::graph::ChartSpec;
use crate::util::{lenient, lenient_text, lenient_vec, trunc_for_log};

// The closing fence must start its own line: a newline inside valid JSON can
// only sit between tokens, so fences quoted inside `steps` don't end the block.
static JSON_FENCE: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"```(?:json|JSON)[ \t]*\r?\n([\s\S]*?)\r?\n[ \t]*```").expect("static regex")
});

// Fallback for `{...}``` with the closing fence glued to the object.
static JSON_FENCE_INLINE: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"```(?:json|JSON)[ \t]*\r?\n([\s\S]*?)```").expect("static regex")
});

/// Longer function strings are treated as an invalid visual.
pub const MAX_FUNCTION_LEN: usize = 512;

static GRAPH_BLOCK: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"\[GRAPH_DATA\]([\s\S]*?)\[/GRAPH_DATA\]").expect("static regex")
});

/// Outcome of extracting a structured response from model text.
#[derive(Clone, Debug, PartialEq)]
pub enum Extraction {
  Parsed(ParsedResponse),
  /// Text was present but held no usable JSON object.
  Malformed,
  /// Blank input.
  Empty,
}

impl Extraction {
  pub fn parsed(&self) -> Option<&ParsedResponse> {
    match self {
      Extraction::Parsed(p) => Some(p),
      Extraction::Malformed | Extraction::Empty => None,
    }
  }

  /// Short label for logs.
  pub fn outcome(&self) -> &'static str {
    match self {
      Extraction::Parsed(_) => "parsed",
      Extraction::Malformed => "malformed",
      Extraction::Empty => "empty",
    }
  }
}

/// Model response with every section optional.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ParsedResponse {
  #[serde(default, deserialize_with = "lenient_text")]
  pub steps: Option<String>,
  #[serde(default, deserialize_with = "visual_spec")]
  pub visual: Option<VisualSpec>,
  #[serde(default, deserialize_with = "lenient")]
  pub practice: Option<ParsedPractice>,
  #[serde(default, deserialize_with = "lenient")]
  pub concepts: Option<ParsedConcepts>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ParsedPractice {
  #[serde(default, deserialize_with = "lenient_vec")]
  pub problems: Vec<ParsedProblem>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ParsedProblem {
  #[serde(default, deserialize_with = "lenient_text")]
  pub question: Option<String>,
  #[serde(default, deserialize_with = "lenient_text")]
  pub difficulty: Option<String>,
  #[serde(default, deserialize_with = "lenient_text")]
  pub hint: Option<String>,
  #[serde(default, deserialize_with = "lenient_text")]
  pub solution: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedConcepts {
  #[serde(default, deserialize_with = "lenient_text")]
  pub title: Option<String>,
  #[serde(default, deserialize_with = "lenient_text")]
  pub description: Option<String>,
  #[serde(default, deserialize_with = "lenient_vec")]
  pub related_topics: Vec<ParsedTopic>,
  #[serde(default, deserialize_with = "lenient_vec")]
  pub examples: Vec<ParsedExample>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ParsedTopic {
  #[serde(default, deserialize_with = "lenient_text")]
  pub name: Option<String>,
  #[serde(default, deserialize_with = "lenient_text")]
  pub description: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ParsedExample {
  #[serde(default, deserialize_with = "lenient_text")]
  pub problem: Option<String>,
  #[serde(default, deserialize_with = "lenient_text")]
  pub solution: Option<String>,
}

/// Visual section after validation. Anything that doesn't match one of these
/// shapes is dropped at the extraction boundary.
#[derive(Clone, Debug, PartialEq)]
pub enum VisualSpec {
  Function { function: String, domain: Option<[f64; 2]> },
  Geometric(GeometricData),
  Data(DataGraphData),
}

impl VisualSpec {
  fn from_value(value: Value) -> Option<VisualSpec> {
    let Value::Object(mut obj) = value else { return None };
    let tag = obj.get("type")?.as_str()?.trim().to_ascii_lowercase();
    let data = obj.remove("data")?;

    match tag.as_str() {
      "function" => {
        let function = data.get("function")?.as_str()?.trim();
        if function.is_empty() || function.len() > MAX_FUNCTION_LEN {
          return None;
        }
        Some(VisualSpec::Function {
          function: function.to_string(),
          domain: data.get("domain").and_then(valid_domain),
        })
      }
      "geometric" => serde_json::from_value::<GeometricData>(data)
        .ok()
        .filter(|g| !g.shapes.is_empty())
        .map(VisualSpec::Geometric),
      "data" => {
        // bare list of data points, or {data: [...], title}
        let graph = match data {
          Value::Array(_) => serde_json::from_value::<Vec<DataPoint>>(data)
            .ok()
            .map(|points| DataGraphData { data: points, title: None }),
          other => serde_json::from_value::<DataGraphData>(other).ok(),
        };
        graph.filter(|d| !d.data.is_empty()).map(VisualSpec::Data)
      }
      _ => None,
    }
  }
}

fn valid_domain(value: &Value) -> Option<[f64; 2]> {
  match value.as_array()?.as_slice() {
    [a, b] => {
      let (a, b) = (a.as_f64()?, b.as_f64()?);
      (a.is_finite() && b.is_finite() && a < b).then_some([a, b])
    }
    _ => None,
  }
}

fn visual_spec<'de, D>(de: D) -> Result<Option<VisualSpec>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  Ok(VisualSpec::from_value(Value::deserialize(de)?))
}

/// Recover the structured response from raw model output.
pub fn extract_structured(raw: &str) -> Extraction {
  if raw.trim().is_empty() {
    return Extraction::Empty;
  }

  let fenced = JSON_FENCE
    .captures(raw)
    .or_else(|| JSON_FENCE_INLINE.captures(raw))
    .and_then(|c| c.get(1));
  let (candidate, source) = match fenced {
    Some(m) => (m.as_str(), "fenced"),
    None => (raw, "whole_text"),
  };

  let value: Value = match serde_json::from_str(candidate.trim()) {
    Ok(v) => v,
    Err(e) => {
      debug!(target: "tutor", source, error = %e, preview = %trunc_for_log(candidate.trim(), 120), "Model output is not valid JSON");
      return Extraction::Malformed;
    }
  };

  if !value.is_object() {
    debug!(target: "tutor", source, "Model JSON is not an object");
    return Extraction::Malformed;
  }

  match serde_json::from_value::<ParsedResponse>(value) {
    Ok(parsed) => Extraction::Parsed(parsed),
    Err(e) => {
      debug!(target: "tutor", source, error = %e, "Model JSON did not match the response shape");
      Extraction::Malformed
    }
  }
}

/// Charts embedded as `[GRAPH_DATA]{...}[/GRAPH_DATA]`. Blocks that don't parse,
/// or lack a chart type, are skipped.
pub fn extract_graph_blocks(raw: &str) -> Vec<ChartSpec> {
  GRAPH_BLOCK
    .captures_iter(raw)
    .filter_map(|c| c.get(1))
    .filter_map(|m| match serde_json::from_str::<ChartSpec>(m.as_str().trim()) {
      Ok(chart) => Some(chart),
      Err(e) => {
        debug!(target: "tutor", error = %e, "Skipping unparseable GRAPH_DATA block");
        None
      }
    })
    .collect()
}

/// `raw` with every `[GRAPH_DATA]` block removed.
pub fn strip_graph_blocks(raw: &str) -> String {
  GRAPH_BLOCK.replace_all(raw, "").into_owned()
}
