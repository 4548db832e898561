//! Small utility helpers used across modules.

use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::Value;

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// This is intentionally simple (no nested/conditional logic).
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge model responses.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) {
    cut -= 1;
  }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}

/// Text if it has any non-whitespace content.
pub fn non_blank(s: Option<&str>) -> Option<&str> {
  s.map(str::trim).filter(|t| !t.is_empty())
}

// --- Lenient serde helpers for model output ---
//
// Model JSON routinely has the right keys with the wrong types. These helpers
// turn a mistyped field into "absent" instead of failing the whole document.

/// Any value that doesn't deserialize as `T` becomes `None`.
pub fn lenient<'de, D, T>(de: D) -> Result<Option<T>, D::Error>
where
  D: Deserializer<'de>,
  T: DeserializeOwned,
{
  let value = Value::deserialize(de)?;
  Ok(serde_json::from_value(value).ok())
}

/// Array elements that don't deserialize as `T` are dropped; a non-array is empty.
pub fn lenient_vec<'de, D, T>(de: D) -> Result<Vec<T>, D::Error>
where
  D: Deserializer<'de>,
  T: DeserializeOwned,
{
  let value = Value::deserialize(de)?;
  Ok(match value {
    Value::Array(items) => items.into_iter().filter_map(|v| serde_json::from_value(v).ok()).collect(),
    _ => Vec::new(),
  })
}

/// Strings pass through, numbers and booleans are stringified, anything else is `None`.
pub fn lenient_text<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
  D: Deserializer<'de>,
{
  Ok(scalar_text(Value::deserialize(de)?))
}

/// Like `lenient_text`, per array element; non-scalar elements are dropped.
pub fn lenient_text_vec<'de, D>(de: D) -> Result<Vec<String>, D::Error>
where
  D: Deserializer<'de>,
{
  Ok(match Value::deserialize(de)? {
    Value::Array(items) => items.into_iter().filter_map(scalar_text).collect(),
    _ => Vec::new(),
  })
}

fn scalar_text(value: Value) -> Option<String> {
  match value {
    Value::String(s) => Some(s),
    Value::Number(n) => Some(n.to_string()),
    Value::Bool(b) => Some(b.to_string()),
    _ => None,
  }
}
