//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Log-safe preview: at most `max` chars, never splitting a code point.
pub fn preview(s: &str, max: usize) -> String {
  let mut chars = s.chars();
  let head: String = chars.by_ref().take(max).collect();
  if chars.next().is_some() { format!("{head}…") } else { head }
}
