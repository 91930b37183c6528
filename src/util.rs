//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces `{key}` tokens of the template with provided values in one pass;
/// inserted values are never scanned for further tokens. Unknown keys stay as-is.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = String::with_capacity(tpl.len());
  let mut rest = tpl;
  while let Some(start) = rest.find('{') {
    out.push_str(&rest[..start]);
    let after = &rest[start + 1..];
    let hit = after.find('}').and_then(|end| {
      let key = &after[..end];
      pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| (*v, end))
    });
    match hit {
      Some((value, end)) => {
        out.push_str(value);
        rest = &after[end + 1..];
      }
      None => {
        out.push('{');
        rest = after;
      }
    }
  }
  out.push_str(rest);
  out
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.chars().count() <= max {
    s.to_string()
  } else {
    let head: String = s.chars().take(max).collect();
    format!("{}… ({} bytes total)", head, s.len())
  }
}

/// Parse a boolean-ish env value ("1", "true", "yes", "on").
pub fn parse_flag(v: &str) -> bool {
  matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
