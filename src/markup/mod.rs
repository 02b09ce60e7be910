//! HTML fragments for the four TRMNL layouts.
//!
//! Templates live in `templates/` and are compiled into the binary. The only
//! logic is `{{ name }}` substitution with HTML-escaped metric values.

use chrono::DateTime;
use serde::Serialize;

use crate::error::RenderError;
use crate::stats::MetricSet;

const FULL: (&str, &str) = ("full", include_str!("../../templates/full.html"));
const HALF_VERTICAL: (&str, &str) = (
  "half_vertical",
  include_str!("../../templates/half_vertical.html"),
);
const HALF_HORIZONTAL: (&str, &str) = (
  "half_horizontal",
  include_str!("../../templates/half_horizontal.html"),
);
const QUADRANT: (&str, &str) = ("quadrant", include_str!("../../templates/quadrant.html"));

/// Response body of the markup endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Markup {
  pub markup: String,
  pub markup_half_vertical: String,
  pub markup_half_horizontal: String,
  pub markup_quadrant: String,
  pub shared: String,
}

impl Markup {
  /// All four layouts showing `message` instead of figures. The display
  /// has no error path, so this is what it gets when there is no data.
  pub fn no_data(message: &str) -> Self {
    let message = escape_html(message);
    let view = |layout: &str, body: &str| {
      format!(
        "<div class=\"view view--{layout}\">\n  <div class=\"layout layout--col layout--center\">\n    <span class=\"title\">Orders</span>\n{body}  </div>\n</div>\n"
      )
    };
    let description = format!("    <span class=\"description\">{message}</span>\n");

    Self {
      markup: view("full", &description),
      markup_half_vertical: view("half_vertical", &description),
      markup_half_horizontal: view("half_horizontal", &description),
      markup_quadrant: view("quadrant", "    <span class=\"label\">No data</span>\n"),
      shared: String::new(),
    }
  }
}

/// Render every layout for `metrics`.
pub fn render(metrics: &MetricSet) -> Result<Markup, RenderError> {
  let lookup = |key: &str| -> Option<String> {
    match key {
      "updated" => Some(updated_label(&metrics.as_of)),
      _ => metrics.get(key).map(String::from),
    }
  };

  Ok(Markup {
    markup: substitute(FULL, &lookup)?,
    markup_half_vertical: substitute(HALF_VERTICAL, &lookup)?,
    markup_half_horizontal: substitute(HALF_HORIZONTAL, &lookup)?,
    markup_quadrant: substitute(QUADRANT, &lookup)?,
    shared: String::new(),
  })
}

/// `as_of` as "YYYY-MM-DD HH:MM" (UTC); unparseable values pass through
fn updated_label(as_of: &str) -> String {
  DateTime::parse_from_rfc3339(as_of)
    .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
    .unwrap_or_else(|_| as_of.to_string())
}

/// Replace every `{{ key }}` in the template. Unknown keys and unterminated
/// placeholders are errors rather than silently left in the output.
fn substitute(
  (name, template): (&'static str, &str),
  lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<String, RenderError> {
  let mut out = String::with_capacity(template.len());
  let mut rest = template;

  while let Some(start) = rest.find("{{") {
    out.push_str(&rest[..start]);
    let after = &rest[start + 2..];
    let end = after
      .find("}}")
      .ok_or(RenderError::Unterminated { template: name })?;
    let key = after[..end].trim();
    let value = lookup(key).ok_or_else(|| RenderError::UnknownKey {
      template: name,
      key: key.to_string(),
    })?;
    out.push_str(&escape_html(&value));
    rest = &after[end + 2..];
  }
  out.push_str(rest);

  Ok(out)
}

fn escape_html(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  for ch in s.chars() {
    match ch {
      '&' => out.push_str("&amp;"),
      '<' => out.push_str("&lt;"),
      '>' => out.push_str("&gt;"),
      '"' => out.push_str("&quot;"),
      '\'' => out.push_str("&#39;"),
      _ => out.push(ch),
    }
  }
  out
}
