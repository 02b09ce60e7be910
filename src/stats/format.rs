//! Display formatting in the German locale used by the dashboard:
//! `.` groups thousands, `,` separates decimals.

use std::fmt;

/// Group digits in threes with `.`: 1234567 -> "1.234.567"
pub fn group_thousands(n: u64) -> String {
  let digits = n.to_string();
  let mut out = String::with_capacity(digits.len() + digits.len() / 3);
  for (i, ch) in digits.chars().enumerate() {
    if i > 0 && (digits.len() - i) % 3 == 0 {
      out.push('.');
    }
    out.push(ch);
  }
  out
}

fn signed(negative: bool, body: String) -> String {
  if negative {
    format!("-{body}")
  } else {
    body
  }
}

/// Whole count: 2086 -> "2.086"
pub fn format_count(value: f64) -> String {
  let rounded = value.round();
  signed(rounded < 0.0, group_thousands(rounded.abs() as u64))
}

/// Euro amount: whole amounts drop the decimals (1968 -> "€1.968"),
/// others keep two (9916.5 -> "€9.916,50")
pub fn format_currency(value: f64) -> String {
  let cents = (value * 100.0).round();
  let negative = cents < 0.0;
  let cents = cents.abs() as u64;
  let (euros, rest) = (cents / 100, cents % 100);

  let body = if rest == 0 {
    format!("€{}", group_thousands(euros))
  } else {
    format!("€{},{:02}", group_thousands(euros), rest)
  };
  signed(negative, body)
}

/// Grams as kilograms with one decimal: 1800 -> "1,8kg"
pub fn format_weight_kg(grams: f64) -> String {
  let tenths = (grams / 100.0).round();
  let negative = tenths < 0.0;
  let tenths = tenths.abs() as u64;
  signed(
    negative,
    format!("{},{}kg", group_thousands(tenths / 10), tenths % 10),
  )
}

/// Relative change between two period totals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Change {
  /// Increase, in percent
  Up(f64),
  /// Decrease, in percent (positive magnitude)
  Down(f64),
  Flat,
  /// The previous value was zero, so there is no ratio
  Undefined,
}

impl Change {
  /// `(current - previous) / previous`, with the magnitude rounded up to one
  /// decimal so any real movement shows as at least 0.1%.
  pub fn between(current: f64, previous: f64) -> Self {
    if previous == 0.0 || !previous.is_finite() || !current.is_finite() {
      return Change::Undefined;
    }

    let ratio = (current - previous) / previous;
    // Subtract a hair before ceil so exact tenths (10.0%) are not bumped
    let tenths = (ratio.abs() * 1000.0 - 1e-9).ceil().max(0.0);
    let percent = tenths / 10.0;

    if tenths == 0.0 {
      Change::Flat
    } else if ratio > 0.0 {
      Change::Up(percent)
    } else {
      Change::Down(percent)
    }
  }
}

impl fmt::Display for Change {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Change::Up(p) => write!(f, "↑ {p:.1}%"),
      Change::Down(p) => write!(f, "↓ {p:.1}%"),
      Change::Flat => write!(f, "→ 0.0%"),
      Change::Undefined => write!(f, "n/a"),
    }
  }
}

/// "↓ 14.3% vs. previous week"; just "n/a" when there is no ratio
pub fn format_change(current: f64, previous: f64, period: &str) -> String {
  match Change::between(current, previous) {
    Change::Undefined => Change::Undefined.to_string(),
    change => format!("{change} vs. previous {period}"),
  }
}
