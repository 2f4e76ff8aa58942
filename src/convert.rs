//! Declared-type value conversion.
//!
//! Extracted values arrive as arbitrary JSON; form fields expect narrow
//! string formats. Conversion is driven by the template's declared type
//! and is deliberately forgiving: anything unconvertible passes through
//! as text rather than erroring out.
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

const TRUTHY: [&str; 8] = ["oui", "yes", "true", "1", "on", "x", "checked", "vrai"];
const FALSY: [&str; 7] = ["non", "no", "false", "0", "off", "", "faux"];

static DATE_DOTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})\.(\d{1,2})\.(\d{4})$").unwrap_or_else(|e| panic!("invalid regex: {e}"))
});
static DATE_SLASHES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})$").unwrap_or_else(|e| panic!("invalid regex: {e}"))
});
static DATE_DASHES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})-(\d{1,2})-(\d{4})$").unwrap_or_else(|e| panic!("invalid regex: {e}"))
});
static DATE_ISO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").unwrap_or_else(|e| panic!("invalid regex: {e}"))
});
static NON_NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9.,\-]").unwrap_or_else(|e| panic!("invalid regex: {e}")));

pub struct TypeConverter;

impl TypeConverter {
    /// Convert a raw JSON value to the string a form field expects,
    /// according to the declared type.
    #[must_use]
    pub fn convert(value: &Value, field_type: &str) -> String {
        match field_type.to_lowercase().as_str() {
            "bool" | "boolean" | "checkbox" => Self::convert_boolean(value),
            "date" => Self::convert_date(value),
            "int" | "integer" | "number" => Self::convert_number(value),
            "percent" => Self::convert_percent(value),
            _ => Self::to_text(value),
        }
    }

    /// Convert a value for a field known to be an XFA checkbox.
    ///
    /// Checkboxes require the literal strings `On` and `Off`; the
    /// `oui`/`non` vocabulary of [`convert_boolean`] would uncheck the
    /// box. This takes precedence over the declared type.
    #[must_use]
    pub fn convert_for_checkbox(value: &Value) -> String {
        match value {
            Value::Bool(b) => if *b { "On" } else { "Off" }.to_string(),
            Value::Number(n) => {
                if n.as_f64().is_some_and(|f| f != 0.0) {
                    "On".to_string()
                } else {
                    "Off".to_string()
                }
            }
            Value::Null => "Off".to_string(),
            Value::String(s) => {
                if s == "On" || s == "Off" {
                    return s.clone();
                }
                let lower = s.trim().to_lowercase();
                if TRUTHY.contains(&lower.as_str()) {
                    "On".to_string()
                } else {
                    "Off".to_string()
                }
            }
            _ => "Off".to_string(),
        }
    }

    /// French-form boolean text: `oui` or `non`.
    fn convert_boolean(value: &Value) -> String {
        match value {
            Value::Bool(b) => if *b { "oui" } else { "non" }.to_string(),
            Value::Number(n) => {
                if n.as_f64().is_some_and(|f| f != 0.0) {
                    "oui".to_string()
                } else {
                    "non".to_string()
                }
            }
            Value::Null => "non".to_string(),
            Value::String(s) => {
                let lower = s.trim().to_lowercase();
                if TRUTHY.contains(&lower.as_str()) {
                    return "oui".to_string();
                }
                if !FALSY.contains(&lower.as_str()) {
                    tracing::debug!("unrecognized boolean value '{s}', defaulting to non");
                }
                "non".to_string()
            }
            _ => "non".to_string(),
        }
    }

    /// Normalize common date shapes to `DD.MM.YYYY`. ISO `YYYY-MM-DD`
    /// input is reordered; unrecognized input passes through.
    fn convert_date(value: &Value) -> String {
        let text = Self::to_text(value);

        for re in [&*DATE_DOTS, &*DATE_SLASHES, &*DATE_DASHES] {
            if let Some(caps) = re.captures(&text) {
                return format!("{:0>2}.{:0>2}.{}", &caps[1], &caps[2], &caps[3]);
            }
        }
        if let Some(caps) = DATE_ISO.captures(&text) {
            return format!("{}.{}.{}", &caps[3], &caps[2], &caps[1]);
        }
        text
    }

    /// String form of a number. Comma decimal separators are accepted,
    /// integral values render without a fractional part, non-integral
    /// values keep theirs. A failed parse is retried after stripping
    /// everything non-numeric, and passes through if that fails too.
    fn convert_number(value: &Value) -> String {
        if let Value::Number(n) = value {
            if let Some(i) = n.as_i64() {
                return i.to_string();
            }
            if let Some(f) = n.as_f64() {
                return render_numeric(f);
            }
        }

        let text = Self::to_text(value);
        if let Some(f) = parse_numeric(&text) {
            return render_numeric(f);
        }

        let stripped = NON_NUMERIC.replace_all(&text, "");
        if let Some(f) = parse_numeric(&stripped) {
            return render_numeric(f);
        }
        text
    }

    /// Percentage as a bare rounded integer, `%` sign dropped.
    fn convert_percent(value: &Value) -> String {
        let text = Self::to_text(value);
        let stripped = text.replace('%', "");
        let trimmed = stripped.trim();
        match trimmed.replace(',', ".").parse::<f64>() {
            Ok(f) => (f.round() as i64).to_string(),
            Err(_) => trimmed.to_string(),
        }
    }

    fn to_text(value: &Value) -> String {
        match value {
            Value::String(s) => s.trim().to_string(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// Parse a numeric string with either decimal separator.
fn parse_numeric(text: &str) -> Option<f64> {
    let normalized = text.trim().replace(',', ".");
    if normalized.is_empty() {
        return None;
    }
    normalized.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Render a finite float: integer form when it has no fractional part.
fn render_numeric(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        (f as i64).to_string()
    } else {
        f.to_string()
    }
}
