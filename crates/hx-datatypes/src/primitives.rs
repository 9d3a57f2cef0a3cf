//! FHIR primitive datatypes.
//!
//! Each primitive carries the regex pattern given by the FHIR
//! specification and an optional coercion from the string wire form to
//! the native JSON scalar.
//!
//! SOURCE: https://hl7.org/fhir/R4B/datatypes.html

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

const YEAR: &str = r"([0-9]([0-9]([0-9][1-9]|[1-9]0)|[1-9]00)|[1-9]000)";
const MONTH: &str = r"(0[1-9]|1[0-2])";
const DAY: &str = r"(0[1-9]|[1-2][0-9]|3[0-1])";
const HOUR: &str = r"([01][0-9]|2[0-3])";
const MINUTES: &str = r"[0-5][0-9]";
const SECONDS: &str = r"([0-5][0-9]|60)(\.[0-9]+)?";
const TIMEZONE: &str = r"(Z|(\+|-)((0[0-9]|1[0-3]):[0-5][0-9]|14:00))";

/// The FHIR primitive datatypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveType {
    Boolean,
    Integer,
    Integer64,
    UnsignedInt,
    PositiveInt,
    Decimal,
    String,
    Uri,
    Url,
    Canonical,
    Code,
    Oid,
    Id,
    Markdown,
    Uuid,
    Base64Binary,
    Date,
    DateTime,
    Instant,
    Time,
}

impl PrimitiveType {
    pub const ALL: [PrimitiveType; 20] = [
        PrimitiveType::Boolean,
        PrimitiveType::Integer,
        PrimitiveType::Integer64,
        PrimitiveType::UnsignedInt,
        PrimitiveType::PositiveInt,
        PrimitiveType::Decimal,
        PrimitiveType::String,
        PrimitiveType::Uri,
        PrimitiveType::Url,
        PrimitiveType::Canonical,
        PrimitiveType::Code,
        PrimitiveType::Oid,
        PrimitiveType::Id,
        PrimitiveType::Markdown,
        PrimitiveType::Uuid,
        PrimitiveType::Base64Binary,
        PrimitiveType::Date,
        PrimitiveType::DateTime,
        PrimitiveType::Instant,
        PrimitiveType::Time,
    ];

    /// The PascalCase name used in type references and choice suffixes.
    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveType::Boolean => "Boolean",
            PrimitiveType::Integer => "Integer",
            PrimitiveType::Integer64 => "Integer64",
            PrimitiveType::UnsignedInt => "UnsignedInt",
            PrimitiveType::PositiveInt => "PositiveInt",
            PrimitiveType::Decimal => "Decimal",
            PrimitiveType::String => "String",
            PrimitiveType::Uri => "Uri",
            PrimitiveType::Url => "Url",
            PrimitiveType::Canonical => "Canonical",
            PrimitiveType::Code => "Code",
            PrimitiveType::Oid => "Oid",
            PrimitiveType::Id => "Id",
            PrimitiveType::Markdown => "Markdown",
            PrimitiveType::Uuid => "Uuid",
            PrimitiveType::Base64Binary => "Base64Binary",
            PrimitiveType::Date => "Date",
            PrimitiveType::DateTime => "DateTime",
            PrimitiveType::Instant => "Instant",
            PrimitiveType::Time => "Time",
        }
    }

    /// Resolve a primitive by name. Accepts both the wire casing
    /// (`dateTime`) and PascalCase (`DateTime`).
    pub fn from_name(name: &str) -> Option<Self> {
        let mut chars = name.chars();
        let pascal = match chars.next() {
            Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
            None => return None,
        };
        PrimitiveType::ALL.iter().copied().find(|p| p.name() == pascal)
    }

    fn pattern_source(&self) -> String {
        match self {
            PrimitiveType::Boolean => "true|false".to_string(),
            PrimitiveType::Integer | PrimitiveType::Integer64 => {
                r"[0]|[-+]?[1-9][0-9]*".to_string()
            }
            PrimitiveType::UnsignedInt => r"[0]|([1-9][0-9]*)".to_string(),
            PrimitiveType::PositiveInt => r"\+?[1-9][0-9]*".to_string(),
            PrimitiveType::Decimal => r"-?(0|[1-9][0-9]*)(\.[0-9]+)?([eE][+-]?[0-9]+)?".to_string(),
            PrimitiveType::String | PrimitiveType::Markdown => r"[\s\S]*".to_string(),
            PrimitiveType::Uri => r"\S*".to_string(),
            PrimitiveType::Url | PrimitiveType::Canonical => r"\S*".to_string(),
            PrimitiveType::Code => r"[^\s]+(\s[^\s]+)*".to_string(),
            PrimitiveType::Oid => r"urn:oid:[0-2](\.(0|[1-9][0-9]*))+".to_string(),
            PrimitiveType::Id => r"[A-Za-z0-9\-\.]{1,64}".to_string(),
            PrimitiveType::Uuid => {
                r"urn:uuid:[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}".to_string()
            }
            PrimitiveType::Base64Binary => r"(\s*([0-9a-zA-Z\+/=]){4}\s*)+".to_string(),
            PrimitiveType::Date => format!("{YEAR}(-{MONTH}(-{DAY})?)?"),
            PrimitiveType::DateTime => format!(
                "{YEAR}(-{MONTH}(-{DAY})?)?(T{HOUR}(:{MINUTES}(:{SECONDS}({TIMEZONE})?)?)?)?"
            ),
            PrimitiveType::Instant => {
                format!("{YEAR}-{MONTH}-{DAY}T{HOUR}:{MINUTES}:{SECONDS}({TIMEZONE})?")
            }
            PrimitiveType::Time => format!("{HOUR}(:{MINUTES}(:{SECONDS}({TIMEZONE})?)?)?"),
        }
    }

    /// The compiled, anchored regex for this primitive's string form.
    pub fn pattern(&self) -> &'static Regex {
        static PATTERNS: Lazy<HashMap<PrimitiveType, Regex>> = Lazy::new(|| {
            PrimitiveType::ALL
                .iter()
                .map(|p| {
                    let source = format!("^(?:{})$", p.pattern_source());
                    (*p, Regex::new(&source).expect("primitive pattern compiles"))
                })
                .collect()
        });
        &PATTERNS[self]
    }

    /// True when a string conforms to the primitive's wire form.
    pub fn matches(&self, text: &str) -> bool {
        self.pattern().is_match(text)
    }

    /// True when the primitive is represented by a JSON string rather
    /// than a native scalar.
    pub fn is_string_repr(&self) -> bool {
        !matches!(
            self,
            PrimitiveType::Boolean
                | PrimitiveType::Integer
                | PrimitiveType::Integer64
                | PrimitiveType::UnsignedInt
                | PrimitiveType::PositiveInt
                | PrimitiveType::Decimal
        )
    }

    /// Validate a JSON value against this primitive.
    pub fn validate_value(&self, value: &Value) -> bool {
        match (self, value) {
            (PrimitiveType::Boolean, Value::Bool(_)) => true,
            (
                PrimitiveType::Integer
                | PrimitiveType::Integer64
                | PrimitiveType::UnsignedInt
                | PrimitiveType::PositiveInt,
                Value::Number(n),
            ) => {
                let within_sign = match self {
                    PrimitiveType::UnsignedInt => n.as_u64().is_some(),
                    PrimitiveType::PositiveInt => n.as_u64().map(|v| v > 0).unwrap_or(false),
                    _ => n.as_i64().is_some(),
                };
                within_sign
            }
            (PrimitiveType::Decimal, Value::Number(_)) => true,
            (_, Value::String(s)) => self.matches(s),
            _ => false,
        }
    }

    /// Coerce a string wire form into the native JSON scalar where one
    /// exists. Returns `None` when the text does not match the pattern.
    pub fn coerce(&self, text: &str) -> Option<Value> {
        if !self.matches(text) {
            return None;
        }
        match self {
            PrimitiveType::Boolean => Some(Value::Bool(text == "true")),
            PrimitiveType::Integer
            | PrimitiveType::Integer64
            | PrimitiveType::UnsignedInt
            | PrimitiveType::PositiveInt => text.parse::<i64>().ok().map(Value::from),
            PrimitiveType::Decimal => text.parse::<f64>().ok().map(Value::from),
            _ => Some(Value::String(text.to_string())),
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_name_accepts_wire_casing() {
        assert_eq!(
            PrimitiveType::from_name("dateTime"),
            Some(PrimitiveType::DateTime)
        );
        assert_eq!(
            PrimitiveType::from_name("positiveInt"),
            Some(PrimitiveType::PositiveInt)
        );
        assert_eq!(PrimitiveType::from_name("NotAType"), None);
    }

    #[test]
    fn test_date_patterns() {
        assert!(PrimitiveType::Date.matches("2024"));
        assert!(PrimitiveType::Date.matches("2024-01"));
        assert!(PrimitiveType::Date.matches("2024-01-02"));
        assert!(!PrimitiveType::Date.matches("2024-13-02"));
        assert!(PrimitiveType::Instant.matches("2015-02-07T13:28:17.239+02:00"));
        assert!(!PrimitiveType::Instant.matches("2015-02-07"));
        assert!(PrimitiveType::Time.matches("14:30:14.559"));
    }

    #[test]
    fn test_validate_native_scalars() {
        assert!(PrimitiveType::Boolean.validate_value(&json!(true)));
        assert!(PrimitiveType::PositiveInt.validate_value(&json!(3)));
        assert!(!PrimitiveType::PositiveInt.validate_value(&json!(0)));
        assert!(PrimitiveType::Decimal.validate_value(&json!(1.5)));
        assert!(PrimitiveType::Code.validate_value(&json!("final")));
        assert!(!PrimitiveType::Code.validate_value(&json!(" final")));
    }

    #[test]
    fn test_coerce_to_native() {
        assert_eq!(PrimitiveType::Boolean.coerce("true"), Some(json!(true)));
        assert_eq!(PrimitiveType::Integer.coerce("-12"), Some(json!(-12)));
        assert_eq!(PrimitiveType::Decimal.coerce("2.5"), Some(json!(2.5)));
        assert_eq!(PrimitiveType::Integer.coerce("1.5"), None);
    }
}
