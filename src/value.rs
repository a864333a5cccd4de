//! Scalar values carried as positional SQL parameters and row cells.
//!
//! Request documents arrive as JSON, but parameters handed to the driver and
//! cells read back from it need a richer carrier than `serde_json::Value`:
//! blobs and timestamps have no native JSON form. [`SqlValue`] is that
//! carrier; conversion to and from JSON is lossy only in the documented
//! directions (bytes render as hex, times as formatted text).

use chrono::NaiveDateTime;
use serde_json::{Number, Value as Json};

/// An ordered JSON object.
///
/// `serde_json` is built with `preserve_order`, so this map keeps insertion
/// order, the property every layer of the engine relies on: request key
/// order is execution order, and response shape mirrors request shape.
pub type Row = serde_json::Map<String, Json>;

/// Render format for [`SqlValue::Time`] when a driver wants text.
pub const TIME_LAYOUT: &str = "%Y-%m-%d %H:%M:%S";

/// A scalar database value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Time(NaiveDateTime),
}

impl SqlValue {
    /// Convert a JSON scalar into a parameter value.
    ///
    /// Arrays and objects never reach this point on well-formed requests
    /// (IN-lists are expanded element-wise by the condition builder); if one
    /// does, it is carried as its JSON text.
    pub fn from_json(value: &Json) -> SqlValue {
        match value {
            Json::Null => SqlValue::Null,
            Json::Bool(b) => SqlValue::Bool(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None => SqlValue::Float(n.as_f64().unwrap_or(0.0)),
            },
            Json::String(s) => SqlValue::Text(s.clone()),
            other => SqlValue::Text(other.to_string()),
        }
    }

    /// Parse a bare term from the operator mini-language into a value.
    ///
    /// Comma-group and BETWEEN terms are substrings of a request string;
    /// numeric-looking terms bind as numbers so the emitted parameters match
    /// the shape a literal JSON number would have produced.
    pub fn from_term(term: &str) -> SqlValue {
        if let Ok(i) = term.parse::<i64>() {
            return SqlValue::Integer(i);
        }
        if let Ok(f) = term.parse::<f64>() {
            return SqlValue::Float(f);
        }
        SqlValue::Text(term.to_string())
    }

    pub fn to_json(&self) -> Json {
        match self {
            SqlValue::Null => Json::Null,
            SqlValue::Bool(b) => Json::Bool(*b),
            SqlValue::Integer(i) => Json::Number(Number::from(*i)),
            SqlValue::Float(f) => Number::from_f64(*f).map(Json::Number).unwrap_or(Json::Null),
            SqlValue::Text(s) => Json::String(s.clone()),
            SqlValue::Bytes(b) => Json::String(hex::encode(b)),
            SqlValue::Time(t) => Json::String(t.format(TIME_LAYOUT).to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_json_scalars() {
        assert_eq!(SqlValue::from_json(&json!(null)), SqlValue::Null);
        assert_eq!(SqlValue::from_json(&json!(true)), SqlValue::Bool(true));
        assert_eq!(SqlValue::from_json(&json!(42)), SqlValue::Integer(42));
        assert_eq!(SqlValue::from_json(&json!(1.5)), SqlValue::Float(1.5));
        assert_eq!(
            SqlValue::from_json(&json!("abc")),
            SqlValue::Text("abc".to_string())
        );
    }

    #[test]
    fn from_term_prefers_numbers() {
        assert_eq!(SqlValue::from_term("82003"), SqlValue::Integer(82003));
        assert_eq!(SqlValue::from_term("-3"), SqlValue::Integer(-3));
        assert_eq!(SqlValue::from_term("2.5"), SqlValue::Float(2.5));
        assert_eq!(SqlValue::from_term("abc"), SqlValue::Text("abc".to_string()));
    }

    #[test]
    fn json_round_trip() {
        for v in [json!(null), json!(false), json!(7), json!(0.25), json!("x")] {
            assert_eq!(SqlValue::from_json(&v).to_json(), v);
        }
    }

    #[test]
    fn bytes_and_time_render_as_text() {
        assert_eq!(
            SqlValue::Bytes(vec![0xde, 0xad]).to_json(),
            json!("dead")
        );
        let t = NaiveDateTime::parse_from_str("2024-01-25 10:30:00", TIME_LAYOUT).unwrap();
        assert_eq!(SqlValue::Time(t).to_json(), json!("2024-01-25 10:30:00"));
    }
}
