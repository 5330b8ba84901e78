/*!
 * Core data types for MockVISA.
 *
 * Values produced by command handlers, the value types declared for captured
 * arguments, and the string coercion applied to those arguments.
 */
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Declared type of a captured argument or of a handler result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// No meaningful result
    Null,
    /// Boolean
    Bool,
    /// Integer
    Integer,
    /// Floating point
    Float,
    /// Text
    String,
    /// Raw bytes
    Binary,
    /// A sub-device reached through a route
    Device,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Null => "null",
            ValueType::Bool => "bool",
            ValueType::Integer => "integer",
            ValueType::Float => "float",
            ValueType::String => "string",
            ValueType::Binary => "binary",
            ValueType::Device => "device",
        };
        f.write_str(name)
    }
}

/// A value returned by a command handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    /// No output
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Integer(i64),
    /// Floating-point value
    Float(f64),
    /// String value
    String(String),
    /// Binary data
    Binary(Bytes),
}

impl Value {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The type tag of this value
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Bool,
            Value::Integer(_) => ValueType::Integer,
            Value::Float(_) => ValueType::Float,
            Value::String(_) => ValueType::String,
            Value::Binary(_) => ValueType::Binary,
        }
    }

    /// Try to get a boolean value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get an integer value
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get a float value
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get binary data
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// The bytes a session places in its read buffer, `None` for no output
    pub fn to_reply(&self) -> Option<Bytes> {
        match self {
            Value::Null => None,
            Value::Binary(b) => Some(b.clone()),
            other => Some(Bytes::from(other.to_string())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => f.write_str(if *b { "1" } else { "0" }),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => f.write_str(&format_float(*x)),
            Value::String(s) => f.write_str(s),
            Value::Binary(b) => f.write_str(&String::from_utf8_lossy(b)),
        }
    }
}

/// Format a float the way instrument replies are expected to look.
///
/// Shortest round-trip digits, always with a fractional part or an exponent:
/// `12.0`, `13.4`, `1e+16`, `1e-05`.
pub fn format_float(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let repr = format!("{:?}", x);
    match repr.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => repr,
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float(f as f64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Binary(Bytes::from(b))
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Binary(b)
    }
}

/// A type a captured argument string can be coerced into
pub trait Arg: Sized + 'static {
    /// Declared value type
    const TYPE: ValueType;

    /// Convert the raw captured text
    fn coerce(raw: &str) -> std::result::Result<Self, String>;
}

fn parse_trimmed<T>(raw: &str) -> std::result::Result<T, String>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| e.to_string())
}

macro_rules! numeric_arg {
    ($ty:ty, $value_type:expr) => {
        impl Arg for $ty {
            const TYPE: ValueType = $value_type;

            fn coerce(raw: &str) -> std::result::Result<Self, String> {
                parse_trimmed(raw)
            }
        }
    };
}

numeric_arg!(i64, ValueType::Integer);
numeric_arg!(i32, ValueType::Integer);
numeric_arg!(u32, ValueType::Integer);
numeric_arg!(u8, ValueType::Integer);
numeric_arg!(usize, ValueType::Integer);
numeric_arg!(f64, ValueType::Float);
numeric_arg!(f32, ValueType::Float);

impl Arg for bool {
    const TYPE: ValueType = ValueType::Bool;

    fn coerce(raw: &str) -> std::result::Result<Self, String> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "1" | "ON" | "TRUE" => Ok(true),
            "0" | "OFF" | "FALSE" => Ok(false),
            other => Err(format!("{:?} is not a boolean", other)),
        }
    }
}

impl Arg for String {
    const TYPE: ValueType = ValueType::String;

    fn coerce(raw: &str) -> std::result::Result<Self, String> {
        Ok(raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_formatting() {
        assert_eq!(Value::Float(12.0).to_string(), "12.0");
        assert_eq!(Value::Float(13.4).to_string(), "13.4");
        assert_eq!(Value::Float(-12.0).to_string(), "-12.0");
        assert_eq!(Value::Float(2.0 * 13.4).to_string(), "26.8");
        assert_eq!(format_float(1e16), "1e+16");
        assert_eq!(format_float(1.5e-7), "1.5e-07");
        assert_eq!(format_float(f64::INFINITY), "inf");
        assert_eq!(format_float(f64::NAN), "nan");
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Integer(0).to_string(), "0");
        assert_eq!(Value::Bool(true).to_string(), "1");
        assert_eq!(Value::from("Mocker,testing,00000,0.01").to_string(), "Mocker,testing,00000,0.01");
        assert_eq!(Value::Null.to_string(), "");
    }

    #[test]
    fn test_reply_bytes() {
        assert!(Value::Null.to_reply().is_none());
        assert_eq!(Value::Float(2.3).to_reply().unwrap().as_ref(), b"2.3");
        let raw = Value::from(vec![0u8, 159, 146, 150]);
        assert_eq!(raw.to_reply().unwrap().as_ref(), &[0u8, 159, 146, 150]);
        assert_eq!(raw.value_type(), ValueType::Binary);
    }

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(i64::coerce("1"), Ok(1));
        assert_eq!(i64::coerce(" 42 "), Ok(42));
        assert_eq!(f64::coerce("12"), Ok(12.0));
        assert_eq!(f64::coerce("-13.4"), Ok(-13.4));
        assert!(i64::coerce("1.5").is_err());
        assert!(f64::coerce("volts").is_err());
        assert!(u8::coerce("256").is_err());
    }

    #[test]
    fn test_bool_and_string_coercion() {
        assert_eq!(bool::coerce("on"), Ok(true));
        assert_eq!(bool::coerce("0"), Ok(false));
        assert!(bool::coerce("maybe").is_err());
        assert_eq!(String::coerce(" keep "), Ok(" keep ".to_string()));
    }

    #[test]
    fn test_value_serialization() {
        let json = serde_json::to_string(&Value::Float(2.5)).unwrap();
        assert_eq!(json, "2.5");
        let back: Value = serde_json::from_str("\"idn\"").unwrap();
        assert_eq!(back.as_str(), Some("idn"));
    }
}
