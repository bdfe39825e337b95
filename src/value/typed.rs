//! Typed access to values
//!
//! One implementation per native type, so callers pick an editor or
//! accessor by the Rust type they hold instead of sniffing tags.

use super::{Value, ValueType};

/// A native type that maps onto exactly one [`Value`] variant
pub trait TypedValue: Sized {
    /// The tag this type produces
    const TYPE: ValueType;

    /// Wrap into a value
    fn into_value(self) -> Value;

    /// Extract from a value of the matching variant
    fn from_value(value: &Value) -> Option<Self>;
}

impl TypedValue for bool {
    const TYPE: ValueType = ValueType::Boolean;

    fn into_value(self) -> Value {
        Value::Boolean(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl TypedValue for f64 {
    const TYPE: ValueType = ValueType::Double;

    fn into_value(self) -> Value {
        Value::Double(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_double()
    }
}

impl TypedValue for String {
    const TYPE: ValueType = ValueType::String;

    fn into_value(self) -> Value {
        Value::String(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl TypedValue for Vec<u8> {
    const TYPE: ValueType = ValueType::Raw;

    fn into_value(self) -> Value {
        Value::Raw(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_raw().map(<[u8]>::to_vec)
    }
}

impl TypedValue for Vec<bool> {
    const TYPE: ValueType = ValueType::BooleanArray;

    fn into_value(self) -> Value {
        Value::BooleanArray(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool_array().map(<[bool]>::to_vec)
    }
}

impl TypedValue for Vec<f64> {
    const TYPE: ValueType = ValueType::DoubleArray;

    fn into_value(self) -> Value {
        Value::DoubleArray(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_double_array().map(<[f64]>::to_vec)
    }
}

impl TypedValue for Vec<String> {
    const TYPE: ValueType = ValueType::StringArray;

    fn into_value(self) -> Value {
        Value::StringArray(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_string_array().map(<[String]>::to_vec)
    }
}
