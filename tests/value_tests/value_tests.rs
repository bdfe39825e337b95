//! Tests for Value
//!
//! These tests verify:
//! - Type tags for every variant
//! - Typed accessors and the TypedValue mapping
//! - Serialization of edge-case values (empty arrays, empty strings)
//! - Display formatting

use tablesync::{TypedValue, Value, ValueType};

// =============================================================================
// Helper Functions
// =============================================================================

fn all_values() -> Vec<Value> {
    vec![
        Value::Boolean(true),
        Value::Double(-3.5),
        Value::String("hello".to_string()),
        Value::Raw(vec![0x00, 0xff, 0x10]),
        Value::BooleanArray(vec![true, false]),
        Value::DoubleArray(vec![1.0, 2.5]),
        Value::StringArray(vec!["a".to_string(), "b".to_string()]),
    ]
}

fn reencode(value: &Value) -> Value {
    let bytes = bincode::serialize(value).unwrap();
    bincode::deserialize(&bytes).unwrap()
}

// =============================================================================
// Type Tag Tests
// =============================================================================

#[test]
fn test_value_type_tags() {
    let tags: Vec<ValueType> = all_values().iter().map(Value::value_type).collect();

    assert_eq!(
        tags,
        vec![
            ValueType::Boolean,
            ValueType::Double,
            ValueType::String,
            ValueType::Raw,
            ValueType::BooleanArray,
            ValueType::DoubleArray,
            ValueType::StringArray,
        ]
    );
}

#[test]
fn test_value_type_tag_bytes() {
    assert_eq!(ValueType::Unknown as u8, 0x00);
    assert_eq!(ValueType::Boolean as u8, 0x01);
    assert_eq!(ValueType::Double as u8, 0x02);
    assert_eq!(ValueType::String as u8, 0x04);
    assert_eq!(ValueType::Raw as u8, 0x08);
    assert_eq!(ValueType::BooleanArray as u8, 0x10);
    assert_eq!(ValueType::DoubleArray as u8, 0x20);
    assert_eq!(ValueType::StringArray as u8, 0x40);
}

#[test]
fn test_scalar_and_array_classification() {
    assert!(ValueType::Boolean.is_scalar());
    assert!(ValueType::Double.is_scalar());
    assert!(ValueType::String.is_scalar());
    assert!(!ValueType::Raw.is_scalar());
    assert!(!ValueType::Unknown.is_scalar());

    assert!(ValueType::DoubleArray.is_array());
    assert!(!ValueType::Double.is_array());
    assert!(!ValueType::Raw.is_array());
}

// =============================================================================
// Accessor Tests
// =============================================================================

#[test]
fn test_accessors_match_only_their_variant() {
    let value = Value::Double(5.0);

    assert_eq!(value.as_double(), Some(5.0));
    assert_eq!(value.as_bool(), None);
    assert_eq!(value.as_str(), None);
    assert_eq!(value.as_double_array(), None);
}

#[test]
fn test_from_conversions() {
    assert_eq!(Value::from(true), Value::Boolean(true));
    assert_eq!(Value::from(2.0), Value::Double(2.0));
    assert_eq!(Value::from("x"), Value::String("x".to_string()));
    assert_eq!(Value::from(String::from("y")), Value::String("y".to_string()));
    assert_eq!(Value::from(vec![1.0, 2.0]), Value::DoubleArray(vec![1.0, 2.0]));
}

#[test]
fn test_typed_value_mapping() {
    assert_eq!(<bool as TypedValue>::TYPE, ValueType::Boolean);
    assert_eq!(<Vec<u8> as TypedValue>::TYPE, ValueType::Raw);
    assert_eq!(<Vec<String> as TypedValue>::TYPE, ValueType::StringArray);

    let value = vec![true, false].into_value();
    assert_eq!(Vec::<bool>::from_value(&value), Some(vec![true, false]));
    assert_eq!(f64::from_value(&value), None);
}

#[test]
fn test_typed_value_raw_is_not_string() {
    let value = Value::String("bytes".to_string());

    assert_eq!(Vec::<u8>::from_value(&value), None);
    assert_eq!(String::from_value(&value), Some("bytes".to_string()));
}

// =============================================================================
// Serialization Tests
// =============================================================================

#[test]
fn test_every_variant_survives_serialization() {
    for value in all_values() {
        assert_eq!(reencode(&value), value);
    }
}

#[test]
fn test_empty_values_survive_serialization() {
    let empties = vec![
        Value::String(String::new()),
        Value::Raw(Vec::new()),
        Value::BooleanArray(Vec::new()),
        Value::DoubleArray(Vec::new()),
        Value::StringArray(Vec::new()),
        Value::StringArray(vec![String::new(), String::new()]),
    ];

    for value in empties {
        let decoded = reencode(&value);
        assert_eq!(decoded, value);
        assert_eq!(decoded.value_type(), value.value_type());
    }
}

#[test]
fn test_special_doubles_survive_serialization() {
    assert_eq!(reencode(&Value::Double(f64::INFINITY)), Value::Double(f64::INFINITY));
    assert_eq!(reencode(&Value::Double(-0.0)), Value::Double(-0.0));

    assert_eq!(reencode(&Value::Double(f64::NAN)), Value::Double(f64::NAN));
    assert_eq!(
        reencode(&Value::DoubleArray(vec![f64::NAN, 1.0])),
        Value::DoubleArray(vec![f64::NAN, 1.0])
    );
}

#[test]
fn test_equality_is_structural() {
    assert_eq!(Value::Double(f64::NAN), Value::Double(f64::NAN));
    assert_ne!(Value::Double(1.0), Value::String("1.0".to_string()));
    assert_ne!(Value::Double(0.0), Value::Double(-0.0));
    assert_ne!(Value::DoubleArray(vec![1.0]), Value::DoubleArray(vec![1.0, 2.0]));
    assert_ne!(Value::BooleanArray(vec![]), Value::DoubleArray(vec![]));
}

// =============================================================================
// Display Tests
// =============================================================================

#[test]
fn test_display() {
    assert_eq!(Value::Boolean(false).to_string(), "false");
    assert_eq!(Value::Double(6.0).to_string(), "6");
    assert_eq!(Value::String("abc".to_string()).to_string(), "abc");
    assert_eq!(Value::Raw(vec![1, 2, 3]).to_string(), "<3 bytes>");
    assert_eq!(Value::DoubleArray(vec![1.5]).to_string(), "[1.5]");
    assert_eq!(ValueType::StringArray.to_string(), "string[]");
}
