// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use chrono::NaiveDateTime;
use std::cmp::Ordering;
use std::fmt;

/// A single cell. Source columns may mix representations row by row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(NaiveDateTime),
}
impl Value {
    /// NaN floats count as missing, the same as `Null`.
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float(v) => v.is_nan(),
            _ => false,
        }
    }
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_)) || matches!(self, Value::Float(v) if !v.is_nan())
    }
    /// Lenient numeric coercion: unparsable text and non-finite floats become `None`.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) if v.is_finite() => Some(*v),
            Value::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            _ => None,
        }
    }
    fn rank(&self) -> u8 {
        match self {
            Value::Int(_) => 0,
            Value::Float(v) if !v.is_nan() => 0,
            Value::Timestamp(_) => 1,
            Value::Text(_) => 2,
            _ => 3,
        }
    }
    /// Total order used for grouping and sorting: numbers, then timestamps,
    /// then text, with missing values last.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match self.rank().cmp(&other.rank()) {
            Ordering::Equal => {}
            unequal => return unequal,
        }
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Value::Int(a), Value::Float(b)) => cmp_int_float(*a, *b),
            (Value::Float(a), Value::Int(b)) => cmp_int_float(*b, *a).reverse(),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;

/// Exact comparison of an integer with a non-NaN float, without rounding
/// the integer through `f64`.
fn cmp_int_float(int: i64, float: f64) -> Ordering {
    if float >= TWO_POW_63 {
        return Ordering::Less;
    }
    if float < -TWO_POW_63 {
        return Ordering::Greater;
    }
    let floor = float.floor();
    match i128::from(int).cmp(&(floor as i128)) {
        Ordering::Equal if float > floor => Ordering::Less,
        ordering => ordering,
    }
}
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%dT%H:%M:%S")),
        }
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}
impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Value::Int)
                .or_else(|| n.as_f64().map(Value::Float))
                .unwrap_or(Value::Null),
            serde_json::Value::String(s) => Value::Text(s),
            other => Value::Text(other.to_string()),
        }
    }
}

/// Ordering wrapper so values can key a `BTreeMap`.
#[derive(Debug, Clone)]
pub struct OrderedValue(pub Value);
impl PartialEq for OrderedValue {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}
impl Eq for OrderedValue {}
impl PartialOrd for OrderedValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for OrderedValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn numeric_coercion_is_lenient() {
        assert_eq!(Value::Int(3).to_f64(), Some(3.0));
        assert_eq!(Value::from(" 2.5 ").to_f64(), Some(2.5));
        assert_eq!(Value::from("abc").to_f64(), None);
        assert_eq!(Value::Float(f64::NAN).to_f64(), None);
        assert_eq!(Value::Null.to_f64(), None);
    }

    #[test]
    fn ordering_puts_numbers_first_and_nulls_last() {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let mut values = vec![
            Value::Null,
            Value::from("b"),
            Value::Timestamp(ts),
            Value::Float(2.5),
            Value::Int(1),
        ];
        values.sort_by(Value::total_cmp);
        assert_eq!(
            values,
            vec![
                Value::Int(1),
                Value::Float(2.5),
                Value::Timestamp(ts),
                Value::from("b"),
                Value::Null
            ]
        );
    }

    #[test]
    fn ints_and_floats_share_group_keys() {
        assert_eq!(OrderedValue(Value::Int(10)), OrderedValue(Value::Float(10.0)));
        assert_ne!(OrderedValue(Value::Int(10)), OrderedValue(Value::from("10")));
    }

    #[test]
    fn mixed_int_float_order_is_exact_beyond_f64_precision() {
        let big = 1i64 << 53;
        let float = Value::Float(big as f64);
        assert_eq!(Value::Int(big).total_cmp(&float), Ordering::Equal);
        assert_eq!(Value::Int(big + 1).total_cmp(&float), Ordering::Greater);
        assert_eq!(float.total_cmp(&Value::Int(big + 1)), Ordering::Less);
        assert_ne!(OrderedValue(Value::Int(big + 1)), OrderedValue(float));

        assert_eq!(Value::Int(2).total_cmp(&Value::Float(2.5)), Ordering::Less);
        assert_eq!(Value::Int(-3).total_cmp(&Value::Float(-2.5)), Ordering::Less);
        assert_eq!(Value::Int(-2).total_cmp(&Value::Float(-2.5)), Ordering::Greater);
        assert_eq!(Value::Int(i64::MAX).total_cmp(&Value::Float(f64::INFINITY)), Ordering::Less);
        assert_eq!(Value::Int(i64::MIN).total_cmp(&Value::Float(i64::MIN as f64)), Ordering::Equal);
        assert_eq!(Value::Float(f64::NEG_INFINITY).total_cmp(&Value::Int(i64::MIN)), Ordering::Less);
        assert_eq!(Value::Float(-0.0).total_cmp(&Value::Int(0)), Ordering::Equal);
    }

    #[test]
    fn converts_json_scalars() {
        assert_eq!(Value::from(serde_json::json!(4)), Value::Int(4));
        assert_eq!(Value::from(serde_json::json!(4.5)), Value::Float(4.5));
        assert_eq!(Value::from(serde_json::json!("x")), Value::from("x"));
        assert_eq!(Value::from(serde_json::json!(null)), Value::Null);
    }
}
