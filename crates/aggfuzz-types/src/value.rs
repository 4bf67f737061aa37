use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Relative tolerance used when two doubles are compared for result
/// equivalence.
pub const FLOAT_TOLERANCE: f64 = 1e-12;

/// A single cell of a column.
///
/// Integral types of every width share [`Value::Integer`]; `REAL` and
/// `DOUBLE` share [`Value::Double`]. The column's [`DataType`](crate::DataType)
/// carries the declared width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    Varchar(String),
    /// Nanoseconds since the UNIX epoch.
    Timestamp(i64),
    Array(Vec<Self>),
    /// Entries in insertion order. Keys are never null.
    Map(Vec<(Self, Self)>),
}

impl Value {
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) | Self::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Self]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Rank of the variant in the canonical sort order.
    const fn sort_class(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Boolean(_) => 1,
            Self::Integer(_) | Self::Double(_) => 2,
            Self::Timestamp(_) => 3,
            Self::Varchar(_) => 4,
            Self::Array(_) => 5,
            Self::Map(_) => 6,
        }
    }

    /// Total order over values: NULL first, then booleans, numbers,
    /// timestamps, strings, arrays and maps. NaN sorts after every other
    /// number. Integers and doubles compare exactly by numeric value, and an
    /// integer sorts before a double of equal value. Containers compare
    /// element-wise.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        let class = self.sort_class().cmp(&other.sort_class());
        if class != Ordering::Equal {
            return class;
        }
        match (self, other) {
            (Self::Boolean(a), Self::Boolean(b)) => a.cmp(b),
            (Self::Integer(a), Self::Integer(b)) | (Self::Timestamp(a), Self::Timestamp(b)) => {
                a.cmp(b)
            }
            (Self::Double(a), Self::Double(b)) => cmp_floats(*a, *b),
            (Self::Integer(a), Self::Double(b)) => cmp_int_float(*a, *b).then(Ordering::Less),
            (Self::Double(a), Self::Integer(b)) => {
                cmp_int_float(*b, *a).reverse().then(Ordering::Greater)
            }
            (Self::Varchar(a), Self::Varchar(b)) => a.cmp(b),
            (Self::Array(a), Self::Array(b)) => cmp_slices(a, b, Self::total_cmp),
            (Self::Map(a), Self::Map(b)) => cmp_slices(a, b, |(ka, va), (kb, vb)| {
                ka.total_cmp(kb).then_with(|| va.total_cmp(vb))
            }),
            _ => Ordering::Equal,
        }
    }

    /// Equality used when comparing result batches: NaN equals NaN and
    /// doubles match within [`FLOAT_TOLERANCE`] relative error.
    pub fn equivalent(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Double(a), Self::Double(b)) => floats_equivalent(*a, *b),
            (Self::Array(a), Self::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equivalent(y))
            }
            (Self::Map(a), Self::Map(b)) => {
                a.len() == b.len()
                    && a
                        .iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka.equivalent(kb) && va.equivalent(vb))
            }
            _ => self == other,
        }
    }

    /// JSON encoding used when values cross into a SQL engine as text.
    ///
    /// Maps become arrays of `[key, value]` pairs so non-string keys survive;
    /// non-finite doubles become the strings `"NaN"`, `"Infinity"` and
    /// `"-Infinity"`.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Self::Null => Json::Null,
            Self::Boolean(b) => Json::Bool(*b),
            Self::Integer(v) | Self::Timestamp(v) => Json::from(*v),
            Self::Double(v) => {
                if v.is_nan() {
                    Json::from("NaN")
                } else if v.is_infinite() {
                    Json::from(if *v > 0.0 { "Infinity" } else { "-Infinity" })
                } else {
                    Json::from(*v)
                }
            }
            Self::Varchar(s) => Json::from(s.as_str()),
            Self::Array(items) => Json::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(entries) => Json::Array(
                entries
                    .iter()
                    .map(|(k, v)| Json::Array(vec![k.to_json(), v.to_json()]))
                    .collect(),
            ),
        }
    }
}

fn cmp_slices<T>(a: &[T], b: &[T], mut cmp: impl FnMut(&T, &T) -> Ordering) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        let ord = cmp(x, y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

/// Every NaN ties with every other NaN and sorts after all other doubles.
fn cmp_floats(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.total_cmp(&b),
    }
}

/// Exact comparison of an integer against a double. NaN is greater than
/// every integer.
fn cmp_int_float(i: i64, f: f64) -> Ordering {
    // 2^63; every i64 is below it and every i64 is at or above its negation.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if f.is_nan() || f >= LIMIT {
        return Ordering::Less;
    }
    if f < -LIMIT {
        return Ordering::Greater;
    }
    let whole = f.trunc();
    i.cmp(&(whole as i64))
        .then_with(|| whole.partial_cmp(&f).unwrap_or(Ordering::Equal))
}

fn floats_equivalent(a: f64, b: f64) -> bool {
    if a.is_nan() || b.is_nan() {
        return a.is_nan() && b.is_nan();
    }
    if a == b {
        return true;
    }
    let scale = a.abs().max(b.abs());
    (a - b).abs() <= FLOAT_TOLERANCE * scale
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Varchar(s) => write!(f, "'{s}'"),
            Self::Timestamp(v) => write!(f, "TIMESTAMP({v})"),
            Self::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k} => {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Varchar(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Varchar(s)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<Self>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::Array(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn total_order_classes() {
        let mut values = vec![
            Value::from("b"),
            Value::Integer(3),
            Value::Null,
            Value::Double(1.5),
            Value::Boolean(true),
            Value::from(vec![1_i64]),
        ];
        values.sort_by(Value::total_cmp);
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Boolean(true),
                Value::Double(1.5),
                Value::Integer(3),
                Value::from("b"),
                Value::from(vec![1_i64]),
            ]
        );
    }

    #[test]
    fn arrays_compare_lexicographically() {
        let short = Value::from(vec![1_i64, 2]);
        let long = Value::from(vec![1_i64, 2, 0]);
        let bigger = Value::from(vec![2_i64]);
        assert_eq!(short.total_cmp(&long), Ordering::Less);
        assert_eq!(long.total_cmp(&bigger), Ordering::Less);
    }

    #[test]
    fn mixed_numbers_compare_exactly() {
        let two_53 = 1_i64 << 53;
        let int = Value::Integer(two_53);
        let next = Value::Integer(two_53 + 1);
        let double = Value::Double(two_53 as f64);
        assert_eq!(int.total_cmp(&double), Ordering::Less);
        assert_eq!(double.total_cmp(&next), Ordering::Less);
        assert_eq!(int.total_cmp(&next), Ordering::Less);

        let cmp = |i: i64, f: f64| Value::Integer(i).total_cmp(&Value::Double(f));
        assert_eq!(cmp(2, 2.5), Ordering::Less);
        assert_eq!(cmp(-2, -2.5), Ordering::Greater);
        assert_eq!(cmp(i64::MAX, i64::MAX as f64), Ordering::Less);
        assert_eq!(cmp(i64::MIN, i64::MIN as f64), Ordering::Less);
        assert_eq!(cmp(i64::MIN, f64::NEG_INFINITY), Ordering::Greater);
        assert_eq!(cmp(i64::MAX, -f64::NAN), Ordering::Less);
        assert_eq!(
            Value::Double(f64::INFINITY).total_cmp(&Value::Double(-f64::NAN)),
            Ordering::Less
        );
    }

    #[test]
    fn nan_is_equivalent_to_nan() {
        assert!(Value::Double(f64::NAN).equivalent(&Value::Double(f64::NAN)));
        assert!(!Value::Double(f64::NAN).equivalent(&Value::Double(1.0)));
    }

    #[test]
    fn float_tolerance_is_relative() {
        let a = Value::Double(1.0e9);
        let b = Value::Double(1.0e9 + 1.0e-4);
        assert!(a.equivalent(&b));
        assert!(!Value::Double(1.0).equivalent(&Value::Double(1.0001)));
    }

    #[test]
    fn json_encoding_of_maps_and_specials() {
        let map = Value::Map(vec![
            (Value::Integer(1), Value::Double(f64::INFINITY)),
            (Value::Integer(2), Value::Null),
        ]);
        assert_eq!(map.to_json().to_string(), r#"[[1,"Infinity"],[2,null]]"#);
        assert_eq!(Value::Double(f64::NAN).to_json().to_string(), r#""NaN""#);
    }

    #[test]
    fn display_nested() {
        let v = Value::Map(vec![(Value::from("k"), Value::from(vec![1_i64, 2]))]);
        assert_eq!(v.to_string(), "{'k' => [1, 2]}");
    }

    fn leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Boolean),
            any::<i64>().prop_map(Value::Integer),
            any::<f64>().prop_map(Value::Double),
            "[a-z]{0,6}".prop_map(Value::Varchar),
        ]
    }

    fn value() -> impl Strategy<Value = Value> {
        leaf().prop_recursive(2, 16, 4, |inner| {
            prop::collection::vec(inner, 0..4).prop_map(Value::Array)
        })
    }

    fn mixed_number() -> impl Strategy<Value = Value> {
        let near_2_53 = (1_i64 << 53) - 4..(1_i64 << 53) + 4;
        prop_oneof![
            near_2_53.clone().prop_map(Value::Integer),
            near_2_53.prop_map(|i| Value::Double(i as f64)),
            prop_oneof![Just(i64::MIN), Just(i64::MAX), -3_i64..3].prop_map(Value::Integer),
            prop_oneof![
                Just(i64::MIN as f64),
                Just(i64::MAX as f64),
                Just(-0.0),
                Just(f64::NAN),
                Just(-f64::NAN),
                Just(f64::INFINITY),
                Just(f64::NEG_INFINITY),
                -3.0_f64..3.0,
            ]
            .prop_map(Value::Double),
            any::<i64>().prop_map(Value::Integer),
            any::<f64>().prop_map(Value::Double),
        ]
    }

    proptest! {
        #[test]
        fn total_cmp_is_transitive_over_mixed_numbers(
            a in mixed_number(),
            b in mixed_number(),
            c in mixed_number(),
        ) {
            prop_assert_eq!(a.total_cmp(&b), b.total_cmp(&a).reverse());
            if a.total_cmp(&b).is_le() && b.total_cmp(&c).is_le() {
                prop_assert!(a.total_cmp(&c).is_le(), "{a:?} <= {b:?} <= {c:?}");
            }
        }

        #[test]
        fn sorting_is_independent_of_input_order(
            mut values in prop::collection::vec(mixed_number(), 0..8),
        ) {
            let mut sorted = values.clone();
            sorted.sort_by(Value::total_cmp);
            values.reverse();
            values.sort_by(Value::total_cmp);
            prop_assert!(sorted.iter().zip(&values).all(|(x, y)| x.total_cmp(y).is_eq()));
        }

        #[test]
        fn total_cmp_is_antisymmetric(a in value(), b in value()) {
            prop_assert_eq!(a.total_cmp(&b), b.total_cmp(&a).reverse());
        }

        #[test]
        fn equivalent_is_reflexive(a in value()) {
            prop_assert!(a.equivalent(&a.clone()));
            prop_assert_eq!(a.total_cmp(&a), Ordering::Equal);
        }
    }
}
