//! Conversion of engine values into transport-safe values.

use serde::{
    Serialize, Serializer,
    ser::{Error as _, SerializeSeq},
};

use crate::engine::{EngineValue, NdArray};

/// Transport-safe value.
///
/// Serializing a non-finite number fails instead of silently becoming
/// `null`, so a serialization dry-run catches values JSON cannot carry.
#[derive(Debug, Clone, PartialEq)]
pub enum ConvertedValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Number(f64),
    String(String),
    List(Vec<ConvertedValue>),
}

impl Serialize for ConvertedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::UInt(u) => serializer.serialize_u64(*u),
            Self::Number(n) if n.is_finite() => serializer.serialize_f64(*n),
            Self::Number(n) => Err(S::Error::custom(format!(
                "non-finite number {n} has no JSON representation"
            ))),
            Self::String(s) => serializer.serialize_str(s),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

/// Convert an engine value. Never fails; unsupported types degrade to text.
#[must_use]
pub fn convert(value: &EngineValue) -> ConvertedValue {
    match value {
        EngineValue::Empty => ConvertedValue::Null,
        EngineValue::Bool(b) => ConvertedValue::Bool(*b),
        EngineValue::Int(i) => ConvertedValue::Int(*i),
        EngineValue::Real(n) => ConvertedValue::Number(*n),
        EngineValue::Text(s) | EngineValue::Char(s) => ConvertedValue::String(s.clone()),
        EngineValue::Numeric { array, .. } => squeeze_nest(array, ConvertedValue::Number),
        EngineValue::Integer { array, .. } => squeeze_nest(array, integer),
        EngineValue::Logical(array) => squeeze_nest(array, ConvertedValue::Bool),
        EngineValue::Other { class, description } => {
            tracing::warn!(class = %class, "Unsupported engine type, returning its text form");
            ConvertedValue::String(description.clone())
        }
    }
}

/// Integer-class elements keep their exact value.
fn integer(value: i128) -> ConvertedValue {
    if let Ok(i) = i64::try_from(value) {
        ConvertedValue::Int(i)
    } else if let Ok(u) = u64::try_from(value) {
        ConvertedValue::UInt(u)
    } else {
        ConvertedValue::String(value.to_string())
    }
}

/// Drop singleton dimensions, then nest the rest outermost-first.
fn squeeze_nest<T: Copy>(array: &NdArray<T>, leaf: fn(T) -> ConvertedValue) -> ConvertedValue {
    let data = array.data();
    let dims: Vec<usize> = array.dims().iter().copied().filter(|&d| d != 1).collect();

    if dims.is_empty() {
        return data.first().map_or(ConvertedValue::Null, |&v| leaf(v));
    }

    // Removing size-1 dimensions keeps the column-major offsets intact.
    let mut strides = Vec::with_capacity(dims.len());
    let mut stride = 1;
    for &d in &dims {
        strides.push(stride);
        stride *= d;
    }

    nest(data, &dims, &strides, 0, leaf)
}

fn nest<T: Copy>(
    data: &[T],
    dims: &[usize],
    strides: &[usize],
    offset: usize,
    leaf: fn(T) -> ConvertedValue,
) -> ConvertedValue {
    let (Some((&len, inner_dims)), Some((&stride, inner_strides))) =
        (dims.split_first(), strides.split_first())
    else {
        return data.get(offset).map_or(ConvertedValue::Null, |&v| leaf(v));
    };

    let items = (0..len)
        .map(|i| {
            let at = offset + i * stride;
            if inner_dims.is_empty() {
                data.get(at).map_or(ConvertedValue::Null, |&v| leaf(v))
            } else {
                nest(data, inner_dims, inner_strides, at, leaf)
            }
        })
        .collect();
    ConvertedValue::List(items)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn numbers(values: &[f64]) -> ConvertedValue {
        ConvertedValue::List(values.iter().copied().map(ConvertedValue::Number).collect())
    }

    #[test]
    fn test_scalars_pass_through() {
        assert_eq!(convert(&EngineValue::Empty), ConvertedValue::Null);
        assert_eq!(convert(&EngineValue::Bool(true)), ConvertedValue::Bool(true));
        assert_eq!(convert(&EngineValue::Int(-4)), ConvertedValue::Int(-4));
        assert_eq!(convert(&EngineValue::Real(2.5)), ConvertedValue::Number(2.5));
        assert_eq!(
            convert(&EngineValue::Text("hi".into())),
            ConvertedValue::String("hi".into())
        );
    }

    #[test]
    fn test_one_by_one_is_bare_number() {
        let value = EngineValue::double(NdArray::scalar(5.0));
        assert_eq!(convert(&value), ConvertedValue::Number(5.0));
    }

    #[test]
    fn test_column_and_row_are_flat() {
        let column = EngineValue::double(NdArray::column(vec![1.0, 2.0, 3.0]));
        assert_eq!(convert(&column), numbers(&[1.0, 2.0, 3.0]));

        let row = EngineValue::double(NdArray::row(vec![4.0, 5.0, 6.0]));
        assert_eq!(convert(&row), numbers(&[4.0, 5.0, 6.0]));
    }

    #[test]
    fn test_matrix_nests_rows() {
        let array = NdArray::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let converted = convert(&EngineValue::double(array));
        assert_eq!(
            converted,
            ConvertedValue::List(vec![numbers(&[1.0, 2.0]), numbers(&[3.0, 4.0])])
        );
        assert_eq!(serde_json::to_value(&converted).unwrap(), json!([[1.0, 2.0], [3.0, 4.0]]));
    }

    #[test]
    fn test_three_dimensional_with_singleton() {
        // 2x1x3, column-major: a(i,1,k) = 10*i + k
        let data = vec![11.0, 21.0, 12.0, 22.0, 13.0, 23.0];
        let array = NdArray::new(vec![2, 1, 3], data).unwrap();
        let converted = convert(&EngineValue::double(array));
        assert_eq!(
            serde_json::to_value(&converted).unwrap(),
            json!([[11.0, 12.0, 13.0], [21.0, 22.0, 23.0]])
        );
    }

    #[test]
    fn test_full_rank_three_dimensional() {
        // 2x2x2 with a(i,j,k) = 100*i + 10*j + k
        let mut data = Vec::new();
        for k in 1..=2 {
            for j in 1..=2 {
                for i in 1..=2 {
                    data.push(f64::from(100 * i + 10 * j + k));
                }
            }
        }
        let array = NdArray::new(vec![2, 2, 2], data).unwrap();
        let value = serde_json::to_value(convert(&EngineValue::double(array))).unwrap();
        assert_eq!(value[1][0][1], json!(212.0));
        assert_eq!(value[0][1][0], json!(121.0));
        assert_eq!(value[1][1][1], json!(222.0));
    }

    #[test]
    fn test_logical_follows_same_reduction() {
        let scalar = EngineValue::Logical(NdArray::scalar(true));
        assert_eq!(convert(&scalar), ConvertedValue::Bool(true));

        let column = EngineValue::Logical(NdArray::column(vec![true, false]));
        assert_eq!(
            convert(&column),
            ConvertedValue::List(vec![ConvertedValue::Bool(true), ConvertedValue::Bool(false)])
        );
    }

    #[test]
    fn test_empty_matrix_is_empty_list() {
        let array = NdArray::new(vec![0, 0], Vec::new()).unwrap();
        let converted = convert(&EngineValue::double(array));
        assert_eq!(serde_json::to_value(&converted).unwrap(), json!([]));
    }

    #[test]
    fn test_char_and_unsupported_become_text() {
        assert_eq!(
            convert(&EngineValue::Char("hello".into())),
            ConvertedValue::String("hello".into())
        );
        let other = EngineValue::Other {
            class: "struct".into(),
            description: "    a: 1".into(),
        };
        assert_eq!(convert(&other), ConvertedValue::String("    a: 1".into()));
    }

    #[test]
    fn test_non_finite_fails_serialization() {
        let nan = convert(&EngineValue::double(NdArray::column(vec![1.0, f64::NAN])));
        assert!(serde_json::to_string(&nan).is_err());

        let inf = convert(&EngineValue::Real(f64::INFINITY));
        assert!(serde_json::to_value(&inf).is_err());
    }

    #[test]
    fn test_integer_classes_stay_exact() {
        let big = EngineValue::Integer {
            class: "int64".into(),
            array: NdArray::column(vec![9_007_199_254_740_993, -9_223_372_036_854_775_808]),
        };
        assert_eq!(
            serde_json::to_value(convert(&big)).unwrap(),
            json!([9_007_199_254_740_993_i64, i64::MIN])
        );

        let unsigned = EngineValue::Integer {
            class: "uint64".into(),
            array: NdArray::scalar(i128::from(u64::MAX)),
        };
        assert_eq!(convert(&unsigned), ConvertedValue::UInt(u64::MAX));
        assert_eq!(serde_json::to_value(convert(&unsigned)).unwrap(), json!(u64::MAX));
    }
}
