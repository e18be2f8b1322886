use std::borrow::Cow;

/// A single cell of a query result row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<'a> {
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit floating point number.
    Double(f64),
    /// UTF-8 text.
    Text(Cow<'a, str>),
    /// SQL null.
    Null,
}

impl<'a> Value<'a> {
    #[must_use]
    pub fn into_owned(self) -> Value<'static> {
        match self {
            Value::Int64(v) => Value::Int64(v),
            Value::Double(v) => Value::Double(v),
            Value::Text(s) => Value::Text(Cow::Owned(s.into_owned())),
            Value::Null => Value::Null,
        }
    }

    /// Integer view of the cell; doubles truncate toward zero, anything else is 0.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_i64(&self) -> i64 {
        match self {
            Value::Int64(v) => *v,
            Value::Double(v) => *v as i64,
            Value::Text(_) | Value::Null => 0,
        }
    }

    /// Text view of the cell; `None` for every non-text kind.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn text(s: &'a str) -> Self {
        Value::Text(Cow::Borrowed(s))
    }
}

impl From<String> for Value<'_> {
    fn from(value: String) -> Self {
        Value::Text(Cow::Owned(value))
    }
}

impl<'a> From<Option<&'a str>> for Value<'a> {
    fn from(value: Option<&'a str>) -> Self {
        value.map_or(Value::Null, Value::text)
    }
}

/// Reads a cell by position, treating out-of-range columns as null.
#[must_use]
pub fn cell<'r, 'a>(row: &'r [Value<'a>], index: usize) -> &'r Value<'a> {
    const NULL: &Value<'static> = &Value::Null;
    row.get(index).unwrap_or(NULL)
}
