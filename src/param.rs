//! Dynamic values and named parameters.

use std::fmt;

/// A dynamically typed value, as carried by parameters and control commands.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Empty,
    Bool(bool),
    Int(i64),
    Float(f32),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// Parse a textual value.
    ///
    /// Tries a finite float first, then an integer, then `true`/`false`, and
    /// falls back to text. An empty (or all-whitespace) string is [`Value::Empty`].
    pub fn parse(text: &str) -> Value {
        let text = text.trim();
        if text.is_empty() {
            return Value::Empty;
        }
        if let Ok(float) = text.parse::<f32>() {
            if float.is_finite() {
                return Value::Float(float);
            }
        }
        if let Ok(int) = text.parse::<i64>() {
            return Value::Int(int);
        }
        match text {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::Text(text.to_string()),
        }
    }

    /// The value as a signal level, if it is numeric. Booleans are gate
    /// levels: `true` is 1, `false` is 0.
    pub fn as_signal(&self) -> Option<f32> {
        match *self {
            Value::Float(f) => Some(f),
            Value::Int(i) => Some(i as f32),
            Value::Bool(b) => Some(if b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Empty => "empty",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => f.write_str("<empty>"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{:?}", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
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

/// A value could not be converted into the type a parameter expects.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueError {
    /// The value has the wrong type.
    Type {
        expected: &'static str,
        found: &'static str,
    },
    /// The value has the right type but does not fit.
    Range(String),
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueError::Type { expected, found } => {
                write!(f, "expected {} value, found {}", expected, found)
            }
            ValueError::Range(msg) => write!(f, "value out of range: {}", msg),
        }
    }
}

impl std::error::Error for ValueError {}

fn type_error(expected: &'static str, value: &Value) -> ValueError {
    ValueError::Type {
        expected,
        found: value.kind(),
    }
}

fn integral(value: &Value) -> Result<i64, ValueError> {
    match *value {
        Value::Int(i) => Ok(i),
        Value::Float(f) if f.is_finite() && f.fract() == 0.0 => Ok(f as i64),
        _ => Err(type_error("int", value)),
    }
}

impl TryFrom<Value> for f32 {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value.as_signal().ok_or_else(|| type_error("float", &value))
    }
}

impl TryFrom<Value> for i64 {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        integral(&value)
    }
}

impl TryFrom<Value> for i32 {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let i = integral(&value)?;
        i32::try_from(i).map_err(|_| ValueError::Range(format!("{} does not fit in i32", i)))
    }
}

impl TryFrom<Value> for usize {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let i = integral(&value)?;
        usize::try_from(i).map_err(|_| ValueError::Range(format!("{} is negative", i)))
    }
}

impl TryFrom<Value> for bool {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Bool(b) => Ok(b),
            Value::Int(i) => Ok(i != 0),
            Value::Float(f) => Ok(f != 0.0),
            other => Err(type_error("bool", &other)),
        }
    }
}

impl TryFrom<Value> for String {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Text(s) => Ok(s),
            other => Err(type_error("text", &other)),
        }
    }
}

/// A parameter lookup or write failed.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamError {
    Unknown(String),
    Invalid { name: String, source: ValueError },
}

impl fmt::Display for ParamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamError::Unknown(name) => write!(f, "unknown parameter '{}'", name),
            ParamError::Invalid { name, source } => {
                write!(f, "invalid value for parameter '{}': {}", name, source)
            }
        }
    }
}

impl std::error::Error for ParamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParamError::Invalid { source, .. } => Some(source),
            ParamError::Unknown(_) => None,
        }
    }
}

/// A named accessor pair bound to a field of `M`.
pub struct Parameter<M> {
    pub name: &'static str,
    pub get: fn(&M) -> Value,
    pub set: fn(&mut M, Value) -> Result<(), ValueError>,
}

/// The parameters of a module type, usually kept in a `static`.
///
/// ```
/// use mdlr::param::{ParamTable, Parameter, Value};
///
/// struct Gain { amount: f32 }
///
/// static PARAMS: ParamTable<Gain> = ParamTable::new(&[Parameter {
///     name: "amount",
///     get: |g| Value::Float(g.amount),
///     set: |g, v| {
///         g.amount = v.try_into()?;
///         Ok(())
///     },
/// }]);
///
/// let mut gain = Gain { amount: 1.0 };
/// PARAMS.set(&mut gain, "amount", Value::Int(2)).unwrap();
/// assert_eq!(PARAMS.get(&gain, "amount"), Some(Value::Float(2.0)));
/// ```
pub struct ParamTable<M: 'static> {
    params: &'static [Parameter<M>],
}

impl<M: 'static> ParamTable<M> {
    pub const fn new(params: &'static [Parameter<M>]) -> Self {
        Self { params }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.params.iter().map(|p| p.name).collect()
    }

    fn lookup(&self, name: &str) -> Option<&Parameter<M>> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn get(&self, module: &M, name: &str) -> Option<Value> {
        self.lookup(name).map(|p| (p.get)(module))
    }

    pub fn set(&self, module: &mut M, name: &str, value: Value) -> Result<(), ParamError> {
        let param = self
            .lookup(name)
            .ok_or_else(|| ParamError::Unknown(name.to_string()))?;
        (param.set)(module, value).map_err(|source| ParamError::Invalid {
            name: name.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_prefers_float_then_int_then_bool() {
        assert_eq!(Value::parse("0.25"), Value::Float(0.25));
        assert_eq!(Value::parse("3"), Value::Float(3.0));
        assert_eq!(Value::parse("true"), Value::Bool(true));
        assert_eq!(Value::parse("false"), Value::Bool(false));
        assert_eq!(Value::parse("saw"), Value::Text("saw".into()));
        assert_eq!(Value::parse("  "), Value::Empty);
    }

    #[test]
    fn parse_rejects_non_finite_floats() {
        assert_eq!(Value::parse("inf"), Value::Text("inf".into()));
        assert_eq!(Value::parse("NaN"), Value::Text("NaN".into()));
    }

    #[test]
    fn booleans_are_gate_levels() {
        assert_eq!(Value::Bool(true).as_signal(), Some(1.0));
        assert_eq!(Value::Bool(false).as_signal(), Some(0.0));
        assert_eq!(Value::Text("on".into()).as_signal(), None);
    }

    #[test]
    fn display_keeps_float_precision() {
        assert_eq!(Value::Float(0.0005).to_string(), "0.0005");
        assert_eq!(Value::Float(0.25).to_string(), "0.25");
        assert_eq!(Value::Int(3).to_string(), "3");
        assert_eq!(Value::Text("saw".into()).to_string(), "\"saw\"");
    }

    #[test]
    fn conversions() {
        assert_eq!(f32::try_from(Value::Int(2)), Ok(2.0));
        assert_eq!(i64::try_from(Value::Float(4.0)), Ok(4));
        assert!(i64::try_from(Value::Float(4.5)).is_err());
        assert_eq!(usize::try_from(Value::Int(-1)), Err(ValueError::Range("-1 is negative".into())));
        assert_eq!(bool::try_from(Value::Float(0.0)), Ok(false));
        assert_eq!(bool::try_from(Value::Int(7)), Ok(true));
        assert_eq!(
            String::try_from(Value::Int(1)),
            Err(ValueError::Type { expected: "text", found: "int" })
        );
    }

    struct Knob {
        level: f32,
    }

    static KNOB: ParamTable<Knob> = ParamTable::new(&[Parameter {
        name: "level",
        get: |k| Value::Float(k.level),
        set: |k, v| {
            k.level = v.try_into()?;
            Ok(())
        },
    }]);

    #[test]
    fn table_get_set() {
        let mut knob = Knob { level: 0.0 };
        assert_eq!(KNOB.names(), ["level"]);
        KNOB.set(&mut knob, "level", Value::Float(0.5)).unwrap();
        assert_eq!(KNOB.get(&knob, "level"), Some(Value::Float(0.5)));
        assert_eq!(KNOB.get(&knob, "missing"), None);
        assert!(matches!(
            KNOB.set(&mut knob, "missing", Value::Empty),
            Err(ParamError::Unknown(_))
        ));
        assert!(matches!(
            KNOB.set(&mut knob, "level", Value::Text("x".into())),
            Err(ParamError::Invalid { .. })
        ));
        assert_eq!(knob.level, 0.5);
    }
}
