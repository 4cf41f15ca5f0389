use crate::interpreter::event::InputType;
use crate::parser::ast::BaseType;

/// Runtime values. Numerics are a single double-precision real; the
/// declared Integer/Real distinction only drives defaults, input parsing
/// and formatting.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Real(f64),
    Bool(bool),
    Str(String),
    Array {
        elem: BaseType,
        dims: Vec<usize>,
        items: Vec<Value>,
    },
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Real(_) => "a number",
            Value::Bool(_) => "a boolean",
            Value::Str(_) => "a string",
            Value::Array { .. } => "an array",
        }
    }
}

pub fn default_for_type(ty: BaseType) -> Value {
    match ty {
        BaseType::Integer | BaseType::Real => Value::Real(0.0),
        BaseType::Boolean => Value::Bool(false),
        BaseType::String | BaseType::Char => Value::Str(String::new()),
    }
}

/// Builds the declared default: a scalar, or a jagged nest of arrays whose
/// outermost length is the first dimension.
pub fn materialize(ty: BaseType, dims: &[usize]) -> Value {
    if dims.is_empty() {
        return default_for_type(ty);
    }
    Value::Array {
        elem: ty,
        dims: dims.to_vec(),
        items: (0..dims[0]).map(|_| materialize(ty, &dims[1..])).collect(),
    }
}

/// `Write` formatting: integral reals print without a decimal point, other
/// reals are rounded to four decimals and naturally stripped of trailing
/// zeros; arrays render their outer dimension with elements formatted
/// recursively.
pub fn format(value: &Value) -> String {
    match value {
        Value::Real(n) => format_number(*n),
        Value::Bool(b) => b.to_string(),
        Value::Str(s) => s.clone(),
        Value::Array { items, .. } => {
            let parts: Vec<String> = items.iter().map(format).collect();
            format!("[{}]", parts.join(", "))
        }
    }
}

pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        return format!("{}", n as i64);
    }
    let rounded = (n * 1.0e4).round() / 1.0e4;
    format!("{}", rounded)
}

/// Parses a `Read` reply according to the declared type of the target cell.
pub fn parse_input(text: &str, expected: InputType) -> Result<Value, String> {
    match expected {
        InputType::Number => parse_number(text.trim())
            .map(Value::Real)
            .ok_or_else(|| "Expected a number input.".to_string()),
        InputType::Boolean => {
            let word = text.trim();
            if word.eq_ignore_ascii_case("true") {
                Ok(Value::Bool(true))
            } else if word.eq_ignore_ascii_case("false") {
                Ok(Value::Bool(false))
            } else {
                Err("Expected a boolean input.".to_string())
            }
        }
        InputType::Text => Ok(Value::Str(text.to_string())),
    }
}

// Optional sign, digits, optional decimal part. No exponents.
fn parse_number(text: &str) -> Option<f64> {
    let rest = text.strip_prefix(['+', '-']).unwrap_or(text);
    let digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());

    let mut parts = rest.splitn(2, '.');
    let whole = parts.next()?;
    if !digits(whole) {
        return None;
    }
    if let Some(frac) = parts.next() {
        if !digits(frac) {
            return None;
        }
    }

    text.parse::<f64>().ok()
}
