//! # Values and Type Tags
//!
//! `Value` is the dynamic payload that crosses the boundary: arguments,
//! field values and return values. `TypeTag` describes a parameter or field
//! type, and is what signatures are matched on.

use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;

/// A dynamically typed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent reference, and the result of a void method.
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F64(f64),
    Char(char),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
}

impl Value {
    /// Short name of the variant, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::F64(_) => "f64",
            Value::Char(_) => "char",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::I32(v) => write!(f, "{}", v),
            Value::I64(v) => write!(f, "{}", v),
            Value::F64(v) => write!(f, "{}", v),
            Value::Char(c) => write!(f, "{:?}", c),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Declared type of a parameter or field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeTag {
    Bool,
    I32,
    I64,
    F64,
    Char,
    Str,
    Bytes,
    List,
    /// Accepts every value.
    Any,
}

impl TypeTag {
    /// Whether `value` may be passed where this type is declared.
    ///
    /// Scalars require the exact variant. Reference-like types also accept `Null`.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (TypeTag::Any, _) => true,
            (TypeTag::Str | TypeTag::Bytes | TypeTag::List, Value::Null) => true,
            (TypeTag::Bool, Value::Bool(_)) => true,
            (TypeTag::I32, Value::I32(_)) => true,
            (TypeTag::I64, Value::I64(_)) => true,
            (TypeTag::F64, Value::F64(_)) => true,
            (TypeTag::Char, Value::Char(_)) => true,
            (TypeTag::Str, Value::Str(_)) => true,
            (TypeTag::Bytes, Value::Bytes(_)) => true,
            (TypeTag::List, Value::List(_)) => true,
            _ => false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TypeTag::Bool => "bool",
            TypeTag::I32 => "i32",
            TypeTag::I64 => "i64",
            TypeTag::F64 => "f64",
            TypeTag::Char => "char",
            TypeTag::Str => "str",
            TypeTag::Bytes => "bytes",
            TypeTag::List => "list",
            TypeTag::Any => "any",
        }
    }
}

impl std::fmt::Display for TypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Checks a full argument list against a signature.
///
/// Returns `TypeMismatch` naming the first offending position.
pub fn check_args(types: &[TypeTag], args: &[Value]) -> Result<()> {
    if types.len() != args.len() {
        return Err(Error::TypeMismatch {
            expected: format!("{} arguments", types.len()),
            found: format!("{} arguments", args.len()),
        });
    }
    for (i, (ty, arg)) in types.iter().zip(args).enumerate() {
        if !ty.accepts(arg) {
            return Err(Error::TypeMismatch {
                expected: format!("{} at argument {}", ty, i),
                found: arg.type_name().to_string(),
            });
        }
    }
    Ok(())
}

macro_rules! scalar_conversions {
    ($($ty:ty => $variant:ident, $name:literal;)*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self { Value::$variant(v) }
            }

            impl TryFrom<&Value> for $ty {
                type Error = Error;

                fn try_from(value: &Value) -> Result<Self> {
                    match value {
                        Value::$variant(v) => Ok(v.clone()),
                        other => Err(Error::TypeMismatch {
                            expected: $name.into(),
                            found: other.type_name().into(),
                        }),
                    }
                }
            }
        )*
    };
}

scalar_conversions! {
    bool => Bool, "bool";
    i32 => I32, "i32";
    i64 => I64, "i64";
    f64 => F64, "f64";
    char => Char, "char";
    String => Str, "str";
    Vec<u8> => Bytes, "bytes";
    Vec<Value> => List, "list";
}

impl From<&str> for Value {
    fn from(v: &str) -> Self { Value::Str(v.to_string()) }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
