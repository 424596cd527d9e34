use std::fmt;
use ordered_float::OrderedFloat;
use serde::{Serialize, Deserialize};

use crate::errors::TypeError;

/// Structural types of document expressions.
///
/// Unions and intersections should be built through [`Type::union`] and
/// [`Type::intersection`] so the normalization invariants hold: arms are flattened,
/// deduplicated by equivalence, and there are always at least two of them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Never,
    Unknown,
    Undefined,
    Null,
    Boolean,
    Number,
    String,

    // Composite types
    Tuple(Vec<Type>),
    Array(Box<Type>),
    Set(Box<Type>),
    Map(Box<Type>, Box<Type>),

    /// Opaque labelled type, e.g. `Code<number>` or `Element`
    Abstract(String, Vec<Type>),

    /// Function types: (params) -> return
    Function(Vec<Type>, Box<Type>),

    Object(Vec<Field>),
    Module(Vec<ModuleField>),

    Union(Vec<Type>),
    Intersection(Vec<Type>),

    /// A single value of a primitive base type
    Singleton(Box<Type>, Literal),

    /// "Known not to be" this type; only meaningful as a narrowing argument
    Not(Box<Type>),

    /// The type of an expression that failed to check
    Error(Box<TypeError>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleField {
    pub name: String,
    pub ty: Type,
    pub dynamic: bool,
}

/// Literal values, shared by singleton types and literal AST nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Literal {
    Boolean(bool),
    Number(OrderedFloat<f64>),
    String(String),
}

impl Literal {
    pub fn number(n: f64) -> Self {
        Literal::Number(OrderedFloat(n))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Literal::String(s.into())
    }

    /// The primitive type this literal inhabits
    pub fn base(&self) -> Type {
        match self {
            Literal::Boolean(_) => Type::Boolean,
            Literal::Number(_) => Type::Number,
            Literal::String(_) => Type::String,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Literal::Boolean(b) => *b,
            Literal::Number(n) => n.0 != 0.0 && !n.0.is_nan(),
            Literal::String(s) => !s.is_empty(),
        }
    }
}

impl Field {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self { name: name.into(), ty }
    }
}

impl ModuleField {
    pub fn new(name: impl Into<String>, ty: Type, dynamic: bool) -> Self {
        Self { name: name.into(), ty, dynamic }
    }
}

impl Type {
    pub fn singleton(value: Literal) -> Type {
        Type::Singleton(Box::new(value.base()), value)
    }

    pub fn number_literal(n: f64) -> Type {
        Type::singleton(Literal::number(n))
    }

    pub fn string_literal(s: impl Into<String>) -> Type {
        Type::singleton(Literal::string(s))
    }

    pub fn boolean_literal(b: bool) -> Type {
        Type::singleton(Literal::Boolean(b))
    }

    pub fn array(elem: Type) -> Type {
        Type::Array(Box::new(elem))
    }

    pub fn set(elem: Type) -> Type {
        Type::Set(Box::new(elem))
    }

    pub fn map(key: Type, value: Type) -> Type {
        Type::Map(Box::new(key), Box::new(value))
    }

    pub fn function(params: Vec<Type>, ret: Type) -> Type {
        Type::Function(params, Box::new(ret))
    }

    pub fn not(ty: Type) -> Type {
        Type::Not(Box::new(ty))
    }

    pub fn error(cause: TypeError) -> Type {
        Type::Error(Box::new(cause))
    }

    pub fn abstract_of(label: impl Into<String>, params: Vec<Type>) -> Type {
        Type::Abstract(label.into(), params)
    }

    /// Build an object type; later duplicates of a field name are dropped.
    pub fn object<N: Into<String>>(fields: impl IntoIterator<Item = (N, Type)>) -> Type {
        let mut out: Vec<Field> = Vec::new();
        for (name, ty) in fields {
            let name = name.into();
            if !out.iter().any(|f| f.name == name) {
                out.push(Field { name, ty });
            }
        }
        Type::Object(out)
    }

    /// Build a module type; later duplicates of a field name are dropped.
    pub fn module<N: Into<String>>(fields: impl IntoIterator<Item = (N, Type, bool)>) -> Type {
        let mut out: Vec<ModuleField> = Vec::new();
        for (name, ty, dynamic) in fields {
            let name = name.into();
            if !out.iter().any(|f| f.name == name) {
                out.push(ModuleField { name, ty, dynamic });
            }
        }
        Type::Module(out)
    }

    /// `T | undefined`
    pub fn undefined_or(ty: Type) -> Type {
        Type::union(vec![Type::Undefined, ty])
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Type::Error(_))
    }

    pub fn is_never(&self) -> bool {
        matches!(self, Type::Never)
    }

    /// Field lookup on Object and Module types
    pub fn field(&self, name: &str) -> Option<&Type> {
        match self {
            Type::Object(fields) => fields.iter().find(|f| f.name == name).map(|f| &f.ty),
            Type::Module(fields) => fields.iter().find(|f| f.name == name).map(|f| &f.ty),
            _ => None,
        }
    }

    /// Names of the fields of an Object or Module type (for suggestions)
    pub fn field_names(&self) -> Vec<String> {
        match self {
            Type::Object(fields) => fields.iter().map(|f| f.name.clone()).collect(),
            Type::Module(fields) => fields.iter().map(|f| f.name.clone()).collect(),
            _ => Vec::new(),
        }
    }

    /// Singleton literal carried by this type, if any
    pub fn literal(&self) -> Option<&Literal> {
        match self {
            Type::Singleton(_, value) => Some(value),
            _ => None,
        }
    }

    /// Static truthiness, when every inhabitant agrees
    pub fn truthiness(&self) -> Option<bool> {
        match self {
            Type::Undefined | Type::Null => Some(false),
            Type::Singleton(_, value) => Some(value.is_truthy()),
            Type::Object(_) | Type::Module(_) | Type::Tuple(_) | Type::Array(_)
            | Type::Set(_) | Type::Map(_, _) | Type::Function(_, _) => Some(true),
            Type::Union(arms) => {
                let first = arms.first()?.truthiness()?;
                arms.iter()
                    .all(|arm| arm.truthiness() == Some(first))
                    .then_some(first)
            }
            _ => None,
        }
    }

    /// Replace singletons by their base type, recursively through structure.
    pub fn widen(&self) -> Type {
        match self {
            Type::Singleton(base, _) => (**base).clone(),
            Type::Tuple(elems) => Type::Tuple(elems.iter().map(Type::widen).collect()),
            Type::Array(elem) => Type::array(elem.widen()),
            Type::Set(elem) => Type::set(elem.widen()),
            Type::Map(k, v) => Type::map(k.widen(), v.widen()),
            Type::Object(fields) => Type::Object(
                fields.iter().map(|f| Field::new(f.name.clone(), f.ty.widen())).collect()
            ),
            Type::Union(arms) => Type::union(arms.iter().map(Type::widen).collect()),
            other => other.clone(),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::Number(n) => write!(f, "{}", format_number(n.0)),
            Literal::String(s) => write!(f, "'{}'", s),
        }
    }
}

/// Number to string conversion shared by folding and evaluation.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        format!("{}", n)
    }
}

fn join<T: fmt::Display>(items: &[T], sep: &str) -> String {
    items.iter().map(|t| format!("{}", t)).collect::<Vec<_>>().join(sep)
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Never => write!(f, "never"),
            Type::Unknown => write!(f, "unknown"),
            Type::Undefined => write!(f, "undefined"),
            Type::Null => write!(f, "null"),
            Type::Boolean => write!(f, "boolean"),
            Type::Number => write!(f, "number"),
            Type::String => write!(f, "string"),
            Type::Tuple(ts) => write!(f, "[{}]", join(ts, ", ")),
            Type::Array(t) => write!(f, "Array<{}>", t),
            Type::Set(t) => write!(f, "Set<{}>", t),
            Type::Map(k, v) => write!(f, "Map<{}, {}>", k, v),
            Type::Abstract(label, params) => {
                if params.is_empty() {
                    write!(f, "{}", label)
                } else {
                    write!(f, "{}<{}>", label, join(params, ", "))
                }
            }
            Type::Function(params, ret) => write!(f, "({}) => {}", join(params, ", "), ret),
            Type::Object(fields) => {
                if fields.is_empty() {
                    return write!(f, "{{}}");
                }
                let fields = fields.iter()
                    .map(|field| format!("{}: {}", field.name, field.ty))
                    .collect::<Vec<_>>();
                write!(f, "{{ {} }}", fields.join(", "))
            }
            Type::Module(fields) => {
                let fields = fields.iter()
                    .map(|field| if field.dynamic {
                        format!("{}: Signal<{}>", field.name, field.ty)
                    } else {
                        format!("{}: {}", field.name, field.ty)
                    })
                    .collect::<Vec<_>>();
                write!(f, "module {{ {} }}", fields.join(", "))
            }
            Type::Union(ts) => write!(f, "{}", join(ts, " | ")),
            Type::Intersection(ts) => write!(f, "{}", join(ts, " & ")),
            Type::Singleton(_, value) => write!(f, "{}", value),
            Type::Not(t) => write!(f, "not({})", t),
            Type::Error(cause) => write!(f, "error({})", cause.kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let ty = Type::object([
            ("foo", Type::Number),
            ("bar", Type::union(vec![Type::string_literal("a"), Type::string_literal("b")])),
        ]);
        assert_eq!(ty.to_string(), "{ foo: number, bar: 'a' | 'b' }");
        assert_eq!(
            Type::function(vec![Type::Number], Type::array(Type::String)).to_string(),
            "(number) => Array<string>"
        );
        assert_eq!(Type::abstract_of("Code", vec![Type::Number]).to_string(), "Code<number>");
    }

    #[test]
    fn test_object_keeps_first_field() {
        let ty = Type::object([("a", Type::Number), ("a", Type::String)]);
        assert_eq!(ty.field("a"), Some(&Type::Number));
        assert_eq!(ty.field_names(), vec!["a".to_string()]);
    }

    #[test]
    fn test_truthiness() {
        assert_eq!(Type::number_literal(0.0).truthiness(), Some(false));
        assert_eq!(Type::string_literal("x").truthiness(), Some(true));
        assert_eq!(Type::Number.truthiness(), None);
        assert_eq!(Type::undefined_or(Type::Null).truthiness(), Some(false));
        assert_eq!(Type::object(Vec::<(String, Type)>::new()).truthiness(), Some(true));
    }

    #[test]
    fn test_widen() {
        let ty = Type::Tuple(vec![Type::number_literal(1.0), Type::string_literal("s")]);
        assert_eq!(ty.widen(), Type::Tuple(vec![Type::Number, Type::String]));
    }
}
