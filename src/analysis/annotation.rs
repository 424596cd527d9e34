//! Resolution of source type annotations.

use crate::ast::TypeAnnotation;
use crate::core::interface::Mutability;
use crate::core::types::{Field, Type};

pub fn resolve_annotation(annotation: &TypeAnnotation) -> Type {
    match annotation {
        TypeAnnotation::Never => Type::Never,
        TypeAnnotation::Unknown => Type::Unknown,
        TypeAnnotation::Undefined => Type::Undefined,
        TypeAnnotation::Null => Type::Null,
        TypeAnnotation::Boolean => Type::Boolean,
        TypeAnnotation::Number => Type::Number,
        TypeAnnotation::String => Type::String,
        TypeAnnotation::Literal(value) => Type::singleton(value.clone()),
        TypeAnnotation::Array(elem) => Type::array(resolve_annotation(elem)),
        TypeAnnotation::Tuple(elems) => Type::Tuple(elems.iter().map(resolve_annotation).collect()),
        TypeAnnotation::Object(fields) => {
            let mut out: Vec<Field> = Vec::with_capacity(fields.len());
            for field in fields {
                if out.iter().any(|f| f.name == field.name) {
                    continue;
                }
                let ty = resolve_annotation(&field.annotation);
                let ty = if field.optional { Type::undefined_or(ty) } else { ty };
                out.push(Field::new(field.name.clone(), ty));
            }
            Type::Object(out)
        }
        TypeAnnotation::Function(params, ret) => Type::function(
            params.iter().map(resolve_annotation).collect(),
            resolve_annotation(ret),
        ),
        TypeAnnotation::Union(arms) => Type::union(arms.iter().map(resolve_annotation).collect()),
        TypeAnnotation::Intersection(arms) => {
            Type::intersection(arms.iter().map(resolve_annotation).collect())
        }
        TypeAnnotation::Reference(label, params) => {
            let mut params: Vec<Type> = params.iter().map(resolve_annotation).collect();
            match (label.as_str(), params.len()) {
                ("Array", 1) => Type::array(params.remove(0)),
                ("Set", 1) => Type::set(params.remove(0)),
                ("Map", 2) => {
                    let value = params.remove(1);
                    Type::map(params.remove(0), value)
                }
                _ => Type::abstract_of(label.clone(), params),
            }
        }
    }
}

/// `Code<T>` / `Session<T>`: the cell kind and the value type inside it.
pub fn cell_type(ty: &Type) -> Option<(Mutability, &Type)> {
    match ty {
        Type::Abstract(label, params) if params.len() == 1 => {
            Mutability::from_label(label).map(|m| (m, &params[0]))
        }
        _ => None,
    }
}

pub fn cell_of(mutability: Mutability, ty: Type) -> Type {
    Type::abstract_of(mutability.label(), vec![ty])
}

pub fn element_type() -> Type {
    Type::abstract_of("Element", vec![])
}
