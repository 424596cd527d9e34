//! Lattice operations over [`Type`]: normalizing union and intersection, and subtyping.

use crate::core::types::{Field, Type};

/// Coarse runtime kind, used to detect disjoint types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Undefined,
    Null,
    Boolean,
    Number,
    String,
    Object,
}

fn kind_of(ty: &Type) -> Option<Kind> {
    match ty {
        Type::Undefined => Some(Kind::Undefined),
        Type::Null => Some(Kind::Null),
        Type::Boolean => Some(Kind::Boolean),
        Type::Number => Some(Kind::Number),
        Type::String => Some(Kind::String),
        Type::Singleton(base, _) => kind_of(base),
        Type::Tuple(_) | Type::Array(_) | Type::Set(_) | Type::Map(_, _)
        | Type::Object(_) | Type::Module(_) | Type::Function(_, _) => Some(Kind::Object),
        _ => None,
    }
}

fn boolean_arms() -> Type {
    Type::Union(vec![Type::boolean_literal(true), Type::boolean_literal(false)])
}

impl Type {
    /// Union of `types`: flattened, `never`-free, deduplicated by equivalence.
    pub fn union(types: Vec<Type>) -> Type {
        let mut flat = Vec::new();
        for ty in types {
            match ty {
                Type::Union(arms) => flat.extend(arms),
                Type::Never => {}
                other => flat.push(other),
            }
        }

        let mut result: Vec<Type> = Vec::with_capacity(flat.len());
        for ty in flat {
            if !result.iter().any(|t| t.is_equivalent(&ty)) {
                result.push(ty);
            }
        }

        match result.len() {
            0 => Type::Never,
            1 => result.pop().unwrap_or(Type::Never),
            _ => Type::Union(result),
        }
    }

    /// Intersection of `types`: flattened, distributed over unions, `never` when arms are disjoint.
    pub fn intersection(types: Vec<Type>) -> Type {
        let mut flat = Vec::new();
        for ty in types {
            match ty {
                Type::Intersection(arms) => flat.extend(arms),
                Type::Unknown => {}
                other => flat.push(other),
            }
        }

        if flat.iter().any(Type::is_never) {
            return Type::Never;
        }

        // T & (A | B) = (T & A) | (T & B)
        if let Some(pos) = flat.iter().position(|t| matches!(t, Type::Union(_))) {
            let Type::Union(arms) = flat.remove(pos) else {
                unreachable!("position matched a union")
            };
            return Type::union(
                arms.into_iter()
                    .map(|arm| {
                        let mut parts = flat.clone();
                        parts.push(arm);
                        Type::intersection(parts)
                    })
                    .collect(),
            );
        }

        let mut result: Vec<Type> = Vec::with_capacity(flat.len());
        for ty in flat {
            if result.iter().any(|t| t.is_subtype(&ty)) {
                continue;
            }
            if result.iter().any(|t| Type::disjoint(t, &ty)) {
                return Type::Never;
            }
            result.retain(|t| !ty.is_subtype(t));
            result.push(ty);
        }

        match result.len() {
            0 => Type::Unknown,
            1 => result.pop().unwrap_or(Type::Unknown),
            _ => Type::Intersection(result),
        }
    }

    /// Two types with no common inhabitant, judged by runtime kind and singleton value.
    pub fn disjoint(a: &Type, b: &Type) -> bool {
        match (a, b) {
            (Type::Never, _) | (_, Type::Never) => true,
            (Type::Union(arms), other) | (other, Type::Union(arms)) => {
                arms.iter().all(|arm| Type::disjoint(arm, other))
            }
            (Type::Singleton(b1, v1), Type::Singleton(b2, v2)) => b1 != b2 || v1 != v2,
            (Type::Object(fa), Type::Object(fb)) => fa.iter().any(|f| {
                fb.iter().any(|g| g.name == f.name && Type::disjoint(&f.ty, &g.ty))
            }),
            _ => match (kind_of(a), kind_of(b)) {
                (Some(ka), Some(kb)) => ka != kb,
                _ => false,
            },
        }
    }

    pub fn is_equivalent(&self, other: &Type) -> bool {
        self.is_subtype(other) && other.is_subtype(self)
    }

    pub fn is_subtype(&self, other: &Type) -> bool {
        use Type::*;

        if self == other {
            return true;
        }

        match (self, other) {
            (Never, _) => true,
            (_, Unknown) => true,
            (Error(_), _) => true,
            (_, Error(_)) => false,

            (Union(arms), b) => arms.iter().all(|t| t.is_subtype(b)),
            (a, Intersection(arms)) => arms.iter().all(|t| a.is_subtype(t)),
            (Boolean, Union(_)) => boolean_arms().is_subtype(other),
            (a, Union(arms)) => arms.iter().any(|t| a.is_subtype(t)),
            (Intersection(arms), b) => arms.iter().any(|t| t.is_subtype(b)),

            (Not(a), Not(b)) => b.is_subtype(a),
            (a, Not(b)) => Type::disjoint(a, b),
            (Not(_), _) => false,

            (Singleton(b1, v1), Singleton(b2, v2)) => b1 == b2 && v1 == v2,
            (Singleton(base, _), b) => base.is_subtype(b),

            (Array(a), Array(b)) => a.is_subtype(b),
            (Set(a), Set(b)) => a.is_subtype(b),
            (Map(k1, v1), Map(k2, v2)) => k2.is_subtype(k1) && v1.is_subtype(v2),

            (Tuple(a), Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.is_subtype(y))
            }
            (Tuple(a), Array(b)) => a.iter().all(|x| x.is_subtype(b)),

            (Object(fa), Object(fb)) => object_fields_subtype(
                fa.iter().map(|f| (f.name.as_str(), &f.ty)),
                fb,
            ),
            (Module(fa), Module(fb)) => fb.iter().all(|g| {
                match fa.iter().find(|f| f.name == g.name) {
                    Some(f) => f.ty.is_subtype(&g.ty),
                    None => Undefined.is_subtype(&g.ty),
                }
            }),
            (Module(fa), Object(fb)) => object_fields_subtype(
                fa.iter().map(|f| (f.name.as_str(), &f.ty)),
                fb,
            ),

            // Function contravariance in params, covariance in return
            (Function(p1, r1), Function(p2, r2)) => {
                p1.len() == p2.len()
                    && p2.iter().zip(p1.iter()).all(|(a, b)| a.is_subtype(b))
                    && r1.is_subtype(r2)
            }

            (Abstract(l1, p1), Abstract(l2, p2)) => {
                l1 == l2 && p1.len() == p2.len() && p1.iter().zip(p2).all(|(a, b)| a.is_subtype(b))
            }

            _ => false,
        }
    }
}

fn object_fields_subtype<'a>(
    source: impl Iterator<Item = (&'a str, &'a Type)> + Clone,
    target: &[Field],
) -> bool {
    target.iter().all(|g| {
        match source.clone().find(|(name, _)| *name == g.name) {
            Some((_, ty)) => ty.is_subtype(&g.ty),
            None => Type::Undefined.is_subtype(&g.ty),
        }
    })
}
