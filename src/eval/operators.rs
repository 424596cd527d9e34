use crate::ast::{BinaryOp, UnaryOp};
use crate::eval::value::Value;

pub fn binary_value(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Add => match (left, right) {
            (Value::String(_), _) | (_, Value::String(_)) => {
                let mut out = left.to_display_string();
                out.push_str(&right.to_display_string());
                Value::string(&out)
            }
            _ => Value::Number(left.to_number() + right.to_number()),
        },
        BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
        BinaryOp::Rem => Value::Number(left.to_number() % right.to_number()),
        BinaryOp::StrictEq => Value::Boolean(left.strict_equals(right)),
        BinaryOp::StrictNe => Value::Boolean(!left.strict_equals(right)),
        BinaryOp::Eq => Value::Boolean(left.loose_equals(right)),
        BinaryOp::Ne => Value::Boolean(!left.loose_equals(right)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (left, right) {
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => left.to_number().partial_cmp(&right.to_number()),
            };
            Value::Boolean(match ordering {
                None => false,
                Some(ordering) => match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::Le => ordering.is_le(),
                    BinaryOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                },
            })
        }
    }
}

pub fn unary_value(op: UnaryOp, argument: &Value) -> Value {
    match op {
        UnaryOp::Not => Value::Boolean(!argument.is_truthy()),
        UnaryOp::Neg => Value::Number(-argument.to_number()),
        UnaryOp::Plus => Value::Number(argument.to_number()),
        UnaryOp::Typeof => Value::string(argument.type_of()),
    }
}
