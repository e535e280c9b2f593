//! Built-in numeric/string conversions backing `Unary::Convert` /
//! `ConvertChecked` (§4.5.5) and the `is` test behind `TypeIs` (§4.5.9).

use crate::fault::Fault;
use crate::value::{Value, ValueType};
use arcstr::ArcStr;

pub fn is_a(value: &Value, target: ValueType) -> bool {
    if target == ValueType::Any {
        return true;
    }
    value.type_of() == target
}

/// Built-in conversion, used when no user-defined conversion method is
/// attached to the `Unary` node. `checked` rejects lossy numeric
/// narrowing that would silently truncate.
pub fn convert(value: &Value, target: ValueType, checked: bool) -> Result<Value, Fault> {
    use Value::*;
    match (value, target) {
        (v, t) if v.type_of() == t => Ok(v.clone()),
        (I64(i), ValueType::F64) => Ok(F64(*i as f64)),
        (F64(f), ValueType::I64) => {
            if checked && (f.fract() != 0.0 || *f > i64::MAX as f64 || *f < i64::MIN as f64) {
                Err(Fault::Operator { message: ArcStr::from("checked conversion overflowed") })
            } else {
                Ok(I64(*f as i64))
            }
        }
        (I64(i), ValueType::String) => Ok(String(ArcStr::from(i.to_string()))),
        (F64(f), ValueType::String) => Ok(String(ArcStr::from(f.to_string()))),
        (Bool(b), ValueType::String) => Ok(String(ArcStr::from(b.to_string()))),
        (String(s), ValueType::I64) => s
            .parse::<i64>()
            .map(I64)
            .map_err(|e| Fault::Operator { message: ArcStr::from(e.to_string()) }),
        (String(s), ValueType::F64) => s
            .parse::<f64>()
            .map(F64)
            .map_err(|e| Fault::Operator { message: ArcStr::from(e.to_string()) }),
        (Null, ValueType::Object) => Ok(Null),
        (v, t) => Err(Fault::Operator {
            message: ArcStr::from(format!("cannot convert {:?} to {:?}", v.type_of(), t)),
        }),
    }
}
