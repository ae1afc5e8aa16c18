use std::f64::consts;

use crate::{
    diagnostics::{Diagnostic, Result, ScriptError},
    environment::EnvironmentRef,
    heap::Realm,
    value::{NativeCallback, NativeFunction, ObjectKind, ObjectRef, Value, ValueKind},
};

/// Preloads the global namespace of a fresh scope.
pub fn install(env: &EnvironmentRef, realm: &Realm) -> Result<()> {
    let math = realm.alloc_object(ObjectKind::Plain)?;
    {
        let mut math = math.borrow_mut();
        math.set_own("PI", Value::number(consts::PI))?;
        math.set_own("E", Value::number(consts::E))?;
        math.set_own("abs", native("abs", 1, math_abs))?;
        math.set_own("floor", native("floor", 1, math_floor))?;
        math.set_own("ceil", native("ceil", 1, math_ceil))?;
        math.set_own("round", native("round", 1, math_round))?;
        math.set_own("sqrt", native("sqrt", 1, math_sqrt))?;
        math.set_own("pow", native("pow", 2, math_pow))?;
        math.set_own("min", native("min", 0, math_min))?;
        math.set_own("max", native("max", 0, math_max))?;
    }

    let mut scope = env.borrow_mut();
    scope.define("undefined".into(), Value::undefined(), false);
    scope.define("NaN".into(), Value::number(f64::NAN), false);
    scope.define("Infinity".into(), Value::number(f64::INFINITY), false);
    scope.define("print".into(), native("print", 0, global_print), true);
    scope.define("parseInt".into(), native("parseInt", 2, global_parse_int), true);
    scope.define(
        "parseFloat".into(),
        native("parseFloat", 1, global_parse_float),
        true,
    );
    scope.define("isNaN".into(), native("isNaN", 1, global_is_nan), true);
    scope.define("isFinite".into(), native("isFinite", 1, global_is_finite), true);
    scope.define("String".into(), native("String", 0, convert_string), true);
    scope.define("Number".into(), native("Number", 0, convert_number), true);
    scope.define("Boolean".into(), native("Boolean", 1, convert_boolean), true);
    scope.define("Math".into(), Value::object(math), true);
    Ok(())
}

/// Method looked up on a string receiver.
pub fn string_method(name: &str) -> Option<Value> {
    let method = match name {
        "toUpperCase" => native("toUpperCase", 0, string_to_upper),
        "toLowerCase" => native("toLowerCase", 0, string_to_lower),
        "trim" => native("trim", 0, string_trim),
        "indexOf" => native("indexOf", 1, string_index_of),
        "charAt" => native("charAt", 1, string_char_at),
        "substring" => native("substring", 2, string_substring),
        "startsWith" => native("startsWith", 1, string_starts_with),
        "endsWith" => native("endsWith", 1, string_ends_with),
        _ => return None,
    };
    Some(method)
}

/// Method looked up on an array receiver.
pub fn array_method(name: &str) -> Option<Value> {
    let method = match name {
        "push" => native("push", 0, array_push),
        "pop" => native("pop", 0, array_pop),
        "join" => native("join", 1, array_join),
        "indexOf" => native("indexOf", 1, array_index_of),
        _ => return None,
    };
    Some(method)
}

fn native(name: &'static str, arity: usize, callback: NativeCallback) -> Value {
    Value::new(ValueKind::NativeFunction(NativeFunction {
        name,
        arity,
        callback,
    }))
}

fn type_error(message: String) -> ScriptError {
    ScriptError::from(Diagnostic::runtime(message))
}

fn expect_string<'a>(this: &'a Value, name: &str) -> Result<&'a str> {
    this.as_str().ok_or_else(|| {
        type_error(format!(
            "`{name}` called on {}, expected a string",
            this.type_name()
        ))
    })
}

/// Clamps a numeric argument to a character position.
fn position(value: &Value, len: usize) -> usize {
    let n = value.to_number();
    if n.is_nan() || n <= 0.0 {
        0
    } else if n >= len as f64 {
        len
    } else {
        n as usize
    }
}

fn global_print(realm: &Realm, _this: &Value, args: &[Value]) -> Result<Value> {
    let line = args
        .iter()
        .map(|arg| realm.text(arg))
        .collect::<Result<Vec<_>>>()?
        .join(" ");
    println!("{line}");
    Ok(Value::undefined())
}

fn global_parse_int(realm: &Realm, _this: &Value, args: &[Value]) -> Result<Value> {
    let text = realm.text(&args[0])?;
    let mut rest = text.trim_start();
    let negative = rest.starts_with('-');
    if let Some(stripped) = rest.strip_prefix(['-', '+']) {
        rest = stripped;
    }
    let mut radix = match args[1].to_number() {
        n if n.is_nan() || n == 0.0 => 10,
        n => n as u32,
    };
    if !(2..=36).contains(&radix) {
        return Ok(Value::number(f64::NAN));
    }
    if radix == 16 || args[1].is_undefined() {
        if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
            rest = hex;
            radix = 16;
        }
    }
    let mut result: Option<f64> = None;
    for ch in rest.chars() {
        let Some(digit) = ch.to_digit(radix) else {
            break;
        };
        result = Some(result.unwrap_or(0.0) * f64::from(radix) + f64::from(digit));
    }
    Ok(Value::number(match result {
        Some(n) if negative => -n,
        Some(n) => n,
        None => f64::NAN,
    }))
}

fn global_parse_float(realm: &Realm, _this: &Value, args: &[Value]) -> Result<Value> {
    let text = realm.text(&args[0])?;
    let text = text.trim_start();
    let unsigned = text.strip_prefix(['-', '+']).unwrap_or(text);
    if unsigned.starts_with("Infinity") {
        let sign = if text.starts_with('-') { -1.0 } else { 1.0 };
        return Ok(Value::number(sign * f64::INFINITY));
    }
    // Longest prefix that still parses as a number.
    let mut best = f64::NAN;
    let mut end = 0;
    for (idx, ch) in text.char_indices() {
        if !(ch.is_ascii_digit() || matches!(ch, '.' | 'e' | 'E' | '+' | '-')) {
            break;
        }
        end = idx + ch.len_utf8();
        if let Ok(n) = text[..end].parse::<f64>() {
            best = n;
        }
    }
    Ok(Value::number(best))
}

fn global_is_nan(_realm: &Realm, _this: &Value, args: &[Value]) -> Result<Value> {
    Ok(Value::bool(args[0].to_number().is_nan()))
}

fn global_is_finite(_realm: &Realm, _this: &Value, args: &[Value]) -> Result<Value> {
    Ok(Value::bool(args[0].to_number().is_finite()))
}

fn convert_string(realm: &Realm, _this: &Value, args: &[Value]) -> Result<Value> {
    match args.first() {
        Some(value) => realm.alloc_string(realm.text(value)?),
        None => Ok(Value::string("")),
    }
}

fn convert_number(_realm: &Realm, _this: &Value, args: &[Value]) -> Result<Value> {
    Ok(Value::number(args.first().map(Value::to_number).unwrap_or(0.0)))
}

fn convert_boolean(_realm: &Realm, _this: &Value, args: &[Value]) -> Result<Value> {
    Ok(Value::bool(args[0].is_truthy()))
}

fn math_abs(_realm: &Realm, _this: &Value, args: &[Value]) -> Result<Value> {
    Ok(Value::number(args[0].to_number().abs()))
}

fn math_floor(_realm: &Realm, _this: &Value, args: &[Value]) -> Result<Value> {
    Ok(Value::number(args[0].to_number().floor()))
}

fn math_ceil(_realm: &Realm, _this: &Value, args: &[Value]) -> Result<Value> {
    Ok(Value::number(args[0].to_number().ceil()))
}

fn math_round(_realm: &Realm, _this: &Value, args: &[Value]) -> Result<Value> {
    let n = args[0].to_number();
    Ok(Value::number((n + 0.5).floor()))
}

fn math_sqrt(_realm: &Realm, _this: &Value, args: &[Value]) -> Result<Value> {
    Ok(Value::number(args[0].to_number().sqrt()))
}

fn math_pow(_realm: &Realm, _this: &Value, args: &[Value]) -> Result<Value> {
    Ok(Value::number(args[0].to_number().powf(args[1].to_number())))
}

fn math_min(_realm: &Realm, _this: &Value, args: &[Value]) -> Result<Value> {
    let mut result = f64::INFINITY;
    for n in args.iter().map(Value::to_number) {
        if n.is_nan() {
            return Ok(Value::number(f64::NAN));
        }
        result = result.min(n);
    }
    Ok(Value::number(result))
}

fn math_max(_realm: &Realm, _this: &Value, args: &[Value]) -> Result<Value> {
    let mut result = f64::NEG_INFINITY;
    for n in args.iter().map(Value::to_number) {
        if n.is_nan() {
            return Ok(Value::number(f64::NAN));
        }
        result = result.max(n);
    }
    Ok(Value::number(result))
}

fn string_to_upper(realm: &Realm, this: &Value, _args: &[Value]) -> Result<Value> {
    realm.alloc_string(expect_string(this, "toUpperCase")?.to_uppercase())
}

fn string_to_lower(realm: &Realm, this: &Value, _args: &[Value]) -> Result<Value> {
    realm.alloc_string(expect_string(this, "toLowerCase")?.to_lowercase())
}

fn string_trim(realm: &Realm, this: &Value, _args: &[Value]) -> Result<Value> {
    realm.alloc_string(expect_string(this, "trim")?.trim().to_string())
}

fn string_index_of(realm: &Realm, this: &Value, args: &[Value]) -> Result<Value> {
    let text = expect_string(this, "indexOf")?;
    let needle = realm.text(&args[0])?;
    let index = text
        .find(&needle)
        .map(|byte| text[..byte].chars().count() as f64)
        .unwrap_or(-1.0);
    Ok(Value::number(index))
}

fn string_char_at(realm: &Realm, this: &Value, args: &[Value]) -> Result<Value> {
    let text = expect_string(this, "charAt")?;
    let n = args[0].to_number();
    let index = if n.is_nan() { 0.0 } else { n.trunc() };
    if index < 0.0 {
        return Ok(Value::string(""));
    }
    realm.alloc_string(
        text.chars()
            .nth(index as usize)
            .map(String::from)
            .unwrap_or_default(),
    )
}

fn string_substring(realm: &Realm, this: &Value, args: &[Value]) -> Result<Value> {
    let text = expect_string(this, "substring")?;
    let len = text.chars().count();
    let start = position(&args[0], len);
    let end = if args[1].is_undefined() {
        len
    } else {
        position(&args[1], len)
    };
    let (from, to) = if start <= end { (start, end) } else { (end, start) };
    realm.alloc_string(text.chars().skip(from).take(to - from).collect())
}

fn string_starts_with(realm: &Realm, this: &Value, args: &[Value]) -> Result<Value> {
    let text = expect_string(this, "startsWith")?;
    Ok(Value::bool(text.starts_with(&realm.text(&args[0])?)))
}

fn string_ends_with(realm: &Realm, this: &Value, args: &[Value]) -> Result<Value> {
    let text = expect_string(this, "endsWith")?;
    Ok(Value::bool(text.ends_with(&realm.text(&args[0])?)))
}

fn expect_array<'a>(this: &'a Value, name: &str) -> Result<&'a ObjectRef> {
    match this.as_object() {
        Some(object) if object.borrow().elements().is_some() => Ok(object),
        _ => Err(type_error(format!(
            "`{name}` called on {}, expected an array",
            this.type_name()
        ))),
    }
}

fn array_push(_realm: &Realm, this: &Value, args: &[Value]) -> Result<Value> {
    let array = expect_array(this, "push")?;
    let mut array = array.borrow_mut();
    let mut len = array.elements().map_or(0, <[Value]>::len);
    for arg in args {
        len = array.push_element(arg.clone())?;
    }
    Ok(Value::number(len as f64))
}

fn array_pop(_realm: &Realm, this: &Value, _args: &[Value]) -> Result<Value> {
    let array = expect_array(this, "pop")?;
    let popped = array.borrow_mut().pop_element();
    Ok(popped.unwrap_or_else(Value::undefined))
}

fn array_join(realm: &Realm, this: &Value, args: &[Value]) -> Result<Value> {
    let array = expect_array(this, "join")?;
    let separator = if args[0].is_undefined() {
        ",".to_string()
    } else {
        realm.text(&args[0])?
    };
    let limit = realm.available();
    let array = array.borrow();
    let mut text = String::new();
    for (idx, item) in array.elements().unwrap_or_default().iter().enumerate() {
        if idx > 0 {
            text.push_str(&separator);
        }
        if !item.is_nullish() {
            text.push_str(&realm.text(item)?);
        }
        if text.len() > limit {
            return Err(realm.exhausted(text.len()));
        }
    }
    drop(array);
    realm.alloc_string(text)
}

fn array_index_of(_realm: &Realm, this: &Value, args: &[Value]) -> Result<Value> {
    let array = expect_array(this, "indexOf")?;
    let array = array.borrow();
    let index = array
        .elements()
        .unwrap_or_default()
        .iter()
        .position(|item| item.strict_equals(&args[0]))
        .map_or(-1.0, |idx| idx as f64);
    Ok(Value::number(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{heap::Heap, value::format_number};

    fn call(callback: NativeCallback, args: &[Value]) -> Value {
        let realm = Realm::new(Heap::new(1 << 20));
        callback(&realm, &Value::undefined(), args).expect("native call")
    }

    #[test]
    fn parse_int_stops_at_first_invalid_digit() {
        let value = call(global_parse_int, &[Value::string("42px"), Value::undefined()]);
        assert_eq!(value.as_number(), Some(42.0));
        let value = call(global_parse_int, &[Value::string("0x1f"), Value::undefined()]);
        assert_eq!(value.as_number(), Some(31.0));
        let value = call(global_parse_int, &[Value::string("abc"), Value::undefined()]);
        assert!(value.as_number().is_some_and(f64::is_nan));
    }

    #[test]
    fn parse_float_takes_longest_numeric_prefix() {
        let value = call(global_parse_float, &[Value::string(" 3.5e2kg")]);
        assert_eq!(value.as_number(), Some(350.0));
        let value = call(global_parse_float, &[Value::string("-Infinity")]);
        assert_eq!(value.as_number(), Some(f64::NEG_INFINITY));
    }

    #[test]
    fn round_goes_half_up() {
        assert_eq!(call(math_round, &[Value::number(2.5)]).as_number(), Some(3.0));
        assert_eq!(call(math_round, &[Value::number(-2.5)]).as_number(), Some(-2.0));
        assert_eq!(format_number(call(math_round, &[Value::number(-0.4)]).to_number()), "0");
    }
}
