use std::cell::RefCell;
use std::io::{self, BufRead};
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

use crate::environment::{EnvId, Environment};
use crate::error::{RuntimeError, RuntimeErrorKind, RuntimeResult};
use crate::runtime::{index_to_usize, Callable, Interpreter, Value};
use crate::tokenizer::Token;

macro_rules! builtin {
    ($envs:expr, $root:expr, $name:expr, $arity:expr, $func:expr) => {
        $envs.define(
            $root,
            $name,
            Value::Callable(Callable::BuiltIn {
                name: $name.to_string(),
                arity: $arity,
                func: Rc::new($func),
            }),
        )
    };
}

/// Registers the global built-ins in the given scope. Called once per
/// interpreter, against the root scope.
pub fn install(envs: &mut Environment, root: EnvId) {
    builtin!(envs, root, "print", Some(1), |interp: &mut Interpreter, args: Vec<Value>| {
        interp.write_line(&args[0].to_string());
        Ok(Value::Void)
    });

    builtin!(envs, root, "input", None, |interp: &mut Interpreter, args: Vec<Value>| {
        if args.len() > 1 {
            return Err(RuntimeError::new(
                RuntimeErrorKind::ArityMismatch,
                format!("Expected at most 1 argument but got {}", args.len()),
            ));
        }
        if let Some(prompt) = args.first() {
            interp.write_str(&prompt.to_string());
        }

        let mut line = String::new();
        io::stdin().lock().read_line(&mut line).map_err(|e| {
            RuntimeError::new(RuntimeErrorKind::Type, format!("Failed to read input: {}", e))
        })?;
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(Value::String(line))
    });

    builtin!(envs, root, "len", Some(1), |_: &mut Interpreter, args: Vec<Value>| {
        match &args[0] {
            Value::String(s) => Ok(Value::Number(s.chars().count() as f64)),
            Value::List(items) => Ok(Value::Number(items.borrow().len() as f64)),
            other => Err(RuntimeError::new(
                RuntimeErrorKind::Type,
                format!("len() expects a string or list, not {}", other.type_name()),
            )),
        }
    });

    builtin!(envs, root, "type", Some(1), |_: &mut Interpreter, args: Vec<Value>| {
        Ok(Value::String(args[0].type_name().to_string()))
    });

    builtin!(envs, root, "string", Some(1), |_: &mut Interpreter, args: Vec<Value>| {
        Ok(Value::String(args[0].to_string()))
    });

    builtin!(envs, root, "number", Some(1), |_: &mut Interpreter, args: Vec<Value>| {
        match &args[0] {
            Value::Number(n) => Ok(Value::Number(*n)),
            Value::String(s) => s.trim().parse::<f64>().map(Value::Number).map_err(|_| {
                RuntimeError::new(
                    RuntimeErrorKind::Type,
                    format!("Cannot convert \"{}\" to a number", s),
                )
            }),
            other => Err(RuntimeError::new(
                RuntimeErrorKind::Type,
                format!("number() expects a string or number, not {}", other.type_name()),
            )),
        }
    });

    builtin!(envs, root, "clock", Some(0), |_: &mut Interpreter, _: Vec<Value>| {
        let elapsed = SystemTime::now().duration_since(UNIX_EPOCH).map_err(|_| {
            RuntimeError::new(RuntimeErrorKind::Type, "System clock is before the Unix epoch")
        })?;
        Ok(Value::Number(elapsed.as_secs_f64()))
    });

    builtin!(envs, root, "random", Some(0), |_: &mut Interpreter, _: Vec<Value>| {
        Ok(Value::Number(rand::thread_rng().gen::<f64>()))
    });

    builtin!(envs, root, "random_int_range", Some(2), |_: &mut Interpreter, args: Vec<Value>| {
        let (low, high) = match (&args[0], &args[1]) {
            (Value::Number(a), Value::Number(b)) if a.fract() == 0.0 && b.fract() == 0.0 => {
                (*a as i64, *b as i64)
            }
            _ => {
                return Err(RuntimeError::new(
                    RuntimeErrorKind::Type,
                    "random_int_range() expects two integer bounds",
                ))
            }
        };
        if low > high {
            return Err(RuntimeError::new(
                RuntimeErrorKind::Type,
                format!("random_int_range() lower bound {} exceeds upper bound {}", low, high),
            ));
        }
        Ok(Value::Number(rand::thread_rng().gen_range(low..=high) as f64))
    });
}

fn error(kind: RuntimeErrorKind, message: impl Into<String>, method: &Token) -> RuntimeError {
    RuntimeError::new(kind, message).at(method.line, method.column)
}

fn expect_arity(args: &[Value], expected: usize, name: &str, method: &Token) -> RuntimeResult<()> {
    if args.len() != expected {
        return Err(error(
            RuntimeErrorKind::ArityMismatch,
            format!("{}() expects {} arguments but got {}", name, expected, args.len()),
            method,
        ));
    }
    Ok(())
}

fn string_arg<'a>(args: &'a [Value], i: usize, name: &str, method: &Token) -> RuntimeResult<&'a str> {
    match &args[i] {
        Value::String(s) => Ok(s),
        other => Err(error(
            RuntimeErrorKind::Type,
            format!("{}() expects a string argument, not {}", name, other.type_name()),
            method,
        )),
    }
}

/// Extracts a callable of exactly one parameter, for the higher-order
/// list methods.
fn unary_fn_arg(args: &[Value], name: &str, method: &Token) -> RuntimeResult<Callable> {
    match &args[0] {
        Value::Callable(callable) => {
            if callable.arity() != Some(1) {
                return Err(error(
                    RuntimeErrorKind::ArityMismatch,
                    format!("{}() requires a function of one argument", name),
                    method,
                ));
            }
            Ok(callable.clone())
        }
        other => Err(error(
            RuntimeErrorKind::Type,
            format!("{}() expects a function, not {}", name, other.type_name()),
            method,
        )),
    }
}

/// String methods. Strings are immutable; every method returns a new
/// value and indices count characters, not bytes.
pub fn string_method(
    _interp: &mut Interpreter,
    s: &str,
    method: &Token,
    args: Vec<Value>,
) -> RuntimeResult<Value> {
    match method.lexeme.as_str() {
        "len" => {
            expect_arity(&args, 0, "len", method)?;
            Ok(Value::Number(s.chars().count() as f64))
        }
        "substring" => {
            if args.is_empty() || args.len() > 2 {
                return Err(error(
                    RuntimeErrorKind::ArityMismatch,
                    format!("substring() expects 1 or 2 arguments but got {}", args.len()),
                    method,
                ));
            }
            let chars: Vec<char> = s.chars().collect();
            let start = span_bound(&args[0], chars.len(), method)?;
            let end = match args.get(1) {
                Some(value) => span_bound(value, chars.len(), method)?,
                None => chars.len(),
            };
            if start > end {
                return Err(error(
                    RuntimeErrorKind::IndexOutOfBounds,
                    format!("substring() start {} exceeds end {}", start, end),
                    method,
                ));
            }
            Ok(Value::String(chars[start..end].iter().collect()))
        }
        "to_lower" => {
            expect_arity(&args, 0, "to_lower", method)?;
            Ok(Value::String(s.to_lowercase()))
        }
        "to_upper" => {
            expect_arity(&args, 0, "to_upper", method)?;
            Ok(Value::String(s.to_uppercase()))
        }
        "trim" => {
            expect_arity(&args, 0, "trim", method)?;
            Ok(Value::String(s.trim().to_string()))
        }
        "starts_with" => {
            expect_arity(&args, 1, "starts_with", method)?;
            let prefix = string_arg(&args, 0, "starts_with", method)?;
            Ok(Value::Boolean(s.starts_with(prefix)))
        }
        "ends_with" => {
            expect_arity(&args, 1, "ends_with", method)?;
            let suffix = string_arg(&args, 0, "ends_with", method)?;
            Ok(Value::Boolean(s.ends_with(suffix)))
        }
        "contains" => {
            expect_arity(&args, 1, "contains", method)?;
            let needle = string_arg(&args, 0, "contains", method)?;
            Ok(Value::Boolean(s.contains(needle)))
        }
        "replace" => {
            expect_arity(&args, 2, "replace", method)?;
            let from = string_arg(&args, 0, "replace", method)?;
            let to = string_arg(&args, 1, "replace", method)?;
            Ok(Value::String(s.replace(from, to)))
        }
        "split" => {
            if args.len() > 1 {
                return Err(error(
                    RuntimeErrorKind::ArityMismatch,
                    format!("split() expects at most 1 argument but got {}", args.len()),
                    method,
                ));
            }
            let delimiter = match args.first() {
                Some(_) => string_arg(&args, 0, "split", method)?,
                None => " ",
            };
            // An empty delimiter splits into individual characters.
            let parts: Vec<Value> = if delimiter.is_empty() {
                s.chars().map(|c| Value::String(c.to_string())).collect()
            } else {
                s.split(delimiter)
                    .map(|part| Value::String(part.to_string()))
                    .collect()
            };
            Ok(Value::list(parts))
        }
        "index_of" => {
            if args.is_empty() || args.len() > 2 {
                return Err(error(
                    RuntimeErrorKind::ArityMismatch,
                    format!("index_of() expects 1 or 2 arguments but got {}", args.len()),
                    method,
                ));
            }
            let needle = string_arg(&args, 0, "index_of", method)?;
            let from = match args.get(1) {
                Some(value) => span_bound(value, s.chars().count(), method)?,
                None => 0,
            };
            Ok(Value::Number(index_of(s, needle, from)))
        }
        "to_list" => {
            expect_arity(&args, 0, "to_list", method)?;
            Ok(Value::list(
                s.chars().map(|c| Value::String(c.to_string())).collect(),
            ))
        }
        "count_vowels" => {
            expect_arity(&args, 0, "count_vowels", method)?;
            let count = s
                .chars()
                .filter(|c| matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u'))
                .count();
            Ok(Value::Number(count as f64))
        }
        name => Err(error(
            RuntimeErrorKind::UnknownMethod,
            format!("Unknown string method '{}'", name),
            method,
        )),
    }
}

/// A span bound may equal the length (one past the last character),
/// unlike an element index.
fn span_bound(value: &Value, len: usize, method: &Token) -> RuntimeResult<usize> {
    let number = match value {
        Value::Number(n) if n.fract() == 0.0 => *n,
        _ => {
            return Err(error(
                RuntimeErrorKind::Type,
                "Index must be an integer",
                method,
            ))
        }
    };
    if number < 0.0 || number > len as f64 {
        return Err(error(
            RuntimeErrorKind::IndexOutOfBounds,
            format!("Index {} out of bounds for length {}", number, len),
            method,
        ));
    }
    Ok(number as usize)
}

/// Character-based search; -1 when absent, matching the scripting-level
/// convention rather than an Option.
fn index_of(haystack: &str, needle: &str, from: usize) -> f64 {
    let chars: Vec<char> = haystack.chars().collect();
    if needle.is_empty() {
        return from as f64;
    }
    let needle_chars: Vec<char> = needle.chars().collect();
    let mut i = from;
    while i + needle_chars.len() <= chars.len() {
        if chars[i..i + needle_chars.len()] == needle_chars[..] {
            return i as f64;
        }
        i += 1;
    }
    -1.0
}

/// List methods. Mutating methods edit the shared backing storage in
/// place, so every alias of the list observes the change.
pub fn list_method(
    interp: &mut Interpreter,
    items: &Rc<RefCell<Vec<Value>>>,
    method: &Token,
    args: Vec<Value>,
) -> RuntimeResult<Value> {
    match method.lexeme.as_str() {
        "add" => {
            expect_arity(&args, 1, "add", method)?;
            let mut args = args;
            items.borrow_mut().push(args.remove(0));
            Ok(Value::Void)
        }
        "get" => {
            expect_arity(&args, 1, "get", method)?;
            let items = items.borrow();
            let i = index_to_usize(&args[0], items.len(), method, "List")?;
            Ok(items[i].clone())
        }
        "set" => {
            expect_arity(&args, 2, "set", method)?;
            let mut items = items.borrow_mut();
            let i = index_to_usize(&args[0], items.len(), method, "List")?;
            items[i] = args[1].clone();
            Ok(Value::Void)
        }
        "insert_at" => {
            expect_arity(&args, 2, "insert_at", method)?;
            let mut items = items.borrow_mut();
            let i = span_bound(&args[0], items.len(), method)?;
            items.insert(i, args[1].clone());
            Ok(Value::Void)
        }
        "remove_at" => {
            expect_arity(&args, 1, "remove_at", method)?;
            let mut items = items.borrow_mut();
            let i = index_to_usize(&args[0], items.len(), method, "List")?;
            Ok(items.remove(i))
        }
        "remove" => {
            expect_arity(&args, 1, "remove", method)?;
            let mut items = items.borrow_mut();
            match items.iter().position(|item| *item == args[0]) {
                Some(i) => {
                    items.remove(i);
                    Ok(Value::Void)
                }
                None => Err(error(
                    RuntimeErrorKind::IndexOutOfBounds,
                    format!("remove() found no element equal to {:?}", args[0]),
                    method,
                )),
            }
        }
        "pop" => {
            if args.len() > 1 {
                return Err(error(
                    RuntimeErrorKind::ArityMismatch,
                    format!("pop() expects at most 1 argument but got {}", args.len()),
                    method,
                ));
            }
            let mut items = items.borrow_mut();
            let i = match args.first() {
                Some(value) => index_to_usize(value, items.len(), method, "List")?,
                None => {
                    if items.is_empty() {
                        return Err(error(
                            RuntimeErrorKind::IndexOutOfBounds,
                            "pop() on an empty list",
                            method,
                        ));
                    }
                    items.len() - 1
                }
            };
            Ok(items.remove(i))
        }
        "clear" => {
            expect_arity(&args, 0, "clear", method)?;
            items.borrow_mut().clear();
            Ok(Value::Void)
        }
        "sort" => {
            expect_arity(&args, 0, "sort", method)?;
            sort_in_place(items, method)?;
            Ok(Value::Void)
        }
        "map" => {
            expect_arity(&args, 1, "map", method)?;
            let func = unary_fn_arg(&args, "map", method)?;
            // Snapshot before re-entering user code so a callback that
            // touches the receiver cannot invalidate the traversal.
            let snapshot: Vec<Value> = items.borrow().clone();
            let mut mapped = Vec::with_capacity(snapshot.len());
            for item in snapshot {
                mapped.push(interp.call(func.clone(), vec![item], method)?);
            }
            Ok(Value::list(mapped))
        }
        "filter" => {
            expect_arity(&args, 1, "filter", method)?;
            let func = unary_fn_arg(&args, "filter", method)?;
            let snapshot: Vec<Value> = items.borrow().clone();
            let mut kept = Vec::new();
            for item in snapshot {
                let keep = interp.call(func.clone(), vec![item.clone()], method)?;
                if keep.is_truthy() {
                    kept.push(item);
                }
            }
            Ok(Value::list(kept))
        }
        name => Err(error(
            RuntimeErrorKind::UnknownMethod,
            format!("Unknown list method '{}'", name),
            method,
        )),
    }
}

/// In-place sort over an all-number or all-string list; anything mixed
/// is a type error before any element moves.
fn sort_in_place(items: &Rc<RefCell<Vec<Value>>>, method: &Token) -> RuntimeResult<()> {
    let mut items = items.borrow_mut();

    if items.iter().all(|v| matches!(v, Value::Number(_))) {
        items.sort_by(|a, b| match (a, b) {
            (Value::Number(x), Value::Number(y)) => x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal),
            _ => std::cmp::Ordering::Equal,
        });
        return Ok(());
    }
    if items.iter().all(|v| matches!(v, Value::String(_))) {
        items.sort_by(|a, b| match (a, b) {
            (Value::String(x), Value::String(y)) => x.cmp(y),
            _ => std::cmp::Ordering::Equal,
        });
        return Ok(());
    }
    Err(error(
        RuntimeErrorKind::Type,
        "sort() requires all numbers or all strings",
        method,
    ))
}
