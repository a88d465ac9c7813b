//! Tree-walking evaluator.

use serde_json::{Map, Number, Value};

use super::ScriptError;
use super::ast::{BinaryOp, Expr, Place, Program, Step, Stmt, UnaryOp};
use super::scope::Scope;

/// Builtin functions a script may call. Implemented by the runtime; the
/// evaluator itself has no side effects beyond its scope.
pub trait Host {
    /// Invoke builtin `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::UnknownFunction`] for names the host does not
    /// provide, or any error the builtin raises.
    fn call(&mut self, name: &str, args: Vec<Value>) -> Result<Value, ScriptError>;
}

/// Deepest array/object nesting a script may build or assign into.
pub const MAX_VALUE_DEPTH: usize = 128;

pub(super) struct Interpreter<'a> {
    pub(super) scope: &'a mut Scope,
    /// Unit-local bindings; `None` when running directly in `scope`.
    pub(super) locals: Option<&'a mut Map<String, Value>>,
    pub(super) host: &'a mut dyn Host,
}

enum Key {
    Field(String),
    Index(usize),
}

impl Interpreter<'_> {
    pub(super) fn run(&mut self, program: &Program) -> Result<Value, ScriptError> {
        let mut last = Value::Null;
        for stmt in &program.statements {
            last = match stmt {
                Stmt::Let { name, value } => {
                    let value = self.eval(value)?;
                    self.bind(name, value);
                    Value::Null
                }
                Stmt::Assign { target, value } => {
                    let value = self.eval(value)?;
                    self.assign(target, value.clone())?;
                    value
                }
                Stmt::Expr(expr) => self.eval(expr)?,
            };
        }
        Ok(last)
    }

    fn bind(&mut self, name: &str, value: Value) {
        match self.locals.as_deref_mut() {
            Some(locals) => {
                locals.insert(name.to_owned(), value);
            }
            None => self.scope.set(name, value),
        }
    }

    fn lookup(&self, name: &str) -> Result<Value, ScriptError> {
        self.locals
            .as_deref()
            .and_then(|locals| locals.get(name))
            .or_else(|| self.scope.get(name))
            .cloned()
            .ok_or_else(|| ScriptError::Undefined(name.to_owned()))
    }

    fn assign(&mut self, place: &Place, value: Value) -> Result<(), ScriptError> {
        let keys = place
            .steps
            .iter()
            .map(|step| self.key(step))
            .collect::<Result<Vec<_>, _>>()?;
        let value = bounded(value, keys.len())?;

        let map = match self.locals.as_deref_mut() {
            Some(locals) if locals.contains_key(&place.root) => locals,
            _ => self.scope.bindings_mut(),
        };

        let Some((last, path)) = keys.split_last() else {
            map.insert(place.root.clone(), value);
            return Ok(());
        };

        // Writing through a missing root creates it, e.g. `module.returned = 1`.
        let mut slot = map
            .entry(place.root.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        for key in path {
            slot = child_mut(slot, key)?;
        }
        set_child(slot, last, value)
    }

    fn key(&mut self, step: &Step) -> Result<Key, ScriptError> {
        match step {
            Step::Field(name) => Ok(Key::Field(name.clone())),
            Step::Index(expr) => match self.eval(expr)? {
                Value::String(name) => Ok(Key::Field(name)),
                Value::Number(n) => index_of(&n).map(Key::Index),
                other => Err(ScriptError::Type(format!("cannot use {} as a key", kind(&other)))),
            },
        }
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, ScriptError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Var(name) => self.lookup(name),
            Expr::Array(items) => {
                let items = items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Result<Vec<_>, _>>()?;
                bounded(Value::Array(items), 0)
            }
            Expr::Object(fields) => {
                let mut map = Map::new();
                for (key, value) in fields {
                    let value = self.eval(value)?;
                    map.insert(key.clone(), value);
                }
                bounded(Value::Object(map), 0)
            }
            Expr::Field(object, name) => {
                let object = self.eval(object)?;
                read_field(&object, name)
            }
            Expr::Index(object, key) => {
                let object = self.eval(object)?;
                let key = self.eval(key)?;
                read_index(&object, &key)
            }
            Expr::Call { name, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                self.host.call(name, args)
            }
            Expr::Unary { op, expr } => {
                let value = self.eval(expr)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!truthy(&value))),
                    UnaryOp::Neg => Ok(number(-as_number(&value, "-")?)),
                }
            }
            Expr::Binary { op: BinaryOp::And, left, right } => {
                let left = self.eval(left)?;
                if truthy(&left) { self.eval(right) } else { Ok(left) }
            }
            Expr::Binary { op: BinaryOp::Or, left, right } => {
                let left = self.eval(left)?;
                if truthy(&left) { Ok(left) } else { self.eval(right) }
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, &left, &right)
            }
        }
    }
}

/// Array/object nesting of `value`. Only ever called on values already within
/// [`MAX_VALUE_DEPTH`] plus one level, so the recursion stays shallow.
fn nesting(value: &Value) -> usize {
    match value {
        Value::Array(items) => 1 + items.iter().map(nesting).max().unwrap_or(0),
        Value::Object(map) => 1 + map.values().map(nesting).max().unwrap_or(0),
        _ => 0,
    }
}

/// Reject `value` if storing it `below` levels under a binding would exceed
/// [`MAX_VALUE_DEPTH`].
fn bounded(value: Value, below: usize) -> Result<Value, ScriptError> {
    if nesting(&value) + below > MAX_VALUE_DEPTH {
        return Err(ScriptError::Type("value nested too deeply".to_owned()));
    }
    Ok(value)
}

fn child_mut<'v>(slot: &'v mut Value, key: &Key) -> Result<&'v mut Value, ScriptError> {
    match (slot, key) {
        (Value::Object(map), Key::Field(name)) => {
            Ok(map.entry(name.clone()).or_insert_with(|| Value::Object(Map::new())))
        }
        (Value::Object(map), Key::Index(index)) => {
            Ok(map.entry(index.to_string()).or_insert_with(|| Value::Object(Map::new())))
        }
        (Value::Array(items), Key::Index(index)) => {
            let len = items.len();
            items
                .get_mut(*index)
                .ok_or_else(|| ScriptError::Type(format!("index {index} out of range for length {len}")))
        }
        (other, _) => Err(ScriptError::Type(format!("cannot set a property on {}", kind(other)))),
    }
}

fn set_child(slot: &mut Value, key: &Key, value: Value) -> Result<(), ScriptError> {
    match (slot, key) {
        (Value::Object(map), Key::Field(name)) => {
            map.insert(name.clone(), value);
            Ok(())
        }
        (Value::Object(map), Key::Index(index)) => {
            map.insert(index.to_string(), value);
            Ok(())
        }
        (Value::Array(items), Key::Index(index)) if *index < items.len() => {
            items[*index] = value;
            Ok(())
        }
        (Value::Array(items), Key::Index(index)) if *index == items.len() => {
            items.push(value);
            Ok(())
        }
        (Value::Array(items), Key::Index(index)) => Err(ScriptError::Type(format!(
            "index {index} out of range for length {}",
            items.len()
        ))),
        (other, _) => Err(ScriptError::Type(format!("cannot set a property on {}", kind(other)))),
    }
}

fn read_field(object: &Value, name: &str) -> Result<Value, ScriptError> {
    match object {
        Value::Object(map) => Ok(map.get(name).cloned().unwrap_or(Value::Null)),
        Value::Array(items) if name == "length" => Ok(Value::from(items.len())),
        Value::String(text) if name == "length" => Ok(Value::from(text.chars().count())),
        Value::Null => Err(ScriptError::Type(format!("cannot read `{name}` of null"))),
        _ => Ok(Value::Null),
    }
}

fn read_index(object: &Value, key: &Value) -> Result<Value, ScriptError> {
    match (object, key) {
        (Value::Null, _) => Err(ScriptError::Type("cannot index null".to_owned())),
        (_, Value::String(name)) => read_field(object, name),
        (Value::Array(items), Value::Number(n)) => {
            Ok(index_of(n).ok().and_then(|i| items.get(i)).cloned().unwrap_or(Value::Null))
        }
        (Value::Object(map), Value::Number(n)) => Ok(map.get(&n.to_string()).cloned().unwrap_or(Value::Null)),
        _ => Ok(Value::Null),
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ScriptError> {
    match op {
        BinaryOp::Add => match (left, right) {
            (Value::String(_), _) | (_, Value::String(_)) => {
                Ok(Value::String(format!("{}{}", text(left), text(right))))
            }
            _ => Ok(number(as_number(left, "+")? + as_number(right, "+")?)),
        },
        BinaryOp::Sub => Ok(number(as_number(left, "-")? - as_number(right, "-")?)),
        BinaryOp::Mul => Ok(number(as_number(left, "*")? * as_number(right, "*")?)),
        BinaryOp::Div => {
            let divisor = as_number(right, "/")?;
            if divisor == 0.0 {
                return Err(ScriptError::Type("division by zero".to_owned()));
            }
            Ok(number(as_number(left, "/")? / divisor))
        }
        BinaryOp::Eq => Ok(Value::Bool(loose_eq(left, right))),
        BinaryOp::Ne => Ok(Value::Bool(!loose_eq(left, right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (left, right) {
                (Value::String(a), Value::String(b)) => a.partial_cmp(b),
                _ => as_number(left, "comparison")?.partial_cmp(&as_number(right, "comparison")?),
            };
            let Some(ordering) = ordering else {
                return Ok(Value::Bool(false));
            };
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("short-circuit operators are evaluated lazily"),
    }
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn as_number(value: &Value, op: &str) -> Result<f64, ScriptError> {
    value
        .as_f64()
        .ok_or_else(|| ScriptError::Type(format!("`{op}` expects numbers, got {}", kind(value))))
}

/// Integral results stay integers on the wire; non-finite results become `null`.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn number(value: f64) -> Value {
    const SAFE: f64 = 9_007_199_254_740_991.0;
    if value.fract() == 0.0 && value.abs() <= SAFE {
        return Value::from(value as i64);
    }
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn index_of(n: &Number) -> Result<usize, ScriptError> {
    if let Some(i) = n.as_u64() {
        return usize::try_from(i).map_err(|_| ScriptError::Type(format!("index {n} is too large")));
    }
    match n.as_f64() {
        Some(f) if f >= 0.0 && f.fract() == 0.0 => Ok(f as usize),
        _ => Err(ScriptError::Type(format!("invalid index {n}"))),
    }
}

pub(super) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// String form used by `+` concatenation and `log`.
pub(super) fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
