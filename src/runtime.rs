use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug, Display, Formatter};
use std::io::{self, Write};
use std::rc::Rc;

use log::debug;

use crate::ast::{Expr, Literal, Stmt};
use crate::environment::{EnvId, Environment};
use crate::error::{RuntimeError, RuntimeErrorKind, RuntimeResult};
use crate::stdlib;
use crate::tokenizer::{Token, TokenType};

#[derive(Clone)]
pub enum Value {
    Void,
    Number(f64),
    Boolean(bool),
    String(String),
    /// Lists are reference types: cloning the value aliases the same
    /// backing storage, so in-place mutation is visible through every
    /// alias.
    List(Rc<RefCell<Vec<Value>>>),
    Callable(Callable),
}

impl Value {
    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    /// Only Void and false are falsy; zero, "" and [] are all truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Void => false,
            Value::Boolean(b) => *b,
            _ => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Void => "void",
            Value::Number(_) => "number",
            Value::Boolean(_) => "boolean",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Callable(_) => "callable",
        }
    }
}

// Lists may contain themselves (they are reference types), so deep
// traversals need a cutoff to terminate.
const MAX_LIST_DEPTH: usize = 32;

thread_local! {
    static LIST_DEPTH: Cell<usize> = const { Cell::new(0) };
}

fn with_list_depth<T>(f: impl FnOnce() -> T) -> Option<T> {
    let depth = LIST_DEPTH.with(|d| d.get());
    if depth >= MAX_LIST_DEPTH {
        return None;
    }
    LIST_DEPTH.with(|d| d.set(depth + 1));
    let result = f();
    LIST_DEPTH.with(|d| d.set(depth));
    Some(result)
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => {
                const EPSILON: f64 = 1e-10;
                (a - b).abs() < EPSILON
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                // Past the depth cutoff, structures compare equal only
                // through aliasing.
                with_list_depth(|| *a.borrow() == *b.borrow()).unwrap_or(false)
            }
            (Value::Void, Value::Void) => true,
            // Mismatched tags are unequal, never an error; callables
            // have no useful identity.
            _ => false,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "void"),
            Value::Number(n) => {
                if n.fract() == 0.0 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::Boolean(b) => write!(f, "{}", b),
            Value::String(s) => write!(f, "{}", s),
            Value::List(items) => {
                let rendered = with_list_depth(|| {
                    write!(f, "[")?;
                    for (i, item) in items.borrow().iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{:?}", item)?;
                    }
                    write!(f, "]")
                });
                match rendered {
                    Some(result) => result,
                    None => write!(f, "[...]"),
                }
            }
            Value::Callable(c) => write!(f, "{}", c),
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Value::String(s) = self {
            write!(f, "\"{}\"", s)
        } else {
            write!(f, "{}", self)
        }
    }
}

pub type NativeFn = Rc<dyn Fn(&mut Interpreter, Vec<Value>) -> RuntimeResult<Value>>;

#[derive(Clone)]
pub enum Callable {
    Function {
        name: String,
        params: Vec<String>,
        body: Rc<Vec<Stmt>>,
        closure: EnvId,
    },
    BuiltIn {
        name: String,
        /// `None` means variadic; the built-in validates internally.
        arity: Option<usize>,
        func: NativeFn,
    },
}

impl Callable {
    pub fn arity(&self) -> Option<usize> {
        match self {
            Callable::Function { params, .. } => Some(params.len()),
            Callable::BuiltIn { arity, .. } => *arity,
        }
    }
}

impl Display for Callable {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Function { name, .. } => write!(f, "<fn {}>", name),
            Callable::BuiltIn { name, .. } => write!(f, "<built-in {}>", name),
        }
    }
}

impl Debug for Callable {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// Statement outcome. `Return` is the one non-local transfer in the
/// language; it must unwind exactly to the nearest enclosing call
/// boundary, passing through blocks and loops untouched.
pub enum Flow {
    Normal,
    Return {
        value: Value,
        line: usize,
        column: usize,
    },
}

enum Output {
    Stdout,
    Capture(String),
}

pub struct Interpreter {
    envs: Environment,
    globals: EnvId,
    output: Output,
}

impl Interpreter {
    /// Fresh interpreter with the standard built-ins pre-registered in
    /// the root scope.
    pub fn new() -> Self {
        let mut envs = Environment::new();
        let globals = envs.root();
        stdlib::install(&mut envs, globals);
        Interpreter {
            envs,
            globals,
            output: Output::Stdout,
        }
    }

    /// Like `new`, but `print` output accumulates in an internal buffer
    /// instead of going to stdout. Used by tests and embedders.
    pub fn with_capture() -> Self {
        let mut interpreter = Self::new();
        interpreter.output = Output::Capture(String::new());
        interpreter
    }

    pub fn captured_output(&self) -> Option<&str> {
        match &self.output {
            Output::Stdout => None,
            Output::Capture(buffer) => Some(buffer),
        }
    }

    pub fn globals(&self) -> EnvId {
        self.globals
    }

    /// Registration hook: lets the embedding shell install additional
    /// bindings before running any program.
    pub fn environment(&mut self) -> &mut Environment {
        &mut self.envs
    }

    pub(crate) fn write_str(&mut self, text: &str) {
        match &mut self.output {
            Output::Stdout => {
                print!("{}", text);
                let _ = io::stdout().flush();
            }
            Output::Capture(buffer) => buffer.push_str(text),
        }
    }

    pub(crate) fn write_line(&mut self, text: &str) {
        match &mut self.output {
            Output::Stdout => println!("{}", text),
            Output::Capture(buffer) => {
                buffer.push_str(text);
                buffer.push('\n');
            }
        }
    }

    /// Runs a whole program against the global scope. The first runtime
    /// error stops the remaining statements; side effects that already
    /// happened (output, bindings) stay in place.
    pub fn interpret(&mut self, statements: &[Stmt]) -> RuntimeResult<()> {
        debug!("interpreting {} statements", statements.len());
        for statement in statements {
            let globals = self.globals;
            if let Flow::Return { line, column, .. } = self.execute(statement, globals)? {
                return Err(RuntimeError::new(
                    RuntimeErrorKind::Type,
                    "'return' outside of a function",
                )
                .at(line, column));
            }
        }
        Ok(())
    }

    /// Evaluates a single expression in the global scope. REPL echo path.
    pub fn eval(&mut self, expr: &Expr) -> RuntimeResult<Value> {
        let globals = self.globals;
        self.evaluate(expr, globals)
    }

    fn execute(&mut self, statement: &Stmt, env: EnvId) -> RuntimeResult<Flow> {
        match statement {
            Stmt::Expression(expr) => {
                self.evaluate(expr, env)?;
                Ok(Flow::Normal)
            }
            Stmt::Print(expr) => {
                let value = self.evaluate(expr, env)?;
                self.write_line(&value.to_string());
                Ok(Flow::Normal)
            }
            Stmt::Var { name, initializer } => {
                let value = match initializer {
                    Some(expr) => self.evaluate(expr, env)?,
                    None => Value::Void,
                };
                self.envs.define(env, name.lexeme.clone(), value);
                Ok(Flow::Normal)
            }
            Stmt::Block(statements) => {
                // One fresh scope per entry, so each loop iteration's
                // declarations start clean.
                let child = self.envs.push(env);
                for statement in statements {
                    match self.execute(statement, child)? {
                        Flow::Normal => {}
                        flow => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition, env)?.is_truthy() {
                    self.execute(then_branch, env)
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch, env)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While { condition, body } => {
                while self.evaluate(condition, env)?.is_truthy() {
                    match self.execute(body, env)? {
                        Flow::Normal => {}
                        flow => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Func { name, params, body } => {
                // The current environment becomes the closure: capture
                // at declaration, not at call.
                let function = Callable::Function {
                    name: name.lexeme.clone(),
                    params: params.iter().map(|p| p.lexeme.clone()).collect(),
                    body: Rc::clone(body),
                    closure: env,
                };
                self.envs
                    .define(env, name.lexeme.clone(), Value::Callable(function));
                Ok(Flow::Normal)
            }
            Stmt::Return { keyword, value } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr, env)?,
                    None => Value::Void,
                };
                Ok(Flow::Return {
                    value,
                    line: keyword.line,
                    column: keyword.column,
                })
            }
        }
    }

    fn evaluate(&mut self, expr: &Expr, env: EnvId) -> RuntimeResult<Value> {
        match expr {
            Expr::Literal(literal) => Ok(match literal {
                Literal::Number(n) => Value::Number(*n),
                Literal::String(s) => Value::String(s.clone()),
                Literal::Boolean(b) => Value::Boolean(*b),
                Literal::Void => Value::Void,
            }),
            Expr::Grouping(inner) => self.evaluate(inner, env),
            Expr::Unary { operator, right } => self.evaluate_unary(operator, right, env),
            Expr::Binary {
                left,
                operator,
                right,
            } => self.evaluate_binary(left, operator, right, env),
            Expr::Logical {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left, env)?;
                let short_circuits = match operator.token_type {
                    TokenType::Or => left.is_truthy(),
                    _ => !left.is_truthy(),
                };
                if short_circuits {
                    Ok(left)
                } else {
                    self.evaluate(right, env)
                }
            }
            Expr::Variable { name } => match self.envs.get(env, &name.lexeme) {
                Some(value) => Ok(value.clone()),
                None => Err(error(
                    RuntimeErrorKind::UndefinedVariable,
                    format!("Undefined variable '{}'", name.lexeme),
                    name,
                )),
            },
            Expr::Assign { name, value } => {
                let value = self.evaluate(value, env)?;
                if self.envs.assign(env, &name.lexeme, value.clone()) {
                    Ok(value)
                } else {
                    Err(error(
                        RuntimeErrorKind::UndefinedVariable,
                        format!("Cannot assign to undefined variable '{}'", name.lexeme),
                        name,
                    ))
                }
            }
            Expr::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee = self.evaluate(callee, env)?;
                let mut evaluated = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    evaluated.push(self.evaluate(argument, env)?);
                }

                match callee {
                    Value::Callable(callable) => self.call(callable, evaluated, paren),
                    other => Err(error(
                        RuntimeErrorKind::Type,
                        format!("Can only call functions, not {}", other.type_name()),
                        paren,
                    )),
                }
            }
            Expr::Index {
                object,
                bracket,
                index,
            } => {
                let object = self.evaluate(object, env)?;
                let index = self.evaluate(index, env)?;
                match object {
                    Value::List(items) => {
                        let items = items.borrow();
                        let i = index_to_usize(&index, items.len(), bracket, "List")?;
                        Ok(items[i].clone())
                    }
                    Value::String(s) => {
                        let i = index_to_usize(&index, s.chars().count(), bracket, "String")?;
                        let ch = s.chars().nth(i).map(String::from).unwrap_or_default();
                        Ok(Value::String(ch))
                    }
                    other => Err(error(
                        RuntimeErrorKind::Type,
                        format!("Cannot index a {}", other.type_name()),
                        bracket,
                    )),
                }
            }
            Expr::IndexSet {
                object,
                bracket,
                index,
                value,
            } => {
                let object = self.evaluate(object, env)?;
                match object {
                    Value::List(items) => {
                        let index = self.evaluate(index, env)?;
                        let value = self.evaluate(value, env)?;
                        let mut items = items.borrow_mut();
                        let i = index_to_usize(&index, items.len(), bracket, "List")?;
                        items[i] = value.clone();
                        Ok(value)
                    }
                    Value::String(_) => Err(error(
                        RuntimeErrorKind::Type,
                        "Strings are immutable",
                        bracket,
                    )),
                    other => Err(error(
                        RuntimeErrorKind::Type,
                        format!("Cannot index-assign a {}", other.type_name()),
                        bracket,
                    )),
                }
            }
            Expr::MethodCall {
                object,
                method,
                arguments,
            } => {
                let object = self.evaluate(object, env)?;
                let mut evaluated = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    evaluated.push(self.evaluate(argument, env)?);
                }

                match object {
                    Value::String(s) => stdlib::string_method(self, &s, method, evaluated),
                    Value::List(items) => stdlib::list_method(self, &items, method, evaluated),
                    other => Err(error(
                        RuntimeErrorKind::Type,
                        format!("type '{}' has no methods", other.type_name()),
                        method,
                    )),
                }
            }
            Expr::List { elements, .. } => {
                let mut items = Vec::with_capacity(elements.len());
                for element in elements {
                    items.push(self.evaluate(element, env)?);
                }
                Ok(Value::list(items))
            }
        }
    }

    fn evaluate_unary(&mut self, operator: &Token, right: &Expr, env: EnvId) -> RuntimeResult<Value> {
        let right = self.evaluate(right, env)?;
        match operator.token_type {
            TokenType::Bang => Ok(Value::Boolean(!right.is_truthy())),
            TokenType::Minus => match right {
                Value::Number(n) => Ok(Value::Number(-n)),
                other => Err(error(
                    RuntimeErrorKind::Type,
                    format!("Operand must be a number, not {}", other.type_name()),
                    operator,
                )),
            },
            _ => unreachable!("parser only builds '!' and '-' unary nodes"),
        }
    }

    fn evaluate_binary(
        &mut self,
        left: &Expr,
        operator: &Token,
        right: &Expr,
        env: EnvId,
    ) -> RuntimeResult<Value> {
        let left = self.evaluate(left, env)?;
        let right = self.evaluate(right, env)?;

        match operator.token_type {
            TokenType::Plus => match (&left, &right) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
                (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
                (Value::List(a), Value::List(b)) => Ok(Value::list(
                    a.borrow().iter().chain(b.borrow().iter()).cloned().collect(),
                )),
                _ => Err(error(
                    RuntimeErrorKind::Type,
                    "Operands must be two numbers, two strings, or two lists",
                    operator,
                )),
            },
            TokenType::Minus => {
                let (a, b) = number_operands(&left, &right, operator)?;
                Ok(Value::Number(a - b))
            }
            TokenType::Star => {
                let (a, b) = number_operands(&left, &right, operator)?;
                Ok(Value::Number(a * b))
            }
            TokenType::Slash => {
                let (a, b) = number_operands(&left, &right, operator)?;
                if b == 0.0 {
                    return Err(error(
                        RuntimeErrorKind::DivisionByZero,
                        "Division by zero",
                        operator,
                    ));
                }
                Ok(Value::Number(a / b))
            }
            TokenType::Percent => {
                let (a, b) = number_operands(&left, &right, operator)?;
                if b == 0.0 {
                    return Err(error(
                        RuntimeErrorKind::DivisionByZero,
                        "Modulo by zero",
                        operator,
                    ));
                }
                Ok(Value::Number(a % b))
            }
            TokenType::Greater
            | TokenType::GreaterEqual
            | TokenType::Less
            | TokenType::LessEqual => self.compare(&left, &right, operator),
            TokenType::EqualEqual => Ok(Value::Boolean(left == right)),
            TokenType::BangEqual => Ok(Value::Boolean(left != right)),
            _ => unreachable!("parser only builds arithmetic and comparison binary nodes"),
        }
    }

    /// Ordering is defined within Numbers and within Strings
    /// (lexicographic); any other pairing is a type error.
    fn compare(&self, left: &Value, right: &Value, operator: &Token) -> RuntimeResult<Value> {
        let result = match (left, right) {
            (Value::Number(a), Value::Number(b)) => match operator.token_type {
                TokenType::Greater => a > b,
                TokenType::GreaterEqual => a >= b,
                TokenType::Less => a < b,
                _ => a <= b,
            },
            (Value::String(a), Value::String(b)) => match operator.token_type {
                TokenType::Greater => a > b,
                TokenType::GreaterEqual => a >= b,
                TokenType::Less => a < b,
                _ => a <= b,
            },
            _ => {
                return Err(error(
                    RuntimeErrorKind::Type,
                    "Operands must be two numbers or two strings",
                    operator,
                ))
            }
        };
        Ok(Value::Boolean(result))
    }

    /// Invokes a callable. Exposed so higher-order built-ins (`map`,
    /// `filter`) can re-enter the call machinery.
    pub fn call(
        &mut self,
        callable: Callable,
        arguments: Vec<Value>,
        at: &Token,
    ) -> RuntimeResult<Value> {
        if let Some(expected) = callable.arity() {
            if expected != arguments.len() {
                return Err(error(
                    RuntimeErrorKind::ArityMismatch,
                    format!(
                        "Expected {} arguments but got {}",
                        expected,
                        arguments.len()
                    ),
                    at,
                ));
            }
        }

        match callable {
            Callable::Function {
                params,
                body,
                closure,
                ..
            } => {
                let call_env = self.envs.push(closure);
                for (param, argument) in params.iter().zip(arguments) {
                    self.envs.define(call_env, param.clone(), argument);
                }

                for statement in body.iter() {
                    if let Flow::Return { value, .. } = self.execute(statement, call_env)? {
                        return Ok(value);
                    }
                }
                // No explicit return: the call yields Void.
                Ok(Value::Void)
            }
            Callable::BuiltIn { func, .. } => {
                let func = Rc::clone(&func);
                func(self, arguments).map_err(|e| e.at(at.line, at.column))
            }
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

fn error(kind: RuntimeErrorKind, message: impl Into<String>, token: &Token) -> RuntimeError {
    RuntimeError::new(kind, message).at(token.line, token.column)
}

fn number_operands(left: &Value, right: &Value, operator: &Token) -> RuntimeResult<(f64, f64)> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok((*a, *b)),
        _ => Err(error(
            RuntimeErrorKind::Type,
            "Operands must be numbers",
            operator,
        )),
    }
}

/// Index values must be integral Numbers; negative or past-the-end
/// indices are out of bounds, never a wraparound.
pub(crate) fn index_to_usize(
    index: &Value,
    len: usize,
    token: &Token,
    what: &str,
) -> RuntimeResult<usize> {
    let number = match index {
        Value::Number(n) if n.fract() == 0.0 => *n,
        _ => {
            return Err(error(
                RuntimeErrorKind::Type,
                format!("{} index must be an integer", what),
                token,
            ))
        }
    };

    if number < 0.0 || number >= len as f64 {
        return Err(error(
            RuntimeErrorKind::IndexOutOfBounds,
            format!("{} index {} out of bounds for length {}", what, number, len),
            token,
        ));
    }
    Ok(number as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::tokenizer::scan;

    fn run(source: &str) -> (Interpreter, RuntimeResult<()>) {
        let (tokens, lex_diagnostics) = scan(source);
        assert!(lex_diagnostics.is_empty(), "lexical errors: {lex_diagnostics}");
        let (program, parse_diagnostics) = parse(&tokens);
        assert!(
            parse_diagnostics.is_empty(),
            "syntax errors: {parse_diagnostics}"
        );

        let mut interpreter = Interpreter::with_capture();
        let result = interpreter.interpret(&program);
        (interpreter, result)
    }

    fn run_ok(source: &str) -> String {
        let (interpreter, result) = run(source);
        result.expect("program should run");
        interpreter.captured_output().unwrap().to_string()
    }

    fn run_err(source: &str) -> RuntimeError {
        let (_, result) = run(source);
        result.expect_err("program should fail")
    }

    #[test]
    fn test_operator_precedence() {
        assert_eq!(run_ok("print 1 + 2 * 3;"), "7\n");
        assert_eq!(run_ok("print (1 + 2) * 3;"), "9\n");
    }

    #[test]
    fn test_number_rendering_trims_trailing_zero() {
        assert_eq!(run_ok("print 2.0;"), "2\n");
        assert_eq!(run_ok("print 2.5;"), "2.5\n");
        assert_eq!(run_ok("print 10 / 4;"), "2.5\n");
    }

    #[test]
    fn test_string_and_list_concatenation() {
        assert_eq!(run_ok("print \"foo\" + \"bar\";"), "foobar\n");
        assert_eq!(run_ok("print [1] + [2, 3];"), "[1, 2, 3]\n");
        let err = run_err("print 1 + \"one\";");
        assert_eq!(err.kind, RuntimeErrorKind::Type);
    }

    #[test]
    fn test_division_and_modulo_by_zero() {
        assert_eq!(run_err("print 1 / 0;").kind, RuntimeErrorKind::DivisionByZero);
        assert_eq!(run_err("print 1 % 0;").kind, RuntimeErrorKind::DivisionByZero);
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(run_ok("print 1 < 2;"), "true\n");
        assert_eq!(run_ok("print \"apple\" < \"banana\";"), "true\n");
        assert_eq!(run_err("print 1 < \"two\";").kind, RuntimeErrorKind::Type);
    }

    #[test]
    fn test_equality_across_tags_is_false_not_an_error() {
        assert_eq!(run_ok("print 1 == \"1\";"), "false\n");
        assert_eq!(run_ok("print void == false;"), "false\n");
        assert_eq!(run_ok("print [1, [2]] == [1, [2]];"), "true\n");
        assert_eq!(run_ok("print [1] == [1, 2];"), "false\n");
    }

    #[test]
    fn test_truthiness_only_void_and_false_are_falsy() {
        assert_eq!(run_ok("if (0) print \"t\"; else print \"f\";"), "t\n");
        assert_eq!(run_ok("if (\"\") print \"t\"; else print \"f\";"), "t\n");
        assert_eq!(run_ok("if ([]) print \"t\"; else print \"f\";"), "t\n");
        assert_eq!(run_ok("if (void) print \"t\"; else print \"f\";"), "f\n");
        assert_eq!(run_ok("print !void;"), "true\n");
    }

    #[test]
    fn test_short_circuit_skips_right_operand() {
        let source = "
            var called = false;
            func side(): { called = true; return true; }
            false and side();
            true or side();
            print called;
        ";
        assert_eq!(run_ok(source), "false\n");
    }

    #[test]
    fn test_logical_operators_yield_operand_values() {
        assert_eq!(run_ok("print 1 and 2;"), "2\n");
        assert_eq!(run_ok("print false or 3;"), "3\n");
        assert_eq!(run_ok("print void and 2;"), "void\n");
    }

    #[test]
    fn test_block_scoping() {
        let source = "var x = 1; { var x = 2; print x; } print x;";
        assert_eq!(run_ok(source), "2\n1\n");

        // Assignment from an inner block reaches the outer binding.
        let source = "var x = 1; { x = 5; } print x;";
        assert_eq!(run_ok(source), "5\n");

        // A block-local variable is gone after the block.
        let err = run_err("{ var y = 1; } print y;");
        assert_eq!(err.kind, RuntimeErrorKind::UndefinedVariable);
    }

    #[test]
    fn test_loop_iterations_get_fresh_scopes() {
        let source = "
            var i = 0;
            var total = 0;
            while (i < 3) {
                var step = i + 1;
                total = total + step;
                i = i + 1;
            }
            print total;
        ";
        assert_eq!(run_ok(source), "6\n");
    }

    #[test]
    fn test_for_loop() {
        let source = "for (var i = 0; i < 3; i = i + 1) print i;";
        assert_eq!(run_ok(source), "0\n1\n2\n");
    }

    #[test]
    fn test_function_declaration_and_call() {
        assert_eq!(
            run_ok("func add(a, b): return a + b; print add(2, 3);"),
            "5\n"
        );

        // Fall-through without return yields Void.
        assert_eq!(run_ok("func noop(): {} print noop();"), "void\n");
    }

    #[test]
    fn test_arity_mismatch() {
        let err = run_err("func f(x): return x; f(1, 2);");
        assert_eq!(err.kind, RuntimeErrorKind::ArityMismatch);

        let err = run_err("func f(x): return x; f();");
        assert_eq!(err.kind, RuntimeErrorKind::ArityMismatch);
    }

    #[test]
    fn test_recursion() {
        let source = "
            func fact(n): {
                if (n <= 1) return 1;
                return n * fact(n - 1);
            }
            print fact(5);
        ";
        assert_eq!(run_ok(source), "120\n");
    }

    #[test]
    fn test_closures_capture_declaration_environment() {
        let source = "
            func make_adder(x): {
                func add(y): return x + y;
                return add;
            }
            var add2 = make_adder(2);
            print add2(3);
        ";
        assert_eq!(run_ok(source), "5\n");
    }

    #[test]
    fn test_closure_shares_mutable_state() {
        let source = "
            func make_counter(): {
                var count = 0;
                func next(): {
                    count = count + 1;
                    return count;
                }
                return next;
            }
            var tick = make_counter();
            tick();
            tick();
            print tick();
        ";
        assert_eq!(run_ok(source), "3\n");
    }

    #[test]
    fn test_return_unwinds_through_blocks_and_loops() {
        let source = "
            func first(): {
                while (true) {
                    { return 1; }
                }
            }
            print first();
        ";
        assert_eq!(run_ok(source), "1\n");
    }

    #[test]
    fn test_return_outside_function_is_an_error() {
        let (_, result) = run("return 1;");
        assert!(result.is_err());
    }

    #[test]
    fn test_indexing() {
        assert_eq!(run_ok("print [1, 2, 3][1];"), "2\n");
        assert_eq!(run_ok("print \"abc\"[2];"), "c\n");

        assert_eq!(
            run_err("print [1, 2, 3][5];").kind,
            RuntimeErrorKind::IndexOutOfBounds
        );
        assert_eq!(
            run_err("print [1][0 - 1];").kind,
            RuntimeErrorKind::IndexOutOfBounds
        );
        assert_eq!(run_err("print [1][0.5];").kind, RuntimeErrorKind::Type);
        assert_eq!(run_err("print 5[0];").kind, RuntimeErrorKind::Type);
    }

    #[test]
    fn test_index_assignment() {
        assert_eq!(run_ok("var l = [1, 2]; l[0] = 9; print l;"), "[9, 2]\n");
        assert_eq!(run_err("var s = \"ab\"; s[0] = \"c\";").kind, RuntimeErrorKind::Type);
        assert_eq!(
            run_err("var l = [1]; l[3] = 0;").kind,
            RuntimeErrorKind::IndexOutOfBounds
        );
    }

    #[test]
    fn test_lists_are_reference_types() {
        let source = "
            var a = [1];
            var b = a;
            b.add(2);
            print len(a);
            print a == b;
        ";
        assert_eq!(run_ok(source), "2\ntrue\n");
    }

    #[test]
    fn test_self_referential_lists() {
        // Rendering a list that contains itself terminates with an
        // elided tail instead of recursing until the stack overflows.
        let output = run_ok("var l = [1]; l.add(l); print l;");
        assert!(output.contains("[...]"), "unexpected rendering: {output}");

        // An aliased cycle is equal to itself.
        assert_eq!(run_ok("var l = [1]; l.add(l); print l == l;"), "true\n");

        // Two separately built cycles are only equal through aliasing.
        assert_eq!(
            run_ok("var a = []; a.add(a); var b = []; b.add(b); print a == b;"),
            "false\n"
        );
    }

    #[test]
    fn test_undefined_variable_errors() {
        assert_eq!(run_err("print ghost;").kind, RuntimeErrorKind::UndefinedVariable);
        assert_eq!(run_err("ghost = 1;").kind, RuntimeErrorKind::UndefinedVariable);
    }

    #[test]
    fn test_calling_a_non_callable_is_a_type_error() {
        assert_eq!(run_err("var x = 1; x();").kind, RuntimeErrorKind::Type);
    }

    #[test]
    fn test_error_keeps_earlier_side_effects() {
        let (interpreter, result) = run("print \"before\"; print 1 / 0; print \"after\";");
        assert!(result.is_err());
        assert_eq!(interpreter.captured_output(), Some("before\n"));
    }

    #[test]
    fn test_value_display_and_debug() {
        assert_eq!(Value::Number(42.0).to_string(), "42");
        assert_eq!(Value::String("hi".to_string()).to_string(), "hi");
        assert_eq!(format!("{:?}", Value::String("hi".to_string())), "\"hi\"");
        assert_eq!(
            Value::list(vec![Value::Number(1.0), Value::String("a".to_string())]).to_string(),
            "[1, \"a\"]"
        );
        assert_eq!(Value::Void.to_string(), "void");
    }
}
