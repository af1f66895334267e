use std::rc::Rc;

use crate::tokenizer::Token;

/// Literal payload carried by a `Expr::Literal` node.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    String(String),
    Boolean(bool),
    Void,
}

/// Expression nodes. Built once per parse, read-only during evaluation.
/// Nodes own the operator or name token they were built from so the
/// evaluator can point diagnostics at the right source position.
///
/// Indexed reads and writes are distinct kinds on purpose: the parser
/// rewrites `a[i] = v` from an `Index` into an `IndexSet` when it sees
/// the assignment, and the evaluator never has to guess which optional
/// field is populated.
#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Literal),
    Grouping(Box<Expr>),
    Unary {
        operator: Token,
        right: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },
    Logical {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },
    Variable {
        name: Token,
    },
    Assign {
        name: Token,
        value: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        paren: Token,
        arguments: Vec<Expr>,
    },
    Index {
        object: Box<Expr>,
        bracket: Token,
        index: Box<Expr>,
    },
    IndexSet {
        object: Box<Expr>,
        bracket: Token,
        index: Box<Expr>,
        value: Box<Expr>,
    },
    MethodCall {
        object: Box<Expr>,
        method: Token,
        arguments: Vec<Expr>,
    },
    List {
        bracket: Token,
        elements: Vec<Expr>,
    },
}

/// Statement nodes. A function body is reference-counted so the closure
/// value created at declaration time can share it without cloning the
/// tree.
#[derive(Debug, Clone)]
pub enum Stmt {
    Expression(Expr),
    Print(Expr),
    Var {
        name: Token,
        initializer: Option<Expr>,
    },
    Block(Vec<Stmt>),
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
    },
    Func {
        name: Token,
        params: Vec<Token>,
        body: Rc<Vec<Stmt>>,
    },
    Return {
        keyword: Token,
        value: Option<Expr>,
    },
}
