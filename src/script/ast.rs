//! Syntax tree for server-supplied scripts.

use serde_json::Value;

/// A parsed script: statements run top to bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `let name = value`, bound in the current unit.
    Let { name: String, value: Expr },
    /// `target = value`.
    Assign { target: Place, value: Expr },
    Expr(Expr),
}

/// Assignable location: a variable followed by member/index steps.
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub root: String,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Field(String),
    Index(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(String),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Field(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call { name: String, args: Vec<Expr> },
    Unary { op: UnaryOp, expr: Box<Expr> },
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl Expr {
    /// Convert an expression parsed on the left of `=` into a [`Place`].
    ///
    /// Returns `None` when the expression is not a variable or member chain.
    #[must_use]
    pub fn into_place(self) -> Option<Place> {
        match self {
            Expr::Var(root) => Some(Place { root, steps: Vec::new() }),
            Expr::Field(object, name) => {
                let mut place = object.into_place()?;
                place.steps.push(Step::Field(name));
                Some(place)
            }
            Expr::Index(object, key) => {
                let mut place = object.into_place()?;
                place.steps.push(Step::Index(*key));
                Some(place)
            }
            _ => None,
        }
    }
}
