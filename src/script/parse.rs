//! Tokenizer and recursive descent parser for script source.

use serde_json::Value;

use super::ScriptError;
use super::ast::{BinaryOp, Expr, Program, Stmt, UnaryOp};

/// Parse script source into a [`Program`].
///
/// # Errors
///
/// Returns [`ScriptError::Syntax`] with the offending line number.
pub fn parse(source: &str) -> Result<Program, ScriptError> {
    let tokens = tokenize(source)?;
    Parser { tokens, pos: 0, nesting: 0 }.program()
}

// =============================================================================
// TOKENS
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Number(Value),
    Str(String),
    Punct(&'static str),
    /// Statement separator: `;` or a newline outside brackets.
    Sep,
    Eof,
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    line: usize,
}

const PUNCT2: &[&str] = &["==", "!=", "<=", ">=", "&&", "||"];
const PUNCT1: &[&str] = &[".", ",", "(", ")", "[", "]", "{", "}", ":", "=", "<", ">", "+", "-", "*", "/", "!"];

fn tokenize(source: &str) -> Result<Vec<Token>, ScriptError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut depth: usize = 0;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\n' {
            if depth == 0 {
                tokens.push(Token { tok: Tok::Sep, line });
            }
            line += 1;
            i += 1;
            continue;
        }
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        // Line comment.
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if c == ';' {
            tokens.push(Token { tok: Tok::Sep, line });
            i += 1;
            continue;
        }
        if c == '"' || c == '\'' {
            let (text, next) = lex_string(&chars, i, line)?;
            tokens.push(Token { tok: Tok::Str(text), line });
            i = next;
            continue;
        }
        if c.is_ascii_digit() {
            let (value, next) = lex_number(&chars, i, line)?;
            tokens.push(Token { tok: Tok::Number(value), line });
            i = next;
            continue;
        }
        if c.is_alphabetic() || c == '_' || c == '$' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$') {
                i += 1;
            }
            let ident: String = chars[start..i].iter().collect();
            tokens.push(Token { tok: Tok::Ident(ident), line });
            continue;
        }

        let pair: String = chars[i..(i + 2).min(chars.len())].iter().collect();
        if let Some(&p) = PUNCT2.iter().find(|p| **p == pair) {
            tokens.push(Token { tok: Tok::Punct(p), line });
            i += 2;
            continue;
        }
        let single = c.to_string();
        let Some(&p) = PUNCT1.iter().find(|p| **p == single) else {
            return Err(syntax(line, format!("unexpected character `{c}`")));
        };
        match p {
            "(" | "[" | "{" => depth += 1,
            ")" | "]" | "}" => depth = depth.saturating_sub(1),
            _ => {}
        }
        tokens.push(Token { tok: Tok::Punct(p), line });
        i += 1;
    }

    tokens.push(Token { tok: Tok::Eof, line });
    Ok(tokens)
}

fn lex_string(chars: &[char], start: usize, line: usize) -> Result<(String, usize), ScriptError> {
    let quote = chars[start];
    let mut out = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        let c = chars[i];
        if c == quote {
            return Ok((out, i + 1));
        }
        if c == '\n' {
            break;
        }
        if c == '\\' {
            i += 1;
            let Some(&escaped) = chars.get(i) else { break };
            out.push(match escaped {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                '0' => '\0',
                other => other,
            });
        } else {
            out.push(c);
        }
        i += 1;
    }

    Err(syntax(line, "unterminated string"))
}

fn lex_number(chars: &[char], start: usize, line: usize) -> Result<(Value, usize), ScriptError> {
    let mut i = start;
    let mut integral = true;

    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    if i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit() {
        integral = false;
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
    }
    if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
        integral = false;
        i += 1;
        if i < chars.len() && (chars[i] == '+' || chars[i] == '-') {
            i += 1;
        }
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
    }

    let text: String = chars[start..i].iter().collect();
    if integral {
        if let Ok(n) = text.parse::<i64>() {
            return Ok((Value::from(n), i));
        }
    }
    text.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(|n| (Value::Number(n), i))
        .ok_or_else(|| syntax(line, format!("invalid number `{text}`")))
}

fn syntax(line: usize, message: impl Into<String>) -> ScriptError {
    ScriptError::Syntax { line, message: message.into() }
}

// =============================================================================
// PARSER
// =============================================================================

/// Deepest expression tree the parser accepts. Bracket nesting, prefix
/// operators and operator chains all count, so evaluating or dropping an
/// accepted tree never recurses further than this.
pub const MAX_DEPTH: usize = 128;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Recursive descents currently open.
    nesting: usize,
}

/// An expression and the height of its tree.
struct Node {
    expr: Expr,
    depth: usize,
}

impl Node {
    fn leaf(expr: Expr) -> Self {
        Self { expr, depth: 1 }
    }
}

impl Parser {
    fn program(mut self) -> Result<Program, ScriptError> {
        let mut statements = Vec::new();

        loop {
            while self.peek() == &Tok::Sep {
                self.pos += 1;
            }
            if self.peek() == &Tok::Eof {
                break;
            }
            statements.push(self.statement()?);
            match self.peek() {
                Tok::Sep | Tok::Eof => {}
                other => return Err(self.error(format!("expected end of statement, found {}", describe(other)))),
            }
        }

        Ok(Program { statements })
    }

    fn statement(&mut self) -> Result<Stmt, ScriptError> {
        if self.peek() == &Tok::Ident("let".to_owned()) {
            if let Some(Tok::Ident(name)) = self.tokens.get(self.pos + 1).map(|t| t.tok.clone()) {
                self.pos += 2;
                self.expect("=")?;
                let value = self.expr()?.expr;
                return Ok(Stmt::Let { name, value });
            }
        }

        let expr = self.expr()?.expr;
        if self.eat("=") {
            let Some(target) = expr.into_place() else {
                return Err(self.error("invalid assignment target"));
            };
            let value = self.expr()?.expr;
            return Ok(Stmt::Assign { target, value });
        }
        Ok(Stmt::Expr(expr))
    }

    fn expr(&mut self) -> Result<Node, ScriptError> {
        self.or()
    }

    fn or(&mut self) -> Result<Node, ScriptError> {
        let mut left = self.and()?;
        while self.eat("||") {
            let right = self.and()?;
            left = self.binary(BinaryOp::Or, left, right)?;
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Node, ScriptError> {
        let mut left = self.equality()?;
        while self.eat("&&") {
            let right = self.equality()?;
            left = self.binary(BinaryOp::And, left, right)?;
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Node, ScriptError> {
        let mut left = self.comparison()?;
        loop {
            let op = if self.eat("==") {
                BinaryOp::Eq
            } else if self.eat("!=") {
                BinaryOp::Ne
            } else {
                return Ok(left);
            };
            let right = self.comparison()?;
            left = self.binary(op, left, right)?;
        }
    }

    fn comparison(&mut self) -> Result<Node, ScriptError> {
        let mut left = self.additive()?;
        loop {
            let op = if self.eat("<=") {
                BinaryOp::Le
            } else if self.eat(">=") {
                BinaryOp::Ge
            } else if self.eat("<") {
                BinaryOp::Lt
            } else if self.eat(">") {
                BinaryOp::Gt
            } else {
                return Ok(left);
            };
            let right = self.additive()?;
            left = self.binary(op, left, right)?;
        }
    }

    fn additive(&mut self) -> Result<Node, ScriptError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = if self.eat("+") {
                BinaryOp::Add
            } else if self.eat("-") {
                BinaryOp::Sub
            } else {
                return Ok(left);
            };
            let right = self.multiplicative()?;
            left = self.binary(op, left, right)?;
        }
    }

    fn multiplicative(&mut self) -> Result<Node, ScriptError> {
        let mut left = self.unary()?;
        loop {
            let op = if self.eat("*") {
                BinaryOp::Mul
            } else if self.eat("/") {
                BinaryOp::Div
            } else {
                return Ok(left);
            };
            let right = self.unary()?;
            left = self.binary(op, left, right)?;
        }
    }

    fn unary(&mut self) -> Result<Node, ScriptError> {
        let op = if self.eat("-") {
            UnaryOp::Neg
        } else if self.eat("!") {
            UnaryOp::Not
        } else {
            return self.postfix();
        };
        let operand = self.nested(Self::unary)?;
        self.node(Expr::Unary { op, expr: Box::new(operand.expr) }, operand.depth + 1)
    }

    fn postfix(&mut self) -> Result<Node, ScriptError> {
        let mut node = self.primary()?;
        loop {
            if self.eat(".") {
                let name = self.ident()?;
                node = self.node(Expr::Field(Box::new(node.expr), name), node.depth + 1)?;
            } else if self.eat("[") {
                let key = self.nested(Self::expr)?;
                self.expect("]")?;
                let depth = node.depth.max(key.depth) + 1;
                node = self.node(Expr::Index(Box::new(node.expr), Box::new(key.expr)), depth)?;
            } else {
                return Ok(node);
            }
        }
    }

    fn primary(&mut self) -> Result<Node, ScriptError> {
        let tok = self.peek().clone();
        match tok {
            Tok::Number(value) => {
                self.pos += 1;
                Ok(Node::leaf(Expr::Literal(value)))
            }
            Tok::Str(text) => {
                self.pos += 1;
                Ok(Node::leaf(Expr::Literal(Value::String(text))))
            }
            Tok::Ident(name) => {
                self.pos += 1;
                match name.as_str() {
                    "true" => return Ok(Node::leaf(Expr::Literal(Value::Bool(true)))),
                    "false" => return Ok(Node::leaf(Expr::Literal(Value::Bool(false)))),
                    "null" | "undefined" => return Ok(Node::leaf(Expr::Literal(Value::Null))),
                    _ => {}
                }
                if self.eat("(") {
                    let (args, depth) = self.nested(|p| p.list(")"))?;
                    return self.node(Expr::Call { name, args }, depth + 1);
                }
                Ok(Node::leaf(Expr::Var(name)))
            }
            Tok::Punct("(") => {
                self.pos += 1;
                let node = self.nested(Self::expr)?;
                self.expect(")")?;
                Ok(node)
            }
            Tok::Punct("[") => {
                self.pos += 1;
                let (items, depth) = self.nested(|p| p.list("]"))?;
                self.node(Expr::Array(items), depth + 1)
            }
            Tok::Punct("{") => {
                self.pos += 1;
                self.nested(Self::object)
            }
            other => Err(self.error(format!("unexpected {}", describe(&other)))),
        }
    }

    /// Comma separated expressions up to `close`; trailing comma allowed.
    /// Returns the items and the deepest item's height.
    fn list(&mut self, close: &'static str) -> Result<(Vec<Expr>, usize), ScriptError> {
        let mut items = Vec::new();
        let mut depth = 0;
        loop {
            if self.eat(close) {
                return Ok((items, depth));
            }
            let item = self.expr()?;
            depth = depth.max(item.depth);
            items.push(item.expr);
            if !self.eat(",") {
                self.expect(close)?;
                return Ok((items, depth));
            }
        }
    }

    fn object(&mut self) -> Result<Node, ScriptError> {
        let mut fields = Vec::new();
        let mut depth = 0;
        loop {
            if self.eat("}") {
                break;
            }
            let key = match self.peek().clone() {
                Tok::Ident(name) => name,
                Tok::Str(text) => text,
                other => return Err(self.error(format!("expected object key, found {}", describe(&other)))),
            };
            self.pos += 1;
            self.expect(":")?;
            let value = self.expr()?;
            depth = depth.max(value.depth);
            fields.push((key, value.expr));
            if !self.eat(",") {
                self.expect("}")?;
                break;
            }
        }
        self.node(Expr::Object(fields), depth + 1)
    }

    /// Run `parse` one level deeper, failing once [`MAX_DEPTH`] levels are open.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T, ScriptError>) -> Result<T, ScriptError> {
        if self.nesting >= MAX_DEPTH {
            return Err(self.too_deep());
        }
        self.nesting += 1;
        let result = parse(self);
        self.nesting -= 1;
        result
    }

    fn node(&self, expr: Expr, depth: usize) -> Result<Node, ScriptError> {
        if depth > MAX_DEPTH {
            return Err(self.too_deep());
        }
        Ok(Node { expr, depth })
    }

    fn binary(&self, op: BinaryOp, left: Node, right: Node) -> Result<Node, ScriptError> {
        let depth = left.depth.max(right.depth) + 1;
        self.node(Expr::Binary { op, left: Box::new(left.expr), right: Box::new(right.expr) }, depth)
    }

    fn too_deep(&self) -> ScriptError {
        self.error("expression nested too deeply")
    }

    fn ident(&mut self) -> Result<String, ScriptError> {
        if let Tok::Ident(name) = self.peek().clone() {
            self.pos += 1;
            return Ok(name);
        }
        Err(self.error(format!("expected identifier, found {}", describe(self.peek()))))
    }

    fn peek(&self) -> &Tok {
        // The token stream always ends with `Eof`, and `pos` never passes it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)].tok
    }

    fn eat(&mut self, punct: &str) -> bool {
        if matches!(self.peek(), Tok::Punct(p) if *p == punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, punct: &str) -> Result<(), ScriptError> {
        if self.eat(punct) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{punct}`, found {}", describe(self.peek()))))
        }
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        let line = self.tokens[self.pos.min(self.tokens.len() - 1)].line;
        syntax(line, message)
    }
}

fn describe(tok: &Tok) -> String {
    match tok {
        Tok::Ident(name) => format!("`{name}`"),
        Tok::Number(value) => format!("number {value}"),
        Tok::Str(_) => "string".to_owned(),
        Tok::Punct(p) => format!("`{p}`"),
        Tok::Sep => "end of statement".to_owned(),
        Tok::Eof => "end of input".to_owned(),
    }
}
