//! HCOM algebraic expression lexer, AST, parser, and evaluator.
//!
//! Names may contain `.`, `#`, `@`, `:` and `"quoted"` segments so that
//! `Mass.P1.x@2` or `"My mass".P1.v` lex as one token.  Values are scalars or
//! stored vectors; vector arithmetic goes through the
//! [`LogDataStore`](crate::host::LogDataStore) so results carry proper names
//! and time axes.
//!
//! Operator precedence (lowest → highest):
//!   or  →  and  →  relational  →  additive  →  multiplicative  →  unary  →
//!   power  →  primary

use crate::host::numeric;
use crate::host::{LogDataStore, OptimizationBridge, VectorRef};

use super::text::split_respecting;
use super::value::{ScriptValue, ValueKind};

/// Default tolerance for `==` against vectors.
pub const EQUALITY_TOLERANCE: f64 = 1e-3;

// ── EvalContext ───────────────────────────────────────────────────────────────

/// Dependency-injection interface used by the expression evaluator and by
/// functionoids.
///
/// [`InterpreterSession`](super::interp::InterpreterSession) implements this
/// trait; functionoids receive it at call time and may re-enter the
/// evaluator through [`evaluate`](Self::evaluate).
pub trait EvalContext {
    /// Full evaluation of `text`, as the dispatcher would do it.
    fn evaluate(&mut self, text: &str, desired: Option<ValueKind>) -> ScriptValue;

    /// Resolve a bare name appearing inside an expression.
    fn resolve_name(&mut self, name: &str) -> ScriptValue;

    /// Call forms and functionoids.  `None` when `name` is neither, so the
    /// evaluator falls back to the scalar math functions.
    fn call_function(&mut self, name: &str, raw_args: &str, argc: usize) -> Option<ScriptValue>;

    /// Resolve a name to a stored vector.
    fn lookup_vector(&mut self, name: &str) -> Option<VectorRef>;

    fn store(&self) -> &dyn LogDataStore;

    fn optimizer(&self) -> &dyn OptimizationBridge;

    fn last_simulation_time(&self) -> Option<f64>;

    /// Uniform sample in `[0, 1)`.
    fn random(&mut self) -> f64;

    fn report_warning(&mut self, message: &str);

    fn report_error(&mut self, message: &str);
}

// ── Token ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Name(String),

    Plus,
    Minus,
    Star,
    Slash,
    Caret,

    Eq, // ==
    Ne, // !=
    Lt,
    Le,
    Gt,
    Ge,

    And, // &&
    Or,  // ||

    Comma,
    LParen,
    RParen,
    Unknown(char),
    Eof,
}

// ── Lexer ─────────────────────────────────────────────────────────────────────

struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Lexer {
            src: src.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<u8> {
        self.src.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.src.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn eat(&mut self, ch: u8) -> bool {
        if self.peek() == Some(ch) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t')) {
            self.pos += 1;
        }
    }

    fn take_digits(&mut self) {
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
    }

    fn read_number(&mut self, start: usize) -> Token {
        self.take_digits();
        if self.peek() == Some(b'.') {
            self.pos += 1;
            self.take_digits();
        }
        if matches!(self.peek(), Some(b'e' | b'E'))
            && (matches!(self.peek2(), Some(b'0'..=b'9'))
                || (matches!(self.peek2(), Some(b'+' | b'-'))
                    && matches!(self.src.get(self.pos + 2), Some(b'0'..=b'9'))))
        {
            self.pos += 2;
            self.take_digits();
        }
        let text = String::from_utf8_lossy(&self.src[start..self.pos]);
        match text.parse() {
            Ok(v) => Token::Number(v),
            Err(_) => Token::Unknown('.'),
        }
    }

    fn read_name(&mut self, start: usize) -> Token {
        loop {
            match self.peek() {
                Some(b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'.' | b'#' | b'@' | b':') => {
                    self.pos += 1;
                }
                Some(b'"') => {
                    self.pos += 1;
                    while !matches!(self.advance(), None | Some(b'"')) {}
                }
                _ => break,
            }
        }
        Token::Name(String::from_utf8_lossy(&self.src[start..self.pos]).into_owned())
    }

    fn next_token(&mut self) -> (Token, usize) {
        self.skip_ws();
        let start = self.pos;
        let ch = match self.advance() {
            None => return (Token::Eof, start),
            Some(c) => c,
        };

        let tok = match ch {
            b'0'..=b'9' => self.read_number(start),
            b'.' if matches!(self.peek(), Some(b'0'..=b'9')) => self.read_number(start),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'"' => {
                if ch == b'"' {
                    while !matches!(self.advance(), None | Some(b'"')) {}
                }
                self.read_name(start)
            }
            b'+' => Token::Plus,
            b'-' => Token::Minus,
            b'*' => Token::Star,
            b'/' => Token::Slash,
            b'^' => Token::Caret,
            b',' => Token::Comma,
            b'(' => Token::LParen,
            b')' => Token::RParen,
            b'<' => {
                if self.eat(b'=') {
                    Token::Le
                } else {
                    Token::Lt
                }
            }
            b'>' => {
                if self.eat(b'=') {
                    Token::Ge
                } else {
                    Token::Gt
                }
            }
            b'=' if self.eat(b'=') => Token::Eq,
            b'!' if self.eat(b'=') => Token::Ne,
            b'&' if self.eat(b'&') => Token::And,
            b'|' if self.eat(b'|') => Token::Or,
            other => Token::Unknown(other as char),
        };
        (tok, start)
    }

    fn tokenize(mut self) -> Vec<(Token, usize)> {
        let mut tokens = Vec::new();
        loop {
            let (tok, at) = self.next_token();
            let done = tok == Token::Eof;
            tokens.push((tok, at));
            if done {
                break;
            }
        }
        tokens
    }
}

// ── AST ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Name(String),
    /// `name(raw_args)`.  `args` is `None` when an argument is not itself an
    /// algebraic expression (functionoids still receive `raw_args`).
    Call {
        name: String,
        raw_args: String,
        args: Option<Vec<Expr>>,
    },
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

// ── Parser ────────────────────────────────────────────────────────────────────

struct Parser<'s> {
    src: &'s str,
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl<'s> Parser<'s> {
    fn new(src: &'s str) -> Self {
        Parser {
            src,
            tokens: Lexer::new(src).tokenize(),
            pos: 0,
        }
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).map_or(&Token::Eof, |(t, _)| t)
    }

    fn offset(&self, index: usize) -> usize {
        self.tokens.get(index).map_or(self.src.len(), |(_, at)| *at)
    }

    fn advance(&mut self) -> Token {
        let t = self
            .tokens
            .get(self.pos)
            .map_or(Token::Eof, |(t, _)| t.clone());
        self.pos += 1;
        t
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == expected {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    // ── Grammar ───────────────────────────────────────────────────────────────

    fn parse_expr(&mut self) -> Result<Expr, String> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::Or) {
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_relational()?;
        while self.eat(&Token::And) {
            let rhs = self.parse_relational()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinOp::Lt,
                Token::Le => BinOp::Le,
                Token::Gt => BinOp::Gt,
                Token::Ge => BinOp::Ge,
                Token::Eq => BinOp::Eq,
                Token::Ne => BinOp::Ne,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        match self.peek() {
            Token::Minus => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.parse_unary()?)))
            }
            Token::Plus => {
                self.pos += 1;
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    /// `^` is right-associative and binds tighter than unary minus.
    fn parse_power(&mut self) -> Result<Expr, String> {
        let base = self.parse_primary()?;
        if self.eat(&Token::Caret) {
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.advance() {
            Token::Number(v) => Ok(Expr::Number(v)),
            Token::Name(name) => {
                if self.peek() == &Token::LParen {
                    self.parse_call(name)
                } else {
                    Ok(Expr::Name(name))
                }
            }
            Token::LParen => {
                let inner = self.parse_expr()?;
                if !self.eat(&Token::RParen) {
                    return Err("expected ')'".into());
                }
                Ok(inner)
            }
            other => Err(format!("unexpected token {other:?}")),
        }
    }

    /// Called with the `(` as the next token.
    fn parse_call(&mut self, name: String) -> Result<Expr, String> {
        let open = self.pos;
        let mut depth = 0usize;
        let mut close = None;
        for (i, (tok, _)) in self.tokens.iter().enumerate().skip(open) {
            match tok {
                Token::LParen => depth += 1,
                Token::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(i);
                        break;
                    }
                }
                _ => {}
            }
        }
        let close = close.ok_or_else(|| format!("expected ')' after args to {name}"))?;
        let raw_args = self.src[self.offset(open) + 1..self.offset(close)].trim().to_owned();
        self.pos = close + 1;
        let args = split_respecting(&raw_args, ',')
            .iter()
            .map(|a| parse_expr(a))
            .collect::<Result<Vec<_>, _>>()
            .ok();
        Ok(Expr::Call {
            name,
            raw_args,
            args,
        })
    }
}

/// Parse an HCOM expression string into an AST.
pub fn parse_expr(src: &str) -> Result<Expr, String> {
    let mut parser = Parser::new(src);
    let expr = parser.parse_expr()?;
    match parser.peek() {
        Token::Eof => Ok(expr),
        other => Err(format!("unexpected token {other:?}")),
    }
}

// ── Scalar math functions ─────────────────────────────────────────────────────

/// Arity of a standard math function, `None` if `name` is not one.
pub fn math_arity(name: &str) -> Option<usize> {
    match name {
        "sin" | "cos" | "tan" | "asin" | "acos" | "atan" | "sqrt" | "exp" | "log" | "log10"
        | "floor" | "ceil" | "round" | "sign" => Some(1),
        "min" | "max" | "mod" | "rem" | "pow" => Some(2),
        _ => None,
    }
}

pub fn call_math(name: &str, args: &[f64]) -> Option<f64> {
    if math_arity(name) != Some(args.len()) {
        return None;
    }
    let x = args[0];
    Some(match name {
        "sin" => x.sin(),
        "cos" => x.cos(),
        "tan" => x.tan(),
        "asin" => x.asin(),
        "acos" => x.acos(),
        "atan" => x.atan(),
        "sqrt" => x.sqrt(),
        "exp" => x.exp(),
        "log" => x.ln(),
        "log10" => x.log10(),
        "floor" => x.floor(),
        "ceil" => x.ceil(),
        "round" => x.round(),
        "sign" => {
            if x > 0.0 {
                1.0
            } else if x < 0.0 {
                -1.0
            } else {
                0.0
            }
        }
        "min" => x.min(args[1]),
        "max" => x.max(args[1]),
        "mod" => x - args[1] * (x / args[1]).floor(),
        "rem" => x % args[1],
        "pow" => x.powf(args[1]),
        _ => return None,
    })
}

// ── Evaluator ─────────────────────────────────────────────────────────────────

/// Evaluate an [`Expr`] AST node against the given context.
///
/// Unresolvable names and unknown functions give `Wildcard`; operations
/// that are not defined for the operand kinds give `Undefined`.
pub fn eval_expr(expr: &Expr, ctx: &mut dyn EvalContext) -> ScriptValue {
    match expr {
        Expr::Number(v) => ScriptValue::Scalar(*v),

        Expr::Name(name) => ctx.resolve_name(name),

        Expr::Call {
            name,
            raw_args,
            args,
        } => {
            let argc = args.as_ref().map_or_else(
                || split_respecting(raw_args, ',').len(),
                |a| a.len(),
            );
            if let Some(v) = ctx.call_function(name, raw_args, argc) {
                return v;
            }
            let Some(args) = args else {
                return ScriptValue::Wildcard(format!("{name}({raw_args})"));
            };
            let mut values = Vec::with_capacity(args.len());
            for a in args {
                match eval_expr(a, ctx) {
                    ScriptValue::Scalar(x) => values.push(x),
                    _ => return ScriptValue::Wildcard(format!("{name}({raw_args})")),
                }
            }
            match call_math(name, &values) {
                Some(v) => ScriptValue::Scalar(v),
                None => ScriptValue::Wildcard(format!("{name}({raw_args})")),
            }
        }

        Expr::Neg(inner) => match eval_expr(inner, ctx) {
            ScriptValue::Scalar(x) => ScriptValue::Scalar(-x),
            ScriptValue::Vector(v) => ScriptValue::Vector(ctx.store().mul_scalar(&v, -1.0)),
            other => other,
        },

        Expr::Binary(op @ (BinOp::And | BinOp::Or), lhs, rhs) => {
            let l = match eval_expr(lhs, ctx) {
                ScriptValue::Scalar(x) => x > 0.0,
                ScriptValue::Vector(_) => return ScriptValue::Undefined,
                other => return other,
            };
            if (*op == BinOp::And && !l) || (*op == BinOp::Or && l) {
                return flag(l);
            }
            match eval_expr(rhs, ctx) {
                ScriptValue::Scalar(x) => flag(x > 0.0),
                ScriptValue::Vector(_) => ScriptValue::Undefined,
                other => other,
            }
        }

        Expr::Binary(op, lhs, rhs) => {
            let l = eval_expr(lhs, ctx);
            if !l.is_ok() {
                return l;
            }
            let r = eval_expr(rhs, ctx);
            if !r.is_ok() {
                return r;
            }
            combine(*op, l, r, ctx)
        }
    }
}

fn flag(b: bool) -> ScriptValue {
    ScriptValue::Scalar(if b { 1.0 } else { 0.0 })
}

fn checked(result: Result<VectorRef, String>, ctx: &mut dyn EvalContext) -> ScriptValue {
    match result {
        Ok(v) => ScriptValue::Vector(v),
        Err(msg) => {
            ctx.report_error(&msg);
            ScriptValue::Undefined
        }
    }
}

/// Scalar/vector combination rules for a binary operator.
fn combine(op: BinOp, l: ScriptValue, r: ScriptValue, ctx: &mut dyn EvalContext) -> ScriptValue {
    use ScriptValue::{Scalar as S, Undefined, Vector as V};

    match (l, r) {
        (S(a), S(b)) => match op {
            BinOp::Add => S(a + b),
            BinOp::Sub => S(a - b),
            BinOp::Mul => S(a * b),
            BinOp::Div => S(a / b),
            BinOp::Pow => S(a.powf(b)),
            BinOp::Lt => flag(a < b),
            BinOp::Le => flag(a <= b),
            BinOp::Gt => flag(a > b),
            BinOp::Ge => flag(a >= b),
            BinOp::Eq => flag(a == b),
            BinOp::Ne => flag(a != b),
            BinOp::And | BinOp::Or => Undefined,
        },

        (V(v), S(x)) => {
            let store = ctx.store();
            match op {
                BinOp::Add => V(store.add_scalar(&v, x)),
                BinOp::Sub => V(store.apply_scalar(&v, &format!("-{x}"), &|e| e - x)),
                BinOp::Mul => V(store.mul_scalar(&v, x)),
                BinOp::Div => V(store.div_scalar(&v, x)),
                BinOp::Pow if x == 2.0 => checked(store.mul(&v, &v), ctx),
                BinOp::Gt => V(store.greater_than(&v, x)),
                BinOp::Lt => V(store.less_than(&v, x)),
                BinOp::Eq => V(store.equal_to(&v, x, EQUALITY_TOLERANCE)),
                _ => Undefined,
            }
        }

        (S(x), V(v)) => {
            let store = ctx.store();
            match op {
                BinOp::Add => V(store.add_scalar(&v, x)),
                BinOp::Sub => V(store.apply_scalar(&v, &format!("*-1+{x}"), &|e| x - e)),
                BinOp::Mul => V(store.mul_scalar(&v, x)),
                // x > v  ⇔  v < x
                BinOp::Gt => V(store.less_than(&v, x)),
                BinOp::Lt => V(store.greater_than(&v, x)),
                BinOp::Eq => V(store.equal_to(&v, x, EQUALITY_TOLERANCE)),
                _ => Undefined,
            }
        }

        (V(a), V(b)) => {
            let result = {
                let store = ctx.store();
                match op {
                    BinOp::Add => store.add(&a, &b),
                    BinOp::Sub => store.sub(&a, &b),
                    BinOp::Mul => store.mul(&a, &b),
                    BinOp::Div => store.div(&a, &b),
                    BinOp::Gt => store.greater_than_each(&a, &b),
                    BinOp::Lt => store.less_than_each(&a, &b),
                    BinOp::Eq => store.equal_each(&a, &b, EQUALITY_TOLERANCE),
                    _ => return Undefined,
                }
            };
            checked(result, ctx)
        }

        _ => Undefined,
    }
}

/// Parse and evaluate; a parse failure gives `Wildcard(src)`.
pub fn eval_str(src: &str, ctx: &mut dyn EvalContext) -> ScriptValue {
    match parse_expr(src) {
        Ok(expr) => eval_expr(&expr, ctx),
        Err(_) => ScriptValue::Wildcard(src.to_owned()),
    }
}

/// Fuzzy scalar comparison exposed for `fc`.
pub fn scalars_close(a: f64, b: f64, tolerance: f64) -> bool {
    numeric::fuzzy_equal(a, b, tolerance)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
