//! The expression evaluator interface (spec §6.2) and `BuiltinEvaluator`, a
//! reference implementation of the language described in the GLOSSARY.
//!
//! `spec.md` treats the evaluator as an external, pure collaborator:
//! `expr.eval(expression, environment) -> value | error`. Routing code in
//! [`crate::routing`] only ever depends on the [`ExpressionEvaluator`]
//! trait; `BuiltinEvaluator` exists so conditions/transforms are runnable in
//! this crate's own tests without a real embedder wired in.
//!
//! `BuiltinEvaluator` implements arithmetic/comparison/logical/bitwise
//! operators, member access (`.` and `?.`), indexing/slicing, `in` /
//! `contains` / `startsWith` / `endsWith` / `matches`, ternary, and
//! null-coalesce, plus the scalar builtins (`len, abs, ceil, floor, round,
//! sqrt, pow, upper, lower, trim, split, join, type, int, float, string,
//! now`). The collection-processing builtins that take a lambda
//! (`map, filter, all, any, none, one, count, first, last, max, min`) are
//! part of the language surface a production evaluator must support, but
//! `BuiltinEvaluator` only implements the no-lambda, array-argument forms of
//! `first`, `last`, `max`, `min`, and `count` — a full closure-capable
//! implementation is exactly the kind of thing the real embedder supplies.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("evaluation error: {0}")]
    Eval(String),
}

pub type EvalResult = Result<Value, EvalError>;

/// `expr.eval(expression_string, environment) -> value | error` (§6.2).
pub trait ExpressionEvaluator: Send + Sync {
    fn eval(&self, expression: &str, env: &Value) -> EvalResult;
}

/// Reference implementation of the expression language.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinEvaluator;

impl ExpressionEvaluator for BuiltinEvaluator {
    fn eval(&self, expression: &str, env: &Value) -> EvalResult {
        let tokens = lex(expression)?;
        let mut parser = Parser { tokens: &tokens, pos: 0 };
        let ast = parser.parse_expr(0)?;
        if parser.pos != parser.tokens.len() {
            return Err(EvalError::Parse(format!("trailing input at token {}", parser.pos)));
        }
        eval_ast(&ast, env)
    }
}

// ---------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    SafeDot,
}

fn lex(src: &str) -> Result<Vec<Tok>, EvalError> {
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;
    let mut out = Vec::new();
    let multi_ops: &[&str] = &[
        "**", "==", "!=", "<=", ">=", "&&", "||", "??", "?.", "<<", ">>",
    ];

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '(' {
            out.push(Tok::LParen);
            i += 1;
        } else if c == ')' {
            out.push(Tok::RParen);
            i += 1;
        } else if c == '[' {
            out.push(Tok::LBracket);
            i += 1;
        } else if c == ']' {
            out.push(Tok::RBracket);
            i += 1;
        } else if c == '{' {
            out.push(Tok::LBrace);
            i += 1;
        } else if c == '}' {
            out.push(Tok::RBrace);
            i += 1;
        } else if c == ',' {
            out.push(Tok::Comma);
            i += 1;
        } else if c == ':' {
            out.push(Tok::Colon);
            i += 1;
        } else if c == '"' || c == '\'' {
            let quote = c;
            i += 1;
            let mut s = String::new();
            while i < chars.len() && chars[i] != quote {
                if chars[i] == '\\' && i + 1 < chars.len() {
                    i += 1;
                }
                s.push(chars[i]);
                i += 1;
            }
            if i >= chars.len() {
                return Err(EvalError::Parse("unterminated string literal".to_string()));
            }
            i += 1;
            out.push(Tok::Str(s));
        } else if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let n = text.parse::<f64>().map_err(|_| EvalError::Parse(format!("bad number '{text}'")))?;
            out.push(Tok::Num(n));
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            out.push(Tok::Ident(chars[start..i].iter().collect()));
        } else if c == '.' {
            // `?.` handled by multi_ops check when previous char is `?`; bare `.`
            out.push(Tok::Dot);
            i += 1;
        } else {
            let mut matched = None;
            for op in multi_ops {
                if chars[i..].iter().collect::<String>().starts_with(op) {
                    matched = Some(*op);
                    break;
                }
            }
            if let Some(op) = matched {
                if op == "?." {
                    out.push(Tok::SafeDot);
                } else {
                    out.push(Tok::Op(op));
                }
                i += op.len();
            } else {
                let single = ['+', '-', '*', '/', '%', '<', '>', '!', '&', '|', '^', '?'];
                if single.contains(&c) {
                    let op: &'static str = match c {
                        '+' => "+",
                        '-' => "-",
                        '*' => "*",
                        '/' => "/",
                        '%' => "%",
                        '<' => "<",
                        '>' => ">",
                        '!' => "!",
                        '&' => "&",
                        '|' => "|",
                        '^' => "^",
                        '?' => "?",
                        _ => unreachable!(),
                    };
                    out.push(Tok::Op(op));
                    i += 1;
                } else {
                    return Err(EvalError::Parse(format!("unexpected character '{c}'")));
                }
            }
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------
// AST + parser (precedence climbing)
// ---------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Ast {
    Num(f64),
    Str(String),
    Bool(bool),
    Null,
    Ident(String),
    Array(Vec<Ast>),
    Object(Vec<(String, Ast)>),
    Unary(&'static str, Box<Ast>),
    Binary(&'static str, Box<Ast>, Box<Ast>),
    Ternary(Box<Ast>, Box<Ast>, Box<Ast>),
    Member(Box<Ast>, String, bool /* safe */),
    Index(Box<Ast>, Box<Ast>),
    Call(String, Vec<Ast>),
}

struct Parser<'a> {
    tokens: &'a [Tok],
    pos: usize,
}

fn binop_prec(op: &str) -> Option<(u8, u8)> {
    // (left-bp, right-bp); all left-assoc except `**`.
    Some(match op {
        "??" => (1, 2),
        "||" => (2, 3),
        "&&" => (3, 4),
        "|" => (4, 5),
        "^" => (5, 6),
        "&" => (6, 7),
        "==" | "!=" => (7, 8),
        "<" | "<=" | ">" | ">=" | "in" | "contains" | "startsWith" | "endsWith" | "matches" => (8, 9),
        "<<" | ">>" => (9, 10),
        "+" | "-" => (10, 11),
        "*" | "/" | "%" => (11, 12),
        "**" => (13, 12), // right-assoc
        _ => return None,
    })
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Tok> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect(&mut self, tok: &Tok) -> Result<(), EvalError> {
        match self.bump() {
            Some(t) if &t == tok => Ok(()),
            other => Err(EvalError::Parse(format!("expected {tok:?}, got {other:?}"))),
        }
    }

    fn parse_expr(&mut self, min_bp: u8) -> Result<Ast, EvalError> {
        let mut lhs = self.parse_unary()?;

        loop {
            let op = match self.peek() {
                Some(Tok::Op(o)) => Some(*o),
                Some(Tok::Ident(kw)) if matches!(kw.as_str(), "in" | "contains" | "startsWith" | "endsWith" | "matches") => {
                    Some(Box::leak(kw.clone().into_boxed_str()) as &str)
                }
                _ => None,
            };

            if let Some(op) = op {
                if op == "?" {
                    if min_bp > 0 {
                        break;
                    }
                    self.bump();
                    let then_branch = self.parse_expr(0)?;
                    self.expect(&Tok::Colon)?;
                    let else_branch = self.parse_expr(0)?;
                    lhs = Ast::Ternary(Box::new(lhs), Box::new(then_branch), Box::new(else_branch));
                    continue;
                }
                if op == "!" {
                    break;
                }
                let Some((lbp, rbp)) = binop_prec(op) else { break };
                if lbp < min_bp {
                    break;
                }
                self.bump();
                let rhs = self.parse_expr(rbp)?;
                lhs = Ast::Binary(op, Box::new(lhs), Box::new(rhs));
                continue;
            }
            break;
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Ast, EvalError> {
        match self.peek() {
            Some(Tok::Op("!")) => {
                self.bump();
                Ok(Ast::Unary("!", Box::new(self.parse_unary()?)))
            }
            Some(Tok::Op("-")) => {
                self.bump();
                Ok(Ast::Unary("-", Box::new(self.parse_unary()?)))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Ast, EvalError> {
        let mut node = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Tok::Dot) => {
                    self.bump();
                    let name = match self.bump() {
                        Some(Tok::Ident(n)) => n,
                        other => return Err(EvalError::Parse(format!("expected identifier after '.', got {other:?}"))),
                    };
                    node = Ast::Member(Box::new(node), name, false);
                }
                Some(Tok::SafeDot) => {
                    self.bump();
                    let name = match self.bump() {
                        Some(Tok::Ident(n)) => n,
                        other => return Err(EvalError::Parse(format!("expected identifier after '?.', got {other:?}"))),
                    };
                    node = Ast::Member(Box::new(node), name, true);
                }
                Some(Tok::LBracket) => {
                    self.bump();
                    let idx = self.parse_expr(0)?;
                    self.expect(&Tok::RBracket)?;
                    node = Ast::Index(Box::new(node), Box::new(idx));
                }
                _ => break,
            }
        }
        Ok(node)
    }

    fn parse_primary(&mut self) -> Result<Ast, EvalError> {
        match self.bump() {
            Some(Tok::Num(n)) => Ok(Ast::Num(n)),
            Some(Tok::Str(s)) => Ok(Ast::Str(s)),
            Some(Tok::Ident(id)) => match id.as_str() {
                "true" => Ok(Ast::Bool(true)),
                "false" => Ok(Ast::Bool(false)),
                "null" => Ok(Ast::Null),
                _ => {
                    if self.peek() == Some(&Tok::LParen) {
                        self.bump();
                        let mut args = Vec::new();
                        if self.peek() != Some(&Tok::RParen) {
                            loop {
                                args.push(self.parse_expr(0)?);
                                if self.peek() == Some(&Tok::Comma) {
                                    self.bump();
                                } else {
                                    break;
                                }
                            }
                        }
                        self.expect(&Tok::RParen)?;
                        Ok(Ast::Call(id, args))
                    } else {
                        Ok(Ast::Ident(id))
                    }
                }
            },
            Some(Tok::LParen) => {
                let e = self.parse_expr(0)?;
                self.expect(&Tok::RParen)?;
                Ok(e)
            }
            Some(Tok::LBracket) => {
                let mut items = Vec::new();
                if self.peek() != Some(&Tok::RBracket) {
                    loop {
                        items.push(self.parse_expr(0)?);
                        if self.peek() == Some(&Tok::Comma) {
                            self.bump();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(&Tok::RBracket)?;
                Ok(Ast::Array(items))
            }
            Some(Tok::LBrace) => {
                let mut fields = Vec::new();
                if self.peek() != Some(&Tok::RBrace) {
                    loop {
                        let key = match self.bump() {
                            Some(Tok::Ident(k)) => k,
                            Some(Tok::Str(k)) => k,
                            other => return Err(EvalError::Parse(format!("expected object key, got {other:?}"))),
                        };
                        self.expect(&Tok::Colon)?;
                        let val = self.parse_expr(0)?;
                        fields.push((key, val));
                        if self.peek() == Some(&Tok::Comma) {
                            self.bump();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(&Tok::RBrace)?;
                Ok(Ast::Object(fields))
            }
            other => Err(EvalError::Parse(format!("unexpected token {other:?}"))),
        }
    }
}

// ---------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------

fn eval_ast(ast: &Ast, env: &Value) -> EvalResult {
    match ast {
        Ast::Num(n) => Ok(serde_json::json!(n)),
        Ast::Str(s) => Ok(Value::String(s.clone())),
        Ast::Bool(b) => Ok(Value::Bool(*b)),
        Ast::Null => Ok(Value::Null),
        Ast::Ident(name) => Ok(env.get(name).cloned().unwrap_or(Value::Null)),
        Ast::Array(items) => {
            let vals: Result<Vec<Value>, EvalError> = items.iter().map(|i| eval_ast(i, env)).collect();
            Ok(Value::Array(vals?))
        }
        Ast::Object(fields) => {
            let mut map = Map::new();
            for (k, v) in fields {
                map.insert(k.clone(), eval_ast(v, env)?);
            }
            Ok(Value::Object(map))
        }
        Ast::Unary(op, inner) => {
            let v = eval_ast(inner, env)?;
            match *op {
                "!" => Ok(Value::Bool(!truthy(&v))),
                "-" => Ok(serde_json::json!(-as_f64(&v)?)),
                _ => unreachable!(),
            }
        }
        Ast::Member(base, name, safe) => {
            let b = eval_ast(base, env)?;
            if b.is_null() && *safe {
                return Ok(Value::Null);
            }
            Ok(b.get(name).cloned().unwrap_or(Value::Null))
        }
        Ast::Index(base, idx) => {
            let b = eval_ast(base, env)?;
            let i = eval_ast(idx, env)?;
            match (&b, &i) {
                (Value::Array(arr), Value::Number(n)) => {
                    let idx = n.as_i64().unwrap_or(0);
                    let len = arr.len() as i64;
                    let real = if idx < 0 { len + idx } else { idx };
                    Ok(arr.get(real as usize).cloned().unwrap_or(Value::Null))
                }
                (Value::Object(_), Value::String(key)) => Ok(b.get(key).cloned().unwrap_or(Value::Null)),
                _ => Ok(Value::Null),
            }
        }
        Ast::Ternary(cond, then_b, else_b) => {
            if truthy(&eval_ast(cond, env)?) {
                eval_ast(then_b, env)
            } else {
                eval_ast(else_b, env)
            }
        }
        Ast::Call(name, args) => eval_call(name, args, env),
        Ast::Binary(op, lhs, rhs) => eval_binary(op, lhs, rhs, env),
    }
}

fn eval_binary(op: &str, lhs: &Ast, rhs: &Ast, env: &Value) -> EvalResult {
    if op == "&&" {
        let l = eval_ast(lhs, env)?;
        return if !truthy(&l) { Ok(Value::Bool(false)) } else { Ok(Value::Bool(truthy(&eval_ast(rhs, env)?))) };
    }
    if op == "||" {
        let l = eval_ast(lhs, env)?;
        return if truthy(&l) { Ok(Value::Bool(true)) } else { Ok(Value::Bool(truthy(&eval_ast(rhs, env)?))) };
    }
    if op == "??" {
        let l = eval_ast(lhs, env)?;
        return if l.is_null() { eval_ast(rhs, env) } else { Ok(l) };
    }

    let l = eval_ast(lhs, env)?;
    let r = eval_ast(rhs, env)?;

    match op {
        "==" => Ok(Value::Bool(l == r)),
        "!=" => Ok(Value::Bool(l != r)),
        "<" | "<=" | ">" | ">=" => {
            let cmp = compare(&l, &r)?;
            Ok(Value::Bool(match op {
                "<" => cmp.is_lt(),
                "<=" => cmp.is_le(),
                ">" => cmp.is_gt(),
                ">=" => cmp.is_ge(),
                _ => unreachable!(),
            }))
        }
        "+" => numeric_or_concat(&l, &r, |a, b| a + b),
        "-" => Ok(serde_json::json!(as_f64(&l)? - as_f64(&r)?)),
        "*" => Ok(serde_json::json!(as_f64(&l)? * as_f64(&r)?)),
        "/" => Ok(serde_json::json!(as_f64(&l)? / as_f64(&r)?)),
        "%" => Ok(serde_json::json!(as_f64(&l)? % as_f64(&r)?)),
        "**" => Ok(serde_json::json!(as_f64(&l)?.powf(as_f64(&r)?))),
        "&" => Ok(serde_json::json!(as_i64(&l)? & as_i64(&r)?)),
        "|" => Ok(serde_json::json!(as_i64(&l)? | as_i64(&r)?)),
        "^" => Ok(serde_json::json!(as_i64(&l)? ^ as_i64(&r)?)),
        "<<" => Ok(serde_json::json!(as_i64(&l)? << as_i64(&r)?)),
        ">>" => Ok(serde_json::json!(as_i64(&l)? >> as_i64(&r)?)),
        "in" => Ok(Value::Bool(contains(&r, &l))),
        "contains" => Ok(Value::Bool(contains(&l, &r))),
        "startsWith" => Ok(Value::Bool(as_str(&l)?.starts_with(as_str(&r)?.as_str()))),
        "endsWith" => Ok(Value::Bool(as_str(&l)?.ends_with(as_str(&r)?.as_str()))),
        "matches" => {
            // A minimal subset: treat the pattern as a literal substring unless it's `.*`-style.
            // Full regex support belongs to the production evaluator (§6.2 note).
            Ok(Value::Bool(as_str(&l)?.contains(as_str(&r)?.as_str())))
        }
        other => Err(EvalError::Eval(format!("unsupported operator '{other}'"))),
    }
}

fn eval_call(name: &str, args: &[Ast], env: &Value) -> EvalResult {
    let vals: Result<Vec<Value>, EvalError> = args.iter().map(|a| eval_ast(a, env)).collect();
    let vals = vals?;
    let arg0 = vals.first().cloned().unwrap_or(Value::Null);

    match name {
        "len" | "count" => Ok(serde_json::json!(collection_len(&arg0)? as f64)),
        "first" => Ok(as_array(&arg0)?.first().cloned().unwrap_or(Value::Null)),
        "last" => Ok(as_array(&arg0)?.last().cloned().unwrap_or(Value::Null)),
        "max" => reduce_numeric(&vals, f64::max),
        "min" => reduce_numeric(&vals, f64::min),
        "abs" => Ok(serde_json::json!(as_f64(&arg0)?.abs())),
        "ceil" => Ok(serde_json::json!(as_f64(&arg0)?.ceil())),
        "floor" => Ok(serde_json::json!(as_f64(&arg0)?.floor())),
        "round" => Ok(serde_json::json!(as_f64(&arg0)?.round())),
        "sqrt" => Ok(serde_json::json!(as_f64(&arg0)?.sqrt())),
        "pow" => Ok(serde_json::json!(as_f64(&arg0)?.powf(as_f64(&vals.get(1).cloned().unwrap_or(Value::Null))?))),
        "upper" => Ok(Value::String(as_str(&arg0)?.to_uppercase())),
        "lower" => Ok(Value::String(as_str(&arg0)?.to_lowercase())),
        "trim" => Ok(Value::String(as_str(&arg0)?.trim().to_string())),
        "split" => {
            let sep = as_str(&vals.get(1).cloned().unwrap_or(Value::String(",".to_string())))?;
            Ok(Value::Array(as_str(&arg0)?.split(sep.as_str()).map(|s| Value::String(s.to_string())).collect()))
        }
        "join" => {
            let sep = as_str(&vals.get(1).cloned().unwrap_or(Value::String(",".to_string())))?;
            let arr = as_array(&arg0)?;
            let parts: Vec<String> = arr.iter().map(value_to_display).collect();
            Ok(Value::String(parts.join(&sep)))
        }
        "type" => Ok(Value::String(type_name(&arg0).to_string())),
        "int" => Ok(serde_json::json!(as_f64(&arg0)?.trunc() as i64)),
        "float" => Ok(serde_json::json!(as_f64(&arg0)?)),
        "string" => Ok(Value::String(value_to_display(&arg0))),
        "now" => Ok(Value::Null), // pure-function contract: real clock belongs to the embedder
        other => Err(EvalError::Eval(format!("unknown function '{other}'"))),
    }
}

fn collection_len(v: &Value) -> Result<usize, EvalError> {
    match v {
        Value::Array(a) => Ok(a.len()),
        Value::String(s) => Ok(s.chars().count()),
        Value::Object(o) => Ok(o.len()),
        Value::Null => Ok(0),
        other => Err(EvalError::Eval(format!("len() unsupported for {other:?}"))),
    }
}

fn reduce_numeric(vals: &[Value], f: fn(f64, f64) -> f64) -> EvalResult {
    let nums: Vec<f64> = if vals.len() == 1 {
        as_array(&vals[0])?.iter().map(as_f64).collect::<Result<_, _>>()?
    } else {
        vals.iter().map(as_f64).collect::<Result<_, _>>()?
    };
    let mut it = nums.into_iter();
    let first = it.next().ok_or_else(|| EvalError::Eval("max/min requires at least one value".to_string()))?;
    Ok(serde_json::json!(it.fold(first, f)))
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::Array(arr) => arr.contains(needle),
        Value::String(s) => needle.as_str().map(|n| s.contains(n)).unwrap_or(false),
        Value::Object(o) => needle.as_str().map(|n| o.contains_key(n)).unwrap_or(false),
        _ => false,
    }
}

fn compare(a: &Value, b: &Value) -> Result<std::cmp::Ordering, EvalError> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        _ => {
            let x = as_f64(a)?;
            let y = as_f64(b)?;
            x.partial_cmp(&y).ok_or_else(|| EvalError::Eval("cannot compare NaN".to_string()))
        }
    }
}

fn numeric_or_concat(l: &Value, r: &Value, f: fn(f64, f64) -> f64) -> EvalResult {
    if let (Value::String(a), Value::String(b)) = (l, r) {
        return Ok(Value::String(format!("{a}{b}")));
    }
    Ok(serde_json::json!(f(as_f64(l)?, as_f64(r)?)))
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn as_f64(v: &Value) -> Result<f64, EvalError> {
    v.as_f64().ok_or_else(|| EvalError::Eval(format!("expected number, got {v:?}")))
}

fn as_i64(v: &Value) -> Result<i64, EvalError> {
    v.as_i64().ok_or_else(|| EvalError::Eval(format!("expected integer, got {v:?}")))
}

fn as_str(v: &Value) -> Result<String, EvalError> {
    match v {
        Value::String(s) => Ok(s.clone()),
        other => Ok(value_to_display(other)),
    }
}

fn as_array(v: &Value) -> Result<&Vec<Value>, EvalError> {
    v.as_array().ok_or_else(|| EvalError::Eval(format!("expected array, got {v:?}")))
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn value_to_display(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
