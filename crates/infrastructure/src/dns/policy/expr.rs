//! Compiled policy expressions.
//!
//! A small typed expression language over the policy context. Programs are
//! compiled once when a rule is added: helper arguments must be literals,
//! regexes and CIDRs are parsed eagerly, and the root expression must be
//! boolean. Evaluation cannot perform I/O or allocate unboundedly; the only
//! runtime failure mode is a regex engine error, which the engine treats as
//! a non-match.

use fancy_regex::Regex;
use glory_hole_domain::{DomainError, PolicyContext};
use ipnetwork::IpNetwork;
use rustc_hash::FxHashSet;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    LParen,
    RParen,
    Comma,
}

fn lex(source: &str) -> Result<Vec<Token>, DomainError> {
    let mut tokens = Vec::new();
    let bytes = source.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Eq);
                    i += 2;
                } else {
                    return Err(err_at(source, i, "expected '=='"));
                }
            }
            '!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Ne);
                    i += 2;
                } else {
                    tokens.push(Token::Not);
                    i += 1;
                }
            }
            '<' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '&' => {
                if bytes.get(i + 1) == Some(&b'&') {
                    tokens.push(Token::And);
                    i += 2;
                } else {
                    return Err(err_at(source, i, "expected '&&'"));
                }
            }
            '|' => {
                if bytes.get(i + 1) == Some(&b'|') {
                    tokens.push(Token::Or);
                    i += 2;
                } else {
                    return Err(err_at(source, i, "expected '||'"));
                }
            }
            '"' => {
                let start = i + 1;
                let mut j = start;
                while j < bytes.len() && bytes[j] != b'"' {
                    j += 1;
                }
                if j >= bytes.len() {
                    return Err(err_at(source, i, "unterminated string literal"));
                }
                tokens.push(Token::Str(source[start..j].to_string()));
                i = j + 1;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < bytes.len() && (bytes[i] as char).is_ascii_digit() {
                    i += 1;
                }
                let value: i64 = source[start..i].parse().map_err(|_| {
                    err_at(source, start, "integer literal out of range")
                })?;
                tokens.push(Token::Int(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < bytes.len()
                    && ((bytes[i] as char).is_ascii_alphanumeric() || bytes[i] == b'_')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(source[start..i].to_string()));
            }
            _ => return Err(err_at(source, i, "unexpected character")),
        }
    }

    Ok(tokens)
}

fn err_at(source: &str, pos: usize, message: &str) -> DomainError {
    DomainError::InvalidExpression(format!("{} at byte {} in '{}'", message, pos, source))
}

// ---------------------------------------------------------------------------
// Typed AST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ty {
    Bool,
    Int,
    Str,
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Ty::Bool => "bool",
            Ty::Int => "int",
            Ty::Str => "string",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Domain,
    ClientIp,
    QueryType,
    Hour,
    Minute,
    Day,
    Month,
    Weekday,
}

impl Field {
    fn ty(&self) -> Ty {
        match self {
            Field::Domain | Field::ClientIp | Field::QueryType => Ty::Str,
            _ => Ty::Int,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

enum Expr {
    BoolLit(bool),
    IntLit(i64),
    StrLit(Arc<str>),
    Ident(Field),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    DomainMatchesExact(String),
    DomainMatchesWildcard(String),
    DomainEndsWith(String),
    DomainStartsWith(String),
    DomainRegex(Regex),
    DomainLevelCount,
    IpInCidr(IpNetwork),
    IpEquals(IpAddr),
    QueryTypeIn(FxHashSet<String>),
    IsWeekend,
    InTimeRange { start: u32, end: u32 },
}

impl Expr {
    fn ty(&self) -> Ty {
        match self {
            Expr::BoolLit(_)
            | Expr::Not(_)
            | Expr::And(..)
            | Expr::Or(..)
            | Expr::Cmp(..)
            | Expr::DomainMatchesExact(_)
            | Expr::DomainMatchesWildcard(_)
            | Expr::DomainEndsWith(_)
            | Expr::DomainStartsWith(_)
            | Expr::DomainRegex(_)
            | Expr::IpInCidr(_)
            | Expr::IpEquals(_)
            | Expr::QueryTypeIn(_)
            | Expr::IsWeekend
            | Expr::InTimeRange { .. } => Ty::Bool,
            Expr::IntLit(_) | Expr::DomainLevelCount => Ty::Int,
            Expr::StrLit(_) => Ty::Str,
            Expr::Ident(field) => field.ty(),
        }
    }
}

enum Value {
    Bool(bool),
    Int(i64),
    Str(Arc<str>),
}

// ---------------------------------------------------------------------------
// Parser (precedence climbing: or < and < not < cmp < primary)
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), DomainError> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            other => Err(DomainError::InvalidExpression(format!(
                "expected {:?}, found {:?}",
                expected, other
            ))),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, DomainError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.next();
            let right = self.parse_and()?;
            require_ty(&left, Ty::Bool, "||")?;
            require_ty(&right, Ty::Bool, "||")?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, DomainError> {
        let mut left = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.next();
            let right = self.parse_not()?;
            require_ty(&left, Ty::Bool, "&&")?;
            require_ty(&right, Ty::Bool, "&&")?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, DomainError> {
        if self.peek() == Some(&Token::Not) {
            self.next();
            let inner = self.parse_not()?;
            require_ty(&inner, Ty::Bool, "!")?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_cmp()
    }

    fn parse_cmp(&mut self) -> Result<Expr, DomainError> {
        let left = self.parse_primary()?;
        let op = match self.peek() {
            Some(Token::Eq) => CmpOp::Eq,
            Some(Token::Ne) => CmpOp::Ne,
            Some(Token::Lt) => CmpOp::Lt,
            Some(Token::Le) => CmpOp::Le,
            Some(Token::Gt) => CmpOp::Gt,
            Some(Token::Ge) => CmpOp::Ge,
            _ => return Ok(left),
        };
        self.next();
        let right = self.parse_primary()?;

        if left.ty() != right.ty() {
            return Err(DomainError::InvalidExpression(format!(
                "cannot compare {} with {}",
                left.ty(),
                right.ty()
            )));
        }
        if matches!(op, CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge) && left.ty() != Ty::Int {
            return Err(DomainError::InvalidExpression(format!(
                "ordering comparison requires integers, found {}",
                left.ty()
            )));
        }
        Ok(Expr::Cmp(op, Box::new(left), Box::new(right)))
    }

    fn parse_primary(&mut self) -> Result<Expr, DomainError> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Int(value)) => Ok(Expr::IntLit(value)),
            Some(Token::Str(value)) => Ok(Expr::StrLit(Arc::from(value.as_str()))),
            Some(Token::Ident(name)) => self.parse_ident(name),
            other => Err(DomainError::InvalidExpression(format!(
                "unexpected token {:?}",
                other
            ))),
        }
    }

    fn parse_ident(&mut self, name: String) -> Result<Expr, DomainError> {
        // Field references
        match name.as_str() {
            "true" => return Ok(Expr::BoolLit(true)),
            "false" => return Ok(Expr::BoolLit(false)),
            "Domain" => return Ok(Expr::Ident(Field::Domain)),
            "ClientIP" => return Ok(Expr::Ident(Field::ClientIp)),
            "QueryType" => return Ok(Expr::Ident(Field::QueryType)),
            "Hour" => return Ok(Expr::Ident(Field::Hour)),
            "Minute" => return Ok(Expr::Ident(Field::Minute)),
            "Day" => return Ok(Expr::Ident(Field::Day)),
            "Month" => return Ok(Expr::Ident(Field::Month)),
            "Weekday" => return Ok(Expr::Ident(Field::Weekday)),
            _ => {}
        }

        // Helper calls: arguments are string literals, validated eagerly.
        let args = self.parse_args()?;
        match name.as_str() {
            "DomainMatches" => {
                let pattern = one_arg(&name, &args)?;
                match crate::dns::matcher::Pattern::classify(&pattern) {
                    crate::dns::matcher::Pattern::Wildcard(suffix) => {
                        Ok(Expr::DomainMatchesWildcard(suffix))
                    }
                    crate::dns::matcher::Pattern::Regex(source) => {
                        let regex = Regex::new(&format!("(?i){}", source)).map_err(|e| {
                            DomainError::InvalidExpression(format!("DomainMatches: {}", e))
                        })?;
                        Ok(Expr::DomainRegex(regex))
                    }
                    crate::dns::matcher::Pattern::Exact(domain) => {
                        Ok(Expr::DomainMatchesExact(domain))
                    }
                }
            }
            "DomainEndsWith" => Ok(Expr::DomainEndsWith(
                one_arg(&name, &args)?.to_ascii_lowercase(),
            )),
            "DomainStartsWith" => Ok(Expr::DomainStartsWith(
                one_arg(&name, &args)?.to_ascii_lowercase(),
            )),
            "DomainRegex" => {
                let source = one_arg(&name, &args)?;
                let regex = Regex::new(&format!("(?i){}", source)).map_err(|e| {
                    DomainError::InvalidExpression(format!("DomainRegex: {}", e))
                })?;
                Ok(Expr::DomainRegex(regex))
            }
            "DomainLevelCount" => {
                if !args.is_empty() {
                    return Err(arity(&name, 0, args.len()));
                }
                Ok(Expr::DomainLevelCount)
            }
            "IPInCIDR" => {
                let cidr = one_arg(&name, &args)?;
                let network: IpNetwork = cidr.parse().map_err(|e| {
                    DomainError::InvalidExpression(format!("IPInCIDR '{}': {}", cidr, e))
                })?;
                Ok(Expr::IpInCidr(network))
            }
            "IPEquals" => {
                let ip = one_arg(&name, &args)?;
                let addr: IpAddr = ip.parse().map_err(|_| {
                    DomainError::InvalidExpression(format!("IPEquals: invalid address '{}'", ip))
                })?;
                Ok(Expr::IpEquals(addr))
            }
            "QueryTypeIn" => {
                if args.is_empty() {
                    return Err(DomainError::InvalidExpression(
                        "QueryTypeIn requires at least one type".to_string(),
                    ));
                }
                Ok(Expr::QueryTypeIn(
                    args.iter().map(|a| a.to_ascii_uppercase()).collect(),
                ))
            }
            "IsWeekend" => {
                if !args.is_empty() {
                    return Err(arity(&name, 0, args.len()));
                }
                Ok(Expr::IsWeekend)
            }
            "InTimeRange" => {
                if args.len() != 2 {
                    return Err(arity(&name, 2, args.len()));
                }
                Ok(Expr::InTimeRange {
                    start: parse_hhmm(&args[0])?,
                    end: parse_hhmm(&args[1])?,
                })
            }
            other => Err(DomainError::InvalidExpression(format!(
                "unknown identifier or function: {}",
                other
            ))),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<String>, DomainError> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.next();
            return Ok(args);
        }
        loop {
            match self.next() {
                Some(Token::Str(value)) => args.push(value),
                other => {
                    return Err(DomainError::InvalidExpression(format!(
                        "helper arguments must be string literals, found {:?}",
                        other
                    )))
                }
            }
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => break,
                other => {
                    return Err(DomainError::InvalidExpression(format!(
                        "expected ',' or ')', found {:?}",
                        other
                    )))
                }
            }
        }
        Ok(args)
    }
}

fn require_ty(expr: &Expr, expected: Ty, op: &str) -> Result<(), DomainError> {
    if expr.ty() != expected {
        return Err(DomainError::InvalidExpression(format!(
            "operand of '{}' must be {}, found {}",
            op,
            expected,
            expr.ty()
        )));
    }
    Ok(())
}

fn one_arg(name: &str, args: &[String]) -> Result<String, DomainError> {
    match args {
        [one] => Ok(one.clone()),
        _ => Err(arity(name, 1, args.len())),
    }
}

fn arity(name: &str, expected: usize, found: usize) -> DomainError {
    DomainError::InvalidExpression(format!(
        "{} takes {} argument(s), found {}",
        name, expected, found
    ))
}

/// "HH:MM" → minutes past midnight.
fn parse_hhmm(s: &str) -> Result<u32, DomainError> {
    let (h, m) = s.split_once(':').ok_or_else(|| {
        DomainError::InvalidExpression(format!("time must be HH:MM, found '{}'", s))
    })?;
    let hour: u32 = h
        .parse()
        .map_err(|_| DomainError::InvalidExpression(format!("invalid hour in '{}'", s)))?;
    let minute: u32 = m
        .parse()
        .map_err(|_| DomainError::InvalidExpression(format!("invalid minute in '{}'", s)))?;
    if hour > 23 || minute > 59 {
        return Err(DomainError::InvalidExpression(format!(
            "time out of range: '{}'",
            s
        )));
    }
    Ok(hour * 60 + minute)
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

impl Expr {
    fn eval(&self, ctx: &PolicyContext) -> Result<Value, DomainError> {
        Ok(match self {
            Expr::BoolLit(b) => Value::Bool(*b),
            Expr::IntLit(i) => Value::Int(*i),
            Expr::StrLit(s) => Value::Str(Arc::clone(s)),
            Expr::Ident(field) => match field {
                Field::Domain => Value::Str(Arc::clone(&ctx.domain)),
                Field::ClientIp => Value::Str(Arc::from(ctx.client_ip.to_string().as_str())),
                Field::QueryType => Value::Str(Arc::from(ctx.query_type.to_string().as_str())),
                Field::Hour => Value::Int(i64::from(ctx.hour)),
                Field::Minute => Value::Int(i64::from(ctx.minute)),
                Field::Day => Value::Int(i64::from(ctx.day)),
                Field::Month => Value::Int(i64::from(ctx.month)),
                Field::Weekday => Value::Int(i64::from(ctx.weekday)),
            },
            Expr::Not(inner) => Value::Bool(!inner.eval_bool(ctx)?),
            Expr::And(left, right) => {
                Value::Bool(left.eval_bool(ctx)? && right.eval_bool(ctx)?)
            }
            Expr::Or(left, right) => Value::Bool(left.eval_bool(ctx)? || right.eval_bool(ctx)?),
            Expr::Cmp(op, left, right) => {
                let l = left.eval(ctx)?;
                let r = right.eval(ctx)?;
                Value::Bool(compare(*op, &l, &r)?)
            }
            Expr::DomainMatchesExact(domain) => Value::Bool(&*ctx.domain == domain.as_str()),
            Expr::DomainMatchesWildcard(suffix) => {
                let d = &*ctx.domain;
                Value::Bool(
                    d.len() > suffix.len() + 1
                        && d.ends_with(suffix.as_str())
                        && d.as_bytes()[d.len() - suffix.len() - 1] == b'.',
                )
            }
            Expr::DomainEndsWith(suffix) => Value::Bool(ctx.domain.ends_with(suffix.as_str())),
            Expr::DomainStartsWith(prefix) => {
                Value::Bool(ctx.domain.starts_with(prefix.as_str()))
            }
            Expr::DomainRegex(regex) => Value::Bool(
                regex
                    .is_match(&ctx.domain)
                    .map_err(|e| DomainError::PolicyEvalError(format!("DomainRegex: {}", e)))?,
            ),
            Expr::DomainLevelCount => {
                Value::Int(ctx.domain.split('.').filter(|l| !l.is_empty()).count() as i64)
            }
            Expr::IpInCidr(network) => Value::Bool(network.contains(ctx.client_ip)),
            Expr::IpEquals(addr) => Value::Bool(ctx.client_ip == *addr),
            Expr::QueryTypeIn(types) => {
                Value::Bool(types.contains(&ctx.query_type.to_string()))
            }
            Expr::IsWeekend => Value::Bool(ctx.is_weekend()),
            Expr::InTimeRange { start, end } => {
                let now = ctx.hour * 60 + ctx.minute;
                // end < start means the range wraps past midnight
                Value::Bool(if start <= end {
                    now >= *start && now <= *end
                } else {
                    now >= *start || now <= *end
                })
            }
        })
    }

    fn eval_bool(&self, ctx: &PolicyContext) -> Result<bool, DomainError> {
        match self.eval(ctx)? {
            Value::Bool(b) => Ok(b),
            // unreachable after compile-time type checking
            _ => Err(DomainError::PolicyEvalError(
                "expression did not evaluate to a boolean".to_string(),
            )),
        }
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, DomainError> {
    match (left, right) {
        (Value::Int(l), Value::Int(r)) => Ok(match op {
            CmpOp::Eq => l == r,
            CmpOp::Ne => l != r,
            CmpOp::Lt => l < r,
            CmpOp::Le => l <= r,
            CmpOp::Gt => l > r,
            CmpOp::Ge => l >= r,
        }),
        (Value::Str(l), Value::Str(r)) => match op {
            CmpOp::Eq => Ok(l.eq_ignore_ascii_case(r)),
            CmpOp::Ne => Ok(!l.eq_ignore_ascii_case(r)),
            _ => Err(DomainError::PolicyEvalError(
                "ordering comparison on strings".to_string(),
            )),
        },
        (Value::Bool(l), Value::Bool(r)) => match op {
            CmpOp::Eq => Ok(l == r),
            CmpOp::Ne => Ok(l != r),
            _ => Err(DomainError::PolicyEvalError(
                "ordering comparison on booleans".to_string(),
            )),
        },
        _ => Err(DomainError::PolicyEvalError(
            "comparison across types".to_string(),
        )),
    }
}

// ---------------------------------------------------------------------------
// Program
// ---------------------------------------------------------------------------

/// A compiled, reusable policy expression.
pub struct Program {
    root: Expr,
    source: Arc<str>,
}

impl Program {
    pub fn compile(source: &str) -> Result<Self, DomainError> {
        let tokens = lex(source)?;
        if tokens.is_empty() {
            return Err(DomainError::InvalidExpression(
                "empty expression".to_string(),
            ));
        }
        let mut parser = Parser { tokens, pos: 0 };
        let root = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(DomainError::InvalidExpression(format!(
                "trailing tokens after expression in '{}'",
                source
            )));
        }
        if root.ty() != Ty::Bool {
            return Err(DomainError::InvalidExpression(format!(
                "expression must be boolean, found {}",
                root.ty()
            )));
        }
        Ok(Self {
            root,
            source: Arc::from(source),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, ctx: &PolicyContext) -> Result<bool, DomainError> {
        self.root.eval_bool(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glory_hole_domain::RecordType;

    fn ctx(domain: &str, ip: &str, rt: RecordType) -> PolicyContext {
        let mut ctx = PolicyContext::new(Arc::from(domain), ip.parse().unwrap(), rt);
        ctx.hour = 14;
        ctx.minute = 30;
        ctx.day = 15;
        ctx.month = 6;
        ctx.weekday = 2;
        ctx
    }

    #[test]
    fn field_comparisons() {
        let p = Program::compile(r#"Domain == "tracker.example.com""#).unwrap();
        assert!(p.matches(&ctx("tracker.example.com", "10.0.0.1", RecordType::A)).unwrap());
        assert!(!p.matches(&ctx("other.example.com", "10.0.0.1", RecordType::A)).unwrap());

        let p = Program::compile("Hour >= 9 && Hour < 17").unwrap();
        assert!(p.matches(&ctx("x.example", "10.0.0.1", RecordType::A)).unwrap());
    }

    #[test]
    fn boolean_combinators_and_parens() {
        let p = Program::compile(
            r#"(Domain == "a.example" || Domain == "b.example") && !IsWeekend()"#,
        )
        .unwrap();
        assert!(p.matches(&ctx("a.example", "10.0.0.1", RecordType::A)).unwrap());
        let mut weekend = ctx("a.example", "10.0.0.1", RecordType::A);
        weekend.weekday = 6;
        assert!(!p.matches(&weekend).unwrap());
    }

    #[test]
    fn domain_helpers() {
        let p = Program::compile(r#"DomainMatches("*.corp.example")"#).unwrap();
        assert!(p.matches(&ctx("git.corp.example", "10.0.0.1", RecordType::A)).unwrap());
        assert!(!p.matches(&ctx("corp.example", "10.0.0.1", RecordType::A)).unwrap());

        // Regex-shaped patterns compile to the regex tier.
        let p = Program::compile(r#"DomainMatches("^cdn[0-9]$")"#).unwrap();
        assert!(p.matches(&ctx("cdn7", "10.0.0.1", RecordType::A)).unwrap());

        let p = Program::compile(r#"DomainEndsWith(".cn") || DomainStartsWith("ads.")"#).unwrap();
        assert!(p.matches(&ctx("ads.example.com", "10.0.0.1", RecordType::A)).unwrap());
        assert!(p.matches(&ctx("example.cn", "10.0.0.1", RecordType::A)).unwrap());
        assert!(!p.matches(&ctx("example.com", "10.0.0.1", RecordType::A)).unwrap());

        // The lexer does no escape processing: backslashes inside string
        // literals flow straight into the regex source.
        let p = Program::compile(r#"DomainRegex("^ads[0-9]+\.")"#).unwrap();
        assert!(p.matches(&ctx("ads3.example.com", "10.0.0.1", RecordType::A)).unwrap());
        assert!(!p.matches(&ctx("ads.example.com", "10.0.0.1", RecordType::A)).unwrap());

        let p = Program::compile("DomainLevelCount() > 3").unwrap();
        assert!(p.matches(&ctx("a.b.c.example.com", "10.0.0.1", RecordType::A)).unwrap());
        assert!(!p.matches(&ctx("example.com", "10.0.0.1", RecordType::A)).unwrap());
    }

    #[test]
    fn ip_helpers() {
        let p = Program::compile(r#"IPInCIDR("192.168.0.0/16")"#).unwrap();
        assert!(p.matches(&ctx("x.example", "192.168.1.50", RecordType::A)).unwrap());
        assert!(!p.matches(&ctx("x.example", "10.0.0.1", RecordType::A)).unwrap());

        let p = Program::compile(r#"IPEquals("10.0.0.7")"#).unwrap();
        assert!(p.matches(&ctx("x.example", "10.0.0.7", RecordType::A)).unwrap());
    }

    #[test]
    fn query_type_and_time_helpers() {
        let p = Program::compile(r#"QueryTypeIn("A", "AAAA")"#).unwrap();
        assert!(p.matches(&ctx("x.example", "10.0.0.1", RecordType::AAAA)).unwrap());
        assert!(!p.matches(&ctx("x.example", "10.0.0.1", RecordType::MX)).unwrap());

        let p = Program::compile(r#"InTimeRange("09:00", "17:00")"#).unwrap();
        assert!(p.matches(&ctx("x.example", "10.0.0.1", RecordType::A)).unwrap());

        // Wrapping range: 22:00-06:00 does not include 14:30.
        let p = Program::compile(r#"InTimeRange("22:00", "06:00")"#).unwrap();
        assert!(!p.matches(&ctx("x.example", "10.0.0.1", RecordType::A)).unwrap());
    }

    #[test]
    fn compile_errors() {
        assert!(Program::compile("").is_err());
        assert!(Program::compile("Domain").is_err()); // not boolean
        assert!(Program::compile(r#"Domain == 5"#).is_err()); // type mismatch
        assert!(Program::compile(r#"Hour == "nine""#).is_err());
        assert!(Program::compile(r#"Domain < "a""#).is_err()); // ordering on strings
        assert!(Program::compile(r#"Bogus("x")"#).is_err());
        assert!(Program::compile(r#"DomainRegex("[unclosed")"#).is_err());
        assert!(Program::compile(r#"IPInCIDR("not-a-cidr")"#).is_err());
        assert!(Program::compile(r#"InTimeRange("25:00", "17:00")"#).is_err());
        assert!(Program::compile(r#"Domain == "x" extra"#).is_err());
    }

    #[test]
    fn string_equality_ignores_case() {
        let p = Program::compile(r#"QueryType == "a""#).unwrap();
        assert!(p.matches(&ctx("x.example", "10.0.0.1", RecordType::A)).unwrap());
    }
}
