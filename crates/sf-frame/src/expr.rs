//! Expression engine for column definitions and cut predicates.
//!
//! Expressions are compiled against a [`Schema`], so unknown columns and type
//! errors surface at build time, before any event is read. Values follow RVec
//! semantics: operations between a per-object array and a scalar broadcast,
//! operations between two arrays are element-wise and require equal length.
//!
//! Supports arithmetic (+, -, *, /), comparisons (==, !=, <, <=, >, >=),
//! boolean operators (&&, ||, !), the literals `true`/`false`, masking and
//! indexing (`Muon_pt[good_mu_mask]`, `Jet_pt[0]`), element-wise functions
//! (abs, sqrt, log, exp, pow, min, max) and array reductions (Sum, Max, Min,
//! Mean, Any, All, Length).

use sf_core::{ColumnType, DType, Error, Result, Shape};

use crate::column::{Column, ColumnData, EventTable, JaggedCol, Schema};

// ── AST ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Expr {
    Number(f64),
    Var(usize), // index into required_columns
    UnaryNeg(Box<Expr>),
    UnaryNot(Box<Expr>),
    BinOp(BinOp, Box<Expr>, Box<Expr>),
    // `&&`/`||` between two scalars: the right side is only evaluated when needed.
    ShortCircuit(BinOp, Box<Expr>, Box<Expr>),
    Index(Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
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

impl BinOp {
    fn apply(self, lhs: f64, rhs: f64) -> f64 {
        let b = |c: bool| if c { 1.0 } else { 0.0 };
        match self {
            BinOp::Add => lhs + rhs,
            BinOp::Sub => lhs - rhs,
            BinOp::Mul => lhs * rhs,
            BinOp::Div => lhs / rhs,
            BinOp::Eq => b(lhs == rhs),
            BinOp::Ne => b(lhs != rhs),
            BinOp::Lt => b(lhs < rhs),
            BinOp::Le => b(lhs <= rhs),
            BinOp::Gt => b(lhs > rhs),
            BinOp::Ge => b(lhs >= rhs),
            BinOp::And => b(truthy(lhs) && truthy(rhs)),
            BinOp::Or => b(truthy(lhs) || truthy(rhs)),
        }
    }

    fn is_arithmetic(self) -> bool {
        matches!(self, BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div)
    }

    fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Func {
    Abs,
    Sqrt,
    Log,
    Exp,
    Pow,
    Min,
    Max,
    Sum,
    ArrMax,
    ArrMin,
    Mean,
    Any,
    All,
    Length,
}

impl Func {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "abs" => Func::Abs,
            "sqrt" => Func::Sqrt,
            "log" => Func::Log,
            "exp" => Func::Exp,
            "pow" => Func::Pow,
            "min" => Func::Min,
            "max" => Func::Max,
            "Sum" => Func::Sum,
            "Max" => Func::ArrMax,
            "Min" => Func::ArrMin,
            "Mean" => Func::Mean,
            "Any" => Func::Any,
            "All" => Func::All,
            "Length" => Func::Length,
            _ => return None,
        })
    }

    fn arity(self) -> usize {
        match self {
            Func::Pow | Func::Min | Func::Max => 2,
            _ => 1,
        }
    }

    fn is_reduction(self) -> bool {
        matches!(
            self,
            Func::Sum
                | Func::ArrMax
                | Func::ArrMin
                | Func::Mean
                | Func::Any
                | Func::All
                | Func::Length
        )
    }
}

fn truthy(x: f64) -> bool {
    x != 0.0
}

// ── Compiled expression ────────────────────────────────────────

/// A compiled, type-checked expression ready for evaluation.
///
/// Identifiers in the expression are resolved against the schema the
/// expression was compiled with.
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    ast: Expr,
    text: String,
    output_type: ColumnType,
    /// Columns referenced by this expression (ordered by first occurrence).
    pub required_columns: Vec<String>,
}

impl CompiledExpr {
    /// Parse, resolve and type-check an expression string.
    pub fn compile(input: &str, schema: &Schema) -> Result<Self> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(Error::Expression("empty expression".into()));
        }
        let mut parser = Parser::new(&tokens, schema);
        let typed = parser.parse_or()?;
        if parser.pos < parser.tokens.len() {
            return Err(Error::Expression(format!(
                "unexpected token after expression: {:?}",
                parser.tokens[parser.pos]
            )));
        }
        Ok(CompiledExpr {
            ast: typed.expr,
            text: input.to_string(),
            output_type: typed.ty,
            required_columns: std::mem::take(&mut parser.columns),
        })
    }

    /// The expression text as written.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Static type of the result.
    pub fn output_type(&self) -> ColumnType {
        self.output_type
    }

    /// Evaluate over every event of `table`.
    pub fn eval(&self, table: &EventTable) -> Result<Column> {
        let cols = self.resolve(table)?;
        let n = table.n_events();
        let data = match self.output_type.shape {
            Shape::Scalar => {
                let mut out = Vec::with_capacity(n);
                for row in 0..n {
                    match eval_expr(&self.ast, &cols, row)? {
                        Value::Scalar(x) => out.push(x),
                        Value::Vector(_) => return Err(self.shape_error(row)),
                    }
                }
                ColumnData::Scalar(out)
            }
            Shape::Jagged => {
                let mut out = JaggedCol::empty();
                for row in 0..n {
                    match eval_expr(&self.ast, &cols, row)? {
                        Value::Vector(v) => out.push_row(&v),
                        Value::Scalar(_) => return Err(self.shape_error(row)),
                    }
                }
                ColumnData::Jagged(out)
            }
        };
        Ok(Column::new(self.output_type.dtype, data))
    }

    /// Evaluate an event-level predicate: one pass/fail flag per event.
    pub fn eval_mask(&self, table: &EventTable) -> Result<Vec<bool>> {
        if !self.output_type.is_scalar() {
            return Err(Error::Expression(format!(
                "predicate '{}' yields {} per event, expected a scalar",
                self.text, self.output_type
            )));
        }
        let col = self.eval(table)?;
        Ok(col.as_scalar().map(|v| v.iter().map(|&x| truthy(x)).collect()).unwrap_or_default())
    }

    fn resolve<'t>(&self, table: &'t EventTable) -> Result<Vec<&'t Column>> {
        self.required_columns.iter().map(|name| table.get(name)).collect()
    }

    fn shape_error(&self, row: usize) -> Error {
        Error::Expression(format!(
            "'{}' produced a value of unexpected shape at event {row} (expected {})",
            self.text, self.output_type
        ))
    }
}

// ── Evaluation ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Value {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl Value {
    fn map(self, f: impl Fn(f64) -> f64) -> Value {
        match self {
            Value::Scalar(x) => Value::Scalar(f(x)),
            Value::Vector(v) => Value::Vector(v.into_iter().map(f).collect()),
        }
    }

    fn scalar(self, row: usize, what: &str) -> Result<f64> {
        match self {
            Value::Scalar(x) => Ok(x),
            Value::Vector(_) => {
                Err(Error::Expression(format!("event {row}: {what} expects a scalar operand")))
            }
        }
    }

    fn vector(self, row: usize, what: &str) -> Result<Vec<f64>> {
        match self {
            Value::Vector(v) => Ok(v),
            Value::Scalar(_) => {
                Err(Error::Expression(format!("event {row}: {what} expects an array operand")))
            }
        }
    }
}

fn zip_values(
    lhs: Value,
    rhs: Value,
    row: usize,
    what: &str,
    f: impl Fn(f64, f64) -> f64,
) -> Result<Value> {
    Ok(match (lhs, rhs) {
        (Value::Scalar(a), Value::Scalar(b)) => Value::Scalar(f(a, b)),
        (Value::Vector(a), Value::Scalar(b)) => {
            Value::Vector(a.into_iter().map(|x| f(x, b)).collect())
        }
        (Value::Scalar(a), Value::Vector(b)) => {
            Value::Vector(b.into_iter().map(|x| f(a, x)).collect())
        }
        (Value::Vector(a), Value::Vector(b)) => {
            if a.len() != b.len() {
                return Err(Error::Expression(format!(
                    "event {row}: size mismatch in '{what}': {} vs {}",
                    a.len(),
                    b.len()
                )));
            }
            Value::Vector(a.into_iter().zip(b).map(|(x, y)| f(x, y)).collect())
        }
    })
}

fn eval_expr(e: &Expr, cols: &[&Column], row: usize) -> Result<Value> {
    Ok(match e {
        Expr::Number(n) => Value::Scalar(*n),
        Expr::Var(i) => match cols[*i].data() {
            ColumnData::Scalar(v) => Value::Scalar(v[row]),
            ColumnData::Jagged(j) => Value::Vector(j.row(row).to_vec()),
        },
        Expr::UnaryNeg(a) => eval_expr(a, cols, row)?.map(|x| -x),
        Expr::UnaryNot(a) => eval_expr(a, cols, row)?.map(|x| if truthy(x) { 0.0 } else { 1.0 }),
        Expr::BinOp(op, a, b) => {
            let lhs = eval_expr(a, cols, row)?;
            let rhs = eval_expr(b, cols, row)?;
            zip_values(lhs, rhs, row, op.symbol(), |x, y| op.apply(x, y))?
        }
        Expr::ShortCircuit(op, a, b) => {
            let lhs = truthy(eval_expr(a, cols, row)?.scalar(row, op.symbol())?);
            let decided = match op {
                BinOp::And => (!lhs).then_some(false),
                _ => lhs.then_some(true),
            };
            let out = match decided {
                Some(v) => v,
                None => truthy(eval_expr(b, cols, row)?.scalar(row, op.symbol())?),
            };
            Value::Scalar(if out { 1.0 } else { 0.0 })
        }
        Expr::Index(base, index) => {
            let base = eval_expr(base, cols, row)?.vector(row, "indexing")?;
            match eval_expr(index, cols, row)? {
                Value::Vector(mask) => {
                    if mask.len() != base.len() {
                        return Err(Error::Expression(format!(
                            "event {row}: mask length {} does not match array length {}",
                            mask.len(),
                            base.len()
                        )));
                    }
                    Value::Vector(
                        base.into_iter().zip(mask).filter(|(_, m)| truthy(*m)).map(|(x, _)| x).collect(),
                    )
                }
                Value::Scalar(i) => {
                    if i < 0.0 || i as usize >= base.len() {
                        return Err(Error::Expression(format!(
                            "event {row}: index {i} out of range for array of length {}",
                            base.len()
                        )));
                    }
                    Value::Scalar(base[i as usize])
                }
            }
        }
        Expr::Call(f, args) => eval_call(*f, args, cols, row)?,
    })
}

fn eval_call(f: Func, args: &[Expr], cols: &[&Column], row: usize) -> Result<Value> {
    let a0 = eval_expr(&args[0], cols, row)?;
    if f.is_reduction() {
        let v = a0.vector(row, "array reduction")?;
        let n = v.len() as f64;
        let x = match f {
            Func::Sum => v.iter().sum(),
            Func::ArrMax => v.iter().copied().reduce(f64::max).unwrap_or(f64::NAN),
            Func::ArrMin => v.iter().copied().reduce(f64::min).unwrap_or(f64::NAN),
            Func::Mean => v.iter().sum::<f64>() / n,
            Func::Any => v.iter().any(|&x| truthy(x)) as u8 as f64,
            Func::All => v.iter().all(|&x| truthy(x)) as u8 as f64,
            _ => n,
        };
        return Ok(Value::Scalar(x));
    }
    match f {
        Func::Abs => Ok(a0.map(f64::abs)),
        Func::Sqrt => Ok(a0.map(f64::sqrt)),
        Func::Log => Ok(a0.map(f64::ln)),
        Func::Exp => Ok(a0.map(f64::exp)),
        _ => {
            let a1 = eval_expr(&args[1], cols, row)?;
            let g: fn(f64, f64) -> f64 = match f {
                Func::Pow => f64::powf,
                Func::Min => f64::min,
                _ => f64::max,
            };
            zip_values(a0, a1, row, "function call", g)
        }
    }
}

// ── Tokenizer ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64, bool), // value, is_integer_literal
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // Two-character operators
        if let Some(&next) = chars.get(i + 1) {
            let tok = match (c, next) {
                ('&', '&') => Some(Token::And),
                ('|', '|') => Some(Token::Or),
                ('=', '=') => Some(Token::Eq),
                ('!', '=') => Some(Token::Ne),
                ('<', '=') => Some(Token::Le),
                ('>', '=') => Some(Token::Ge),
                _ => None,
            };
            if let Some(t) = tok {
                tokens.push(t);
                i += 2;
                continue;
            }
        }

        let single = match c {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            ',' => Some(Token::Comma),
            '<' => Some(Token::Lt),
            '>' => Some(Token::Gt),
            '!' => Some(Token::Not),
            _ => None,
        };
        if let Some(t) = single {
            tokens.push(t);
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len()
                && (chars[i].is_ascii_digit()
                    || chars[i] == '.'
                    || chars[i] == 'e'
                    || chars[i] == 'E'
                    || ((chars[i] == '+' || chars[i] == '-')
                        && i > start
                        && (chars[i - 1] == 'e' || chars[i - 1] == 'E')))
            {
                i += 1;
            }
            let s: String = chars[start..i].iter().collect();
            let n: f64 =
                s.parse().map_err(|_| Error::Expression(format!("invalid number: '{s}'")))?;
            let is_int = !s.contains(['.', 'e', 'E']);
            tokens.push(Token::Num(n, is_int));
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else {
            return Err(Error::Expression(format!("unexpected character: '{c}'")));
        }
    }

    Ok(tokens)
}

// ── Parser (recursive descent, typed) ──────────────────────────

struct Typed {
    expr: Expr,
    ty: ColumnType,
}

fn broadcast(a: ColumnType, b: ColumnType) -> Shape {
    if a.is_scalar() && b.is_scalar() { Shape::Scalar } else { Shape::Jagged }
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    schema: &'a Schema,
    columns: Vec<String>,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token], schema: &'a Schema) -> Self {
        Self { tokens, pos: 0, schema, columns: Vec::new() }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        match self.advance() {
            Some(t) if t == expected => Ok(()),
            other => Err(Error::Expression(format!("expected {expected:?}, got {other:?}"))),
        }
    }

    fn resolve_var(&mut self, name: &str) -> Result<Typed> {
        let ty = self.schema.column_type(name)?;
        let idx = match self.columns.iter().position(|c| c == name) {
            Some(i) => i,
            None => {
                self.columns.push(name.to_string());
                self.columns.len() - 1
            }
        };
        Ok(Typed { expr: Expr::Var(idx), ty })
    }

    fn binary(op: BinOp, lhs: Typed, rhs: Typed) -> Typed {
        let shape = broadcast(lhs.ty, rhs.ty);
        let dtype = match op {
            BinOp::Div => DType::Float,
            _ if op.is_arithmetic() => lhs.ty.dtype.promote(rhs.ty.dtype),
            _ => DType::Bool,
        };
        let short = matches!(op, BinOp::And | BinOp::Or) && shape == Shape::Scalar;
        let (l, r) = (Box::new(lhs.expr), Box::new(rhs.expr));
        let expr = if short { Expr::ShortCircuit(op, l, r) } else { Expr::BinOp(op, l, r) };
        Typed { expr, ty: ColumnType { shape, dtype } }
    }

    // ── Grammar rules ──────────────────────────────────────────

    fn parse_or(&mut self) -> Result<Typed> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Self::binary(BinOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Typed> {
        let mut lhs = self.parse_cmp()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.advance();
            let rhs = self.parse_cmp()?;
            lhs = Self::binary(BinOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_cmp(&mut self) -> Result<Typed> {
        let lhs = self.parse_add()?;
        let op = match self.peek() {
            Some(Token::Eq) => BinOp::Eq,
            Some(Token::Ne) => BinOp::Ne,
            Some(Token::Lt) => BinOp::Lt,
            Some(Token::Le) => BinOp::Le,
            Some(Token::Gt) => BinOp::Gt,
            Some(Token::Ge) => BinOp::Ge,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_add()?;
        Ok(Self::binary(op, lhs, rhs))
    }

    fn parse_add(&mut self) -> Result<Typed> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_mul()?;
            lhs = Self::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> Result<Typed> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Self::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Typed> {
        match self.peek() {
            Some(Token::Minus) => {
                self.advance();
                let e = self.parse_unary()?;
                let dtype = if e.ty.dtype == DType::Bool { DType::Int } else { e.ty.dtype };
                Ok(Typed {
                    expr: Expr::UnaryNeg(Box::new(e.expr)),
                    ty: ColumnType { shape: e.ty.shape, dtype },
                })
            }
            Some(Token::Not) => {
                self.advance();
                let e = self.parse_unary()?;
                Ok(Typed {
                    expr: Expr::UnaryNot(Box::new(e.expr)),
                    ty: ColumnType { shape: e.ty.shape, dtype: DType::Bool },
                })
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Typed> {
        let mut base = self.parse_atom()?;
        while matches!(self.peek(), Some(Token::LBracket)) {
            self.advance();
            let index = self.parse_or()?;
            self.expect(&Token::RBracket)?;
            base = Self::index(base, index)?;
        }
        Ok(base)
    }

    fn index(base: Typed, index: Typed) -> Result<Typed> {
        if base.ty.is_scalar() {
            return Err(Error::Expression(format!("cannot index a {} value", base.ty)));
        }
        let shape = match (index.ty.shape, index.ty.dtype) {
            (Shape::Jagged, DType::Bool) => Shape::Jagged,
            (Shape::Scalar, DType::Int) => Shape::Scalar,
            _ => {
                return Err(Error::Expression(format!(
                    "array index must be a boolean mask or an integer, got {}",
                    index.ty
                )));
            }
        };
        Ok(Typed {
            expr: Expr::Index(Box::new(base.expr), Box::new(index.expr)),
            ty: ColumnType { shape, dtype: base.ty.dtype },
        })
    }

    fn parse_atom(&mut self) -> Result<Typed> {
        match self.advance().cloned() {
            Some(Token::Num(n, is_int)) => Ok(Typed {
                expr: Expr::Number(n),
                ty: ColumnType::scalar(if is_int { DType::Int } else { DType::Float }),
            }),
            Some(Token::LParen) => {
                let e = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(e)
            }
            Some(Token::Ident(name)) => {
                if matches!(self.peek(), Some(Token::LParen)) {
                    self.advance(); // consume '('
                    self.parse_call(&name)
                } else if name == "true" || name == "false" {
                    Ok(Typed {
                        expr: Expr::Number(if name == "true" { 1.0 } else { 0.0 }),
                        ty: ColumnType::scalar(DType::Bool),
                    })
                } else {
                    self.resolve_var(&name)
                }
            }
            other => Err(Error::Expression(format!(
                "expected number, identifier, or '(', got {other:?}"
            ))),
        }
    }

    fn parse_call(&mut self, name: &str) -> Result<Typed> {
        let func = Func::lookup(name)
            .ok_or_else(|| Error::Expression(format!("unknown function: '{name}'")))?;
        let mut args = vec![self.parse_or()?];
        while matches!(self.peek(), Some(Token::Comma)) {
            self.advance();
            args.push(self.parse_or()?);
        }
        self.expect(&Token::RParen)?;
        if args.len() != func.arity() {
            return Err(Error::Expression(format!(
                "{name}() takes {} argument(s), got {}",
                func.arity(),
                args.len()
            )));
        }

        let a0 = args[0].ty;
        let ty = if func.is_reduction() {
            if a0.is_scalar() {
                return Err(Error::Expression(format!("{name}() expects an array, got {a0}")));
            }
            let dtype = match func {
                Func::Sum => {
                    if a0.dtype == DType::Float { DType::Float } else { DType::Int }
                }
                // Empty arrays reduce to NaN.
                Func::ArrMax | Func::ArrMin | Func::Mean => DType::Float,
                Func::Any | Func::All => DType::Bool,
                _ => DType::Int,
            };
            ColumnType::scalar(dtype)
        } else {
            match func {
                Func::Abs => ColumnType {
                    shape: a0.shape,
                    dtype: if a0.dtype == DType::Bool { DType::Int } else { a0.dtype },
                },
                Func::Sqrt | Func::Log | Func::Exp => {
                    ColumnType { shape: a0.shape, dtype: DType::Float }
                }
                Func::Pow => ColumnType { shape: broadcast(a0, args[1].ty), dtype: DType::Float },
                _ => ColumnType {
                    shape: broadcast(a0, args[1].ty),
                    dtype: a0.dtype.promote(args[1].ty.dtype),
                },
            }
        };
        Ok(Typed { expr: Expr::Call(func, args.into_iter().map(|a| a.expr).collect()), ty })
    }
}

// ── Tests ──────────────────────────────────────────────────────
