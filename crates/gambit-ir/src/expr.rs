use indexmap::{IndexMap, IndexSet};
use num::rational::Rational64;
use num::traits::{Signed, Zero};
use std::fmt;
use thiserror::Error;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Le,
    Lt,
    Ge,
    Gt,
}

impl CmpOp {
    /// The operator of the negated comparison (`!(a >= b)` is `a < b`).
    ///
    /// `Eq` has no single-operator negation and is handled by the caller.
    pub fn flipped(self) -> Option<CmpOp> {
        match self {
            CmpOp::Le => Some(CmpOp::Gt),
            CmpOp::Lt => Some(CmpOp::Ge),
            CmpOp::Ge => Some(CmpOp::Lt),
            CmpOp::Gt => Some(CmpOp::Le),
            CmpOp::Eq => None,
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CmpOp::Eq => write!(f, "="),
            CmpOp::Le => write!(f, "<="),
            CmpOp::Lt => write!(f, "<"),
            CmpOp::Ge => write!(f, ">="),
            CmpOp::Gt => write!(f, ">"),
        }
    }
}

/// Immutable symbolic expression over real-valued variables.
///
/// Sums, products, conjunctions, and disjunctions are n-ary; an empty sum
/// is 0, an empty product is 1, and empty connectives are the neutral
/// boolean. Structural comparison is `PartialEq`; substitution builds a new
/// tree and never mutates shared sub-expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Exact rational constant.
    Const(Rational64),
    /// Variable reference by name.
    Var(String),

    // Arithmetic
    Add(Vec<Expr>),
    Mul(Vec<Expr>),

    // Comparison
    Cmp(CmpOp, Box<Expr>, Box<Expr>),

    // Boolean logic
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    Implies(Box<Expr>, Box<Expr>),
}

#[allow(clippy::should_implement_trait)]
impl Expr {
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    pub fn int(n: i64) -> Self {
        Expr::Const(Rational64::from_integer(n))
    }

    pub fn rat(numer: i64, denom: i64) -> Self {
        Expr::Const(Rational64::new(numer, denom))
    }

    pub fn num(value: Rational64) -> Self {
        Expr::Const(value)
    }

    /// Tautological comparison used where a boolean literal `true` is needed.
    pub fn truth() -> Self {
        Expr::int(1).ge(Expr::int(0))
    }

    /// Contradictory comparison used where a boolean literal `false` is needed.
    pub fn falsity() -> Self {
        Expr::int(0).ge(Expr::int(1))
    }

    pub fn sum(terms: Vec<Expr>) -> Self {
        Expr::Add(terms)
    }

    pub fn product(factors: Vec<Expr>) -> Self {
        Expr::Mul(factors)
    }

    pub fn add(self, other: Expr) -> Self {
        Expr::Add(vec![self, other])
    }

    pub fn sub(self, other: Expr) -> Self {
        Expr::Add(vec![self, Expr::Mul(vec![Expr::int(-1), other])])
    }

    pub fn mul(self, other: Expr) -> Self {
        Expr::Mul(vec![self, other])
    }

    pub fn neg(self) -> Self {
        Expr::Mul(vec![Expr::int(-1), self])
    }

    pub fn eq(self, other: Expr) -> Self {
        Expr::Cmp(CmpOp::Eq, Box::new(self), Box::new(other))
    }

    pub fn le(self, other: Expr) -> Self {
        Expr::Cmp(CmpOp::Le, Box::new(self), Box::new(other))
    }

    pub fn lt(self, other: Expr) -> Self {
        Expr::Cmp(CmpOp::Lt, Box::new(self), Box::new(other))
    }

    pub fn ge(self, other: Expr) -> Self {
        Expr::Cmp(CmpOp::Ge, Box::new(self), Box::new(other))
    }

    pub fn gt(self, other: Expr) -> Self {
        Expr::Cmp(CmpOp::Gt, Box::new(self), Box::new(other))
    }

    pub fn and(terms: Vec<Expr>) -> Self {
        Expr::And(terms)
    }

    pub fn or(terms: Vec<Expr>) -> Self {
        Expr::Or(terms)
    }

    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    pub fn implies(self, other: Expr) -> Self {
        Expr::Implies(Box::new(self), Box::new(other))
    }

    /// Conjoin two formulas, flattening nested conjunctions on the left.
    pub fn and_also(self, other: Expr) -> Self {
        match self {
            Expr::And(mut terms) => {
                terms.push(other);
                Expr::And(terms)
            }
            lhs => Expr::And(vec![lhs, other]),
        }
    }

    /// Simultaneous substitution: every variable named in `map` is replaced
    /// by its image in a single pass, so images are never re-substituted.
    pub fn subst(&self, map: &IndexMap<String, Expr>) -> Expr {
        match self {
            Expr::Const(_) => self.clone(),
            Expr::Var(name) => match map.get(name) {
                Some(image) => image.clone(),
                None => self.clone(),
            },
            Expr::Add(terms) => Expr::Add(terms.iter().map(|t| t.subst(map)).collect()),
            Expr::Mul(factors) => Expr::Mul(factors.iter().map(|t| t.subst(map)).collect()),
            Expr::Cmp(op, lhs, rhs) => Expr::Cmp(
                *op,
                Box::new(lhs.subst(map)),
                Box::new(rhs.subst(map)),
            ),
            Expr::And(terms) => Expr::And(terms.iter().map(|t| t.subst(map)).collect()),
            Expr::Or(terms) => Expr::Or(terms.iter().map(|t| t.subst(map)).collect()),
            Expr::Not(inner) => Expr::Not(Box::new(inner.subst(map))),
            Expr::Implies(lhs, rhs) => Expr::Implies(
                Box::new(lhs.subst(map)),
                Box::new(rhs.subst(map)),
            ),
        }
    }

    /// Collect variable names in first-occurrence order.
    pub fn collect_vars(&self, out: &mut IndexSet<String>) {
        match self {
            Expr::Const(_) => {}
            Expr::Var(name) => {
                out.insert(name.clone());
            }
            Expr::Add(terms) | Expr::Mul(terms) | Expr::And(terms) | Expr::Or(terms) => {
                for t in terms {
                    t.collect_vars(out);
                }
            }
            Expr::Cmp(_, lhs, rhs) | Expr::Implies(lhs, rhs) => {
                lhs.collect_vars(out);
                rhs.collect_vars(out);
            }
            Expr::Not(inner) => inner.collect_vars(out),
        }
    }

    pub fn free_vars(&self) -> IndexSet<String> {
        let mut out = IndexSet::new();
        self.collect_vars(&mut out);
        out
    }

    /// Evaluate under a total rational assignment. Used by the test suites
    /// to spot-check generated constraints on concrete states; this is an
    /// interpreter, not a simplifier.
    pub fn eval(&self, env: &IndexMap<String, Rational64>) -> Result<Value, EvalError> {
        match self {
            Expr::Const(c) => Ok(Value::Num(*c)),
            Expr::Var(name) => env
                .get(name)
                .map(|v| Value::Num(*v))
                .ok_or_else(|| EvalError::UnboundVariable(name.clone())),
            Expr::Add(terms) => {
                let mut acc = Rational64::zero();
                for t in terms {
                    acc += t.eval(env)?.into_num()?;
                }
                Ok(Value::Num(acc))
            }
            Expr::Mul(factors) => {
                let mut acc = Rational64::from_integer(1);
                for t in factors {
                    acc *= t.eval(env)?.into_num()?;
                }
                Ok(Value::Num(acc))
            }
            Expr::Cmp(op, lhs, rhs) => {
                let l = lhs.eval(env)?.into_num()?;
                let r = rhs.eval(env)?.into_num()?;
                let b = match op {
                    CmpOp::Eq => l == r,
                    CmpOp::Le => l <= r,
                    CmpOp::Lt => l < r,
                    CmpOp::Ge => l >= r,
                    CmpOp::Gt => l > r,
                };
                Ok(Value::Bool(b))
            }
            Expr::And(terms) => {
                for t in terms {
                    if !t.eval(env)?.into_bool()? {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Expr::Or(terms) => {
                for t in terms {
                    if t.eval(env)?.into_bool()? {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Expr::Not(inner) => Ok(Value::Bool(!inner.eval(env)?.into_bool()?)),
            Expr::Implies(lhs, rhs) => {
                let l = lhs.eval(env)?.into_bool()?;
                if !l {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(rhs.eval(env)?.into_bool()?))
            }
        }
    }

    pub fn eval_bool(&self, env: &IndexMap<String, Rational64>) -> Result<bool, EvalError> {
        self.eval(env)?.into_bool()
    }

    pub fn eval_num(&self, env: &IndexMap<String, Rational64>) -> Result<Rational64, EvalError> {
        self.eval(env)?.into_num()
    }
}

/// Result of evaluating an expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Num(Rational64),
    Bool(bool),
}

impl Value {
    pub fn into_num(self) -> Result<Rational64, EvalError> {
        match self {
            Value::Num(n) => Ok(n),
            Value::Bool(_) => Err(EvalError::SortMismatch("expected a numeric value")),
        }
    }

    pub fn into_bool(self) -> Result<bool, EvalError> {
        match self {
            Value::Bool(b) => Ok(b),
            Value::Num(_) => Err(EvalError::SortMismatch("expected a boolean value")),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum EvalError {
    #[error("unbound variable: {0}")]
    UnboundVariable(String),
    #[error("sort mismatch: {0}")]
    SortMismatch(&'static str),
}

fn fmt_const(c: &Rational64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if c.is_integer() {
        write!(f, "{}", c.numer())
    } else if c.is_negative() {
        write!(f, "-{}/{}", c.numer().abs(), c.denom())
    } else {
        write!(f, "{}/{}", c.numer(), c.denom())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(c) => fmt_const(c, f),
            Expr::Var(name) => write!(f, "{name}"),
            Expr::Add(terms) => {
                if terms.is_empty() {
                    return write!(f, "0");
                }
                for (i, t) in terms.iter().enumerate() {
                    if i > 0 {
                        write!(f, " + ")?;
                    }
                    write!(f, "{t}")?;
                }
                Ok(())
            }
            Expr::Mul(factors) => {
                if factors.is_empty() {
                    return write!(f, "1");
                }
                for (i, t) in factors.iter().enumerate() {
                    if i > 0 {
                        write!(f, "*")?;
                    }
                    match t {
                        Expr::Add(_) => write!(f, "({t})")?,
                        _ => write!(f, "{t}")?,
                    }
                }
                Ok(())
            }
            Expr::Cmp(op, lhs, rhs) => write!(f, "{lhs} {op} {rhs}"),
            Expr::And(terms) => {
                if terms.is_empty() {
                    return write!(f, "true");
                }
                for (i, t) in terms.iter().enumerate() {
                    if i > 0 {
                        write!(f, " && ")?;
                    }
                    match t {
                        Expr::Or(_) | Expr::Implies(_, _) => write!(f, "({t})")?,
                        _ => write!(f, "{t}")?,
                    }
                }
                Ok(())
            }
            Expr::Or(terms) => {
                if terms.is_empty() {
                    return write!(f, "false");
                }
                for (i, t) in terms.iter().enumerate() {
                    if i > 0 {
                        write!(f, " || ")?;
                    }
                    match t {
                        Expr::And(_) | Expr::Implies(_, _) => write!(f, "({t})")?,
                        _ => write!(f, "{t}")?,
                    }
                }
                Ok(())
            }
            Expr::Not(inner) => write!(f, "!({inner})"),
            Expr::Implies(lhs, rhs) => write!(f, "({lhs} -> {rhs})"),
        }
    }
}
