//! Gate parameters: concrete angles or symbolic expressions.
//!
//! Every parametrized gate carries [`Param`]s. A parameter is either a
//! concrete double-precision angle or a symbolic [`Expr`] over named
//! variables. Symbolic parameters must be substituted with concrete values
//! (see [`Param::bind`]) before any tensor can be constructed; evaluating an
//! expression with free variables fails with
//! [`ParamError::UnboundParameter`].

use std::fmt;
use rustc_hash::FxHashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ParamError {
    #[error("unbound symbolic parameter '{0}'")]
    UnboundParameter(String),
}
pub type ParamResult<T> = Result<T, ParamError>;

/// A real-valued symbolic expression over named variables.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// A constant value.
    Const(f64),
    /// A named free variable.
    Var(String),
    /// Negation.
    Neg(Box<Expr>),
    /// Sum of two expressions.
    Add(Box<Expr>, Box<Expr>),
    /// Difference of two expressions.
    Sub(Box<Expr>, Box<Expr>),
    /// Product of two expressions.
    Mul(Box<Expr>, Box<Expr>),
    /// Quotient of two expressions.
    Div(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Create a new free variable.
    pub fn var<S>(name: S) -> Self
    where S: Into<String>
    {
        Self::Var(name.into())
    }

    /// Evaluate to a concrete value, failing on the first free variable
    /// encountered that `bindings` does not cover.
    pub fn eval(&self, bindings: &FxHashMap<String, f64>) -> ParamResult<f64> {
        match self {
            Self::Const(x) => Ok(*x),
            Self::Var(name) => {
                bindings.get(name).copied()
                    .ok_or_else(|| ParamError::UnboundParameter(name.clone()))
            },
            Self::Neg(x) => Ok(-x.eval(bindings)?),
            Self::Add(l, r) => Ok(l.eval(bindings)? + r.eval(bindings)?),
            Self::Sub(l, r) => Ok(l.eval(bindings)? - r.eval(bindings)?),
            Self::Mul(l, r) => Ok(l.eval(bindings)? * r.eval(bindings)?),
            Self::Div(l, r) => Ok(l.eval(bindings)? / r.eval(bindings)?),
        }
    }

    /// Collect the names of all free variables into `acc`.
    pub fn free_vars(&self, acc: &mut Vec<String>) {
        match self {
            Self::Const(_) => { },
            Self::Var(name) => {
                if !acc.contains(name) { acc.push(name.clone()); }
            },
            Self::Neg(x) => { x.free_vars(acc); },
            Self::Add(l, r) | Self::Sub(l, r)
            | Self::Mul(l, r) | Self::Div(l, r) => {
                l.free_vars(acc);
                r.free_vars(acc);
            },
        }
    }
}

impl From<f64> for Expr {
    fn from(x: f64) -> Self { Self::Const(x) }
}

impl From<&str> for Expr {
    fn from(name: &str) -> Self { Self::Var(name.to_string()) }
}

macro_rules! impl_expr_binop {
    ( $trait:ident, $fun:ident, $variant:ident ) => {
        impl std::ops::$trait<Expr> for Expr {
            type Output = Expr;

            fn $fun(self, rhs: Expr) -> Self::Output {
                Expr::$variant(self.into(), rhs.into())
            }
        }
    }
}
impl_expr_binop!(Add, add, Add);
impl_expr_binop!(Sub, sub, Sub);
impl_expr_binop!(Mul, mul, Mul);
impl_expr_binop!(Div, div, Div);

impl std::ops::Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Self::Output { Expr::Neg(self.into()) }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const(x) => x.fmt(f),
            Self::Var(name) => name.fmt(f),
            Self::Neg(x) => write!(f, "-({x})"),
            Self::Add(l, r) => write!(f, "({l} + {r})"),
            Self::Sub(l, r) => write!(f, "({l} - {r})"),
            Self::Mul(l, r) => write!(f, "({l} * {r})"),
            Self::Div(l, r) => write!(f, "({l} / {r})"),
        }
    }
}

/// A single gate parameter: a concrete angle or a symbolic expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Param {
    /// A concrete double-precision value, in radians for rotation angles.
    Concrete(f64),
    /// A symbolic expression awaiting substitution.
    Symbolic(Expr),
}

impl Param {
    /// Return `true` if `self` holds a concrete value.
    pub fn is_concrete(&self) -> bool { matches!(self, Self::Concrete(_)) }

    /// Return the concrete value, failing if any variable is unbound.
    pub fn value(&self) -> ParamResult<f64> {
        match self {
            Self::Concrete(x) => Ok(*x),
            Self::Symbolic(expr) => expr.eval(&FxHashMap::default()),
        }
    }

    /// Substitute bound variables, collapsing to a concrete value when no
    /// free variables remain.
    pub fn bind(&self, bindings: &FxHashMap<String, f64>) -> Param {
        match self {
            Self::Concrete(x) => Self::Concrete(*x),
            Self::Symbolic(expr) => {
                match expr.eval(bindings) {
                    Ok(x) => Self::Concrete(x),
                    Err(_) => Self::Symbolic(substitute(expr, bindings)),
                }
            },
        }
    }

    /// Negate, preserving symbolic structure.
    pub fn neg(&self) -> Param {
        match self {
            Self::Concrete(x) => Self::Concrete(-*x),
            Self::Symbolic(expr) => Self::Symbolic(-expr.clone()),
        }
    }

    /// Names of all free variables.
    pub fn free_vars(&self) -> Vec<String> {
        match self {
            Self::Concrete(_) => Vec::new(),
            Self::Symbolic(expr) => {
                let mut acc = Vec::new();
                expr.free_vars(&mut acc);
                acc
            },
        }
    }
}

// replace bound variables by constants, leaving the rest of the tree alone
fn substitute(expr: &Expr, bindings: &FxHashMap<String, f64>) -> Expr {
    match expr {
        Expr::Const(x) => Expr::Const(*x),
        Expr::Var(name) => {
            bindings.get(name).copied()
                .map_or_else(|| Expr::Var(name.clone()), Expr::Const)
        },
        Expr::Neg(x) => Expr::Neg(substitute(x, bindings).into()),
        Expr::Add(l, r) =>
            Expr::Add(substitute(l, bindings).into(), substitute(r, bindings).into()),
        Expr::Sub(l, r) =>
            Expr::Sub(substitute(l, bindings).into(), substitute(r, bindings).into()),
        Expr::Mul(l, r) =>
            Expr::Mul(substitute(l, bindings).into(), substitute(r, bindings).into()),
        Expr::Div(l, r) =>
            Expr::Div(substitute(l, bindings).into(), substitute(r, bindings).into()),
    }
}

impl From<f64> for Param {
    fn from(x: f64) -> Self { Self::Concrete(x) }
}

impl From<&str> for Param {
    fn from(name: &str) -> Self { Self::Symbolic(Expr::var(name)) }
}

impl From<Expr> for Param {
    fn from(expr: Expr) -> Self { Self::Symbolic(expr) }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Concrete(x) => x.fmt(f),
            Self::Symbolic(expr) => expr.fmt(f),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn bindings(pairs: &[(&str, f64)]) -> FxHashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn eval_concrete() {
        let p = Param::from(1.5);
        assert_eq!(p.value(), Ok(1.5));
    }

    #[test]
    fn eval_unbound() {
        let p = Param::from("theta");
        assert_eq!(
            p.value(),
            Err(ParamError::UnboundParameter("theta".to_string())),
        );
    }

    #[test]
    fn bind_collapses() {
        let expr = Expr::var("theta") * Expr::Const(2.0);
        let p = Param::from(expr).bind(&bindings(&[("theta", 0.5)]));
        assert!(p.is_concrete());
        assert_eq!(p.value(), Ok(1.0));
    }

    #[test]
    fn bind_partial() {
        let expr = Expr::var("a") + Expr::var("b");
        let p = Param::from(expr).bind(&bindings(&[("a", 1.0)]));
        assert!(!p.is_concrete());
        assert_eq!(
            p.value(),
            Err(ParamError::UnboundParameter("b".to_string())),
        );
        let p = p.bind(&bindings(&[("b", 2.0)]));
        assert_eq!(p.value(), Ok(3.0));
    }

    #[test]
    fn neg_roundtrip() {
        let p = Param::from("phi").neg();
        let p = p.bind(&bindings(&[("phi", 0.25)]));
        assert_eq!(p.value(), Ok(-0.25));
    }
}
