//! Typed filter-graph expressions.
//!
//! Overlay positions and enable predicates are built as [`Expr`] trees and
//! only serialized to the engine's expression syntax at the last moment, so
//! the animation law can be evaluated and tested as data.

use std::fmt;

/// Variables the overlay filter exposes to its expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Var {
    /// Playback time in seconds.
    Time,
    MainW,
    MainH,
    OverlayW,
    OverlayH,
}

impl Var {
    fn name(self) -> &'static str {
        match self {
            Self::Time => "t",
            Self::MainW => "main_w",
            Self::MainH => "main_h",
            Self::OverlayW => "overlay_w",
            Self::OverlayH => "overlay_h",
        }
    }
}

/// Arithmetic / predicate expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Var(Var),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    /// 1 when the left side is strictly less than the right, else 0.
    Lt(Box<Expr>, Box<Expr>),
    /// 1 when `lo <= value <= hi`, else 0.
    Between(Box<Expr>, Box<Expr>, Box<Expr>),
    /// `cond != 0 ? then : otherwise`
    If(Box<Expr>, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn num(value: f64) -> Self {
        Self::Num(value)
    }

    pub fn var(var: Var) -> Self {
        Self::Var(var)
    }

    pub fn t() -> Self {
        Self::Var(Var::Time)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn add(self, rhs: Expr) -> Self {
        Self::Add(Box::new(self), Box::new(rhs))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn sub(self, rhs: Expr) -> Self {
        Self::Sub(Box::new(self), Box::new(rhs))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn mul(self, rhs: Expr) -> Self {
        Self::Mul(Box::new(self), Box::new(rhs))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn div(self, rhs: Expr) -> Self {
        Self::Div(Box::new(self), Box::new(rhs))
    }

    pub fn lt(self, rhs: Expr) -> Self {
        Self::Lt(Box::new(self), Box::new(rhs))
    }

    pub fn between(self, lo: Expr, hi: Expr) -> Self {
        Self::Between(Box::new(self), Box::new(lo), Box::new(hi))
    }

    pub fn if_else(cond: Expr, then: Expr, otherwise: Expr) -> Self {
        Self::If(Box::new(cond), Box::new(then), Box::new(otherwise))
    }

    /// Evaluate against concrete variable values.
    pub fn eval(&self, env: &EvalEnv) -> f64 {
        match self {
            Self::Num(v) => *v,
            Self::Var(var) => env.get(*var),
            Self::Add(a, b) => a.eval(env) + b.eval(env),
            Self::Sub(a, b) => a.eval(env) - b.eval(env),
            Self::Mul(a, b) => a.eval(env) * b.eval(env),
            Self::Div(a, b) => a.eval(env) / b.eval(env),
            Self::Lt(a, b) => bool_num(a.eval(env) < b.eval(env)),
            Self::Between(v, lo, hi) => {
                let v = v.eval(env);
                bool_num(lo.eval(env) <= v && v <= hi.eval(env))
            }
            Self::If(cond, then, otherwise) => {
                if cond.eval(env) != 0.0 {
                    then.eval(env)
                } else {
                    otherwise.eval(env)
                }
            }
        }
    }

    /// Evaluate as a predicate.
    pub fn holds(&self, env: &EvalEnv) -> bool {
        self.eval(env) != 0.0
    }
}

fn bool_num(value: bool) -> f64 {
    if value { 1.0 } else { 0.0 }
}

fn fmt_num(f: &mut fmt::Formatter<'_>, value: f64) -> fmt::Result {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        write!(f, "{}", value as i64)
    } else {
        write!(f, "{}", value)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(v) => fmt_num(f, *v),
            Self::Var(var) => f.write_str(var.name()),
            Self::Add(a, b) => write!(f, "({a}+{b})"),
            Self::Sub(a, b) => write!(f, "({a}-{b})"),
            Self::Mul(a, b) => write!(f, "({a}*{b})"),
            Self::Div(a, b) => write!(f, "({a}/{b})"),
            Self::Lt(a, b) => write!(f, "lt({a},{b})"),
            Self::Between(v, lo, hi) => write!(f, "between({v},{lo},{hi})"),
            Self::If(c, a, b) => write!(f, "if({c},{a},{b})"),
        }
    }
}

/// Variable bindings for [`Expr::eval`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EvalEnv {
    pub t: f64,
    pub main_w: f64,
    pub main_h: f64,
    pub overlay_w: f64,
    pub overlay_h: f64,
}

impl EvalEnv {
    pub fn get(&self, var: Var) -> f64 {
        match var {
            Var::Time => self.t,
            Var::MainW => self.main_w,
            Var::MainH => self.main_h,
            Var::OverlayW => self.overlay_w,
            Var::OverlayH => self.overlay_h,
        }
    }

    pub fn at(self, t: f64) -> Self {
        Self { t, ..self }
    }
}

/// One `overlay` filter node of a filter graph.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayNode {
    pub base: String,
    pub overlay: String,
    pub x: Expr,
    pub y: Expr,
    pub enable: Option<Expr>,
    pub shortest: bool,
    pub output: String,
}

impl fmt::Display for OverlayNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Expressions are quoted: their commas would otherwise split the graph.
        write!(
            f,
            "[{}][{}]overlay=x='{}':y='{}'",
            self.base, self.overlay, self.x, self.y
        )?;
        if let Some(enable) = &self.enable {
            write!(f, ":enable='{}'", enable)?;
        }
        if self.shortest {
            f.write_str(":shortest=1")?;
        }
        write!(f, "[{}]", self.output)
    }
}
