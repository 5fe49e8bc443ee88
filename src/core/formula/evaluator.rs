//! Evaluates a parsed arithmetic expression to a finite `f64`

use super::parser::{BinaryOp, Expr};
use std::collections::HashMap;

/// Error during evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct EvalError {
    pub message: String,
}

impl EvalError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Evaluation error: {}", self.message)
    }
}

impl std::error::Error for EvalError {}

/// Evaluate `expr` with the given variable bindings
pub fn evaluate(expr: &Expr, vars: &HashMap<String, f64>) -> Result<f64, EvalError> {
    let value = eval(expr, vars)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EvalError::new(format!("Result is not finite: {}", value)))
    }
}

fn eval(expr: &Expr, vars: &HashMap<String, f64>) -> Result<f64, EvalError> {
    match expr {
        Expr::Number(n) => Ok(*n),
        Expr::Variable(name) => lookup(name, vars),
        Expr::Negate(operand) => Ok(-eval(operand, vars)?),
        Expr::Binary { op, left, right } => {
            let l = eval(left, vars)?;
            let r = eval(right, vars)?;
            binary(*op, l, r)
        }
        Expr::Call { name, args } => {
            let values = args
                .iter()
                .map(|arg| eval(arg, vars))
                .collect::<Result<Vec<_>, _>>()?;
            call(name, &values)
        }
    }
}

fn lookup(name: &str, vars: &HashMap<String, f64>) -> Result<f64, EvalError> {
    if let Some(value) = vars.get(name) {
        return Ok(*value);
    }
    match name.to_ascii_lowercase().as_str() {
        "pi" | "π" => Ok(std::f64::consts::PI),
        "e" => Ok(std::f64::consts::E),
        _ => Err(EvalError::new(format!("Unknown variable: {}", name))),
    }
}

fn binary(op: BinaryOp, l: f64, r: f64) -> Result<f64, EvalError> {
    match op {
        BinaryOp::Add => Ok(l + r),
        BinaryOp::Sub => Ok(l - r),
        BinaryOp::Mul => Ok(l * r),
        BinaryOp::Div if r == 0.0 => Err(EvalError::new("Division by zero")),
        BinaryOp::Div => Ok(l / r),
        BinaryOp::Rem if r == 0.0 => Err(EvalError::new("Division by zero")),
        BinaryOp::Rem => Ok(l % r),
        BinaryOp::Pow => Ok(l.powf(r)),
    }
}

fn call(name: &str, args: &[f64]) -> Result<f64, EvalError> {
    let lower = name.to_ascii_lowercase();
    let [x] = args else {
        return Err(EvalError::new(format!(
            "Function {} expects 1 argument, got {}",
            name,
            args.len()
        )));
    };
    let x = *x;

    let value = match lower.as_str() {
        "abs" => x.abs(),
        "acos" => x.acos(),
        "asin" => x.asin(),
        "atan" => x.atan(),
        "cbrt" => x.cbrt(),
        "ceil" => x.ceil(),
        "cos" => x.cos(),
        "cosh" => x.cosh(),
        "exp" => x.exp(),
        "floor" => x.floor(),
        "log" => x.ln(),
        "log10" => x.log10(),
        "log2" => x.log2(),
        "round" => x.round(),
        "sin" => x.sin(),
        "sinh" => x.sinh(),
        "sqrt" => x.sqrt(),
        "tan" => x.tan(),
        "tanh" => x.tanh(),
        "signum" => {
            if x == 0.0 {
                0.0
            } else {
                x.signum()
            }
        }
        _ => return Err(EvalError::new(format!("Unknown function: {}", name))),
    };
    Ok(value)
}
