//! Formula evaluation.
//!
//! Evaluation walks the expression tree and reads referenced cells
//! through the [`CellLookup`] supplied by the caller. A failure is an
//! in-band value, not a panic or an abort: it becomes the evaluated
//! cell's result and propagates to any formula that reads that cell.

use serde::{Deserialize, Serialize};

use super::parser::{Expr, Op};
use crate::address::Address;
use crate::cell::CellValue;

/// Formula runtime error. Stored as a cell value, never unwound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvalError {
    /// Division by zero.
    DivByZero,
    /// An operand could not be read as a number.
    Value,
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            EvalError::DivByZero => "#DIV/0!",
            EvalError::Value => "#VALUE!",
        };
        f.write_str(code)
    }
}

/// Read access to cell values during evaluation.
///
/// `Sheet` implements this; tests substitute simple maps. Reading a cell
/// may recursively evaluate it, so implementations must only be handed
/// expressions that passed cycle detection.
pub trait CellLookup {
    /// The current value at `addr`. Absent cells report empty text.
    fn value_at(&self, addr: Address) -> CellValue;
}

pub fn evaluate<L: CellLookup>(expr: &Expr, lookup: &L) -> Result<f64, EvalError> {
    match expr {
        Expr::Number(n) => Ok(*n),
        Expr::Ref(addr) => number_at(*addr, lookup),
        Expr::Neg(operand) => Ok(-evaluate(operand, lookup)?),
        Expr::BinaryOp { op, left, right } => {
            let l = evaluate(left, lookup)?;
            let r = evaluate(right, lookup)?;
            match op {
                Op::Add => Ok(l + r),
                Op::Sub => Ok(l - r),
                Op::Mul => Ok(l * r),
                Op::Div => {
                    if r == 0.0 {
                        Err(EvalError::DivByZero)
                    } else {
                        Ok(l / r)
                    }
                }
            }
        }
    }
}

/// Numeric reading of a referenced cell: numbers pass through, empty
/// reads as zero, numeric-looking text coerces, anything else is
/// `#VALUE!`. Error values propagate unchanged.
fn number_at<L: CellLookup>(addr: Address, lookup: &L) -> Result<f64, EvalError> {
    match lookup.value_at(addr) {
        CellValue::Number(n) => Ok(n),
        CellValue::Text(s) if s.is_empty() => Ok(0.0),
        CellValue::Text(s) => s.parse::<f64>().map_err(|_| EvalError::Value),
        CellValue::Error(e) => Err(e),
    }
}
