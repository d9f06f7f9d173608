//! Cell content variants and the per-cell value cache.
//!
//! The stored variant is fully determined by the raw text last written:
//! empty input is `Empty`, `=` followed by at least one character is
//! `Formula` (the parser runs eagerly and a malformed formula is a hard
//! failure, not text), everything else is `Text`. Formula cells memoize
//! their evaluation result until the sheet invalidates them.

use std::cell::RefCell;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::formula::eval::{self, CellLookup, EvalError};
use crate::formula::parser::{self, Expr};

/// Leading marker that turns input into a formula.
pub const FORMULA_MARKER: char = '=';
/// Leading marker that keeps input textual; stripped from the value,
/// kept in the text.
pub const ESCAPE_MARKER: char = '\'';

/// What reading a cell produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Error(EvalError),
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Text(s) => f.write_str(s),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Error(e) => write!(f, "{}", e),
        }
    }
}

/// One stored cell.
#[derive(Debug, Clone)]
pub enum Cell {
    Empty,
    Text(String),
    Formula(FormulaCell),
}

/// Formula content: the parsed expression, its reference list, and the
/// memoized evaluation result.
#[derive(Debug, Clone)]
pub struct FormulaCell {
    expr: Expr,
    refs: Vec<Address>,
    cache: RefCell<Option<Result<f64, EvalError>>>,
}

impl Cell {
    /// Classify raw input and build the matching variant.
    ///
    /// A lone `=` is text, not an empty formula.
    pub fn from_input(text: &str) -> Result<Cell, String> {
        if text.is_empty() {
            Ok(Cell::Empty)
        } else if text.len() > 1 && text.starts_with(FORMULA_MARKER) {
            let expr = parser::parse(&text[1..])?;
            let refs = expr.referenced_cells();
            Ok(Cell::Formula(FormulaCell {
                expr,
                refs,
                cache: RefCell::new(None),
            }))
        } else {
            Ok(Cell::Text(text.to_string()))
        }
    }

    /// The raw text form: empty string, the text verbatim, or `=` plus
    /// the canonical rendering of the expression.
    pub fn text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Formula(formula) => format!("{}{}", FORMULA_MARKER, formula.expr),
        }
    }

    /// The observable value. Formula results are memoized until the next
    /// [`Cell::invalidate_cache`].
    pub fn value<L: CellLookup>(&self, lookup: &L) -> CellValue {
        match self {
            Cell::Empty => CellValue::Text(String::new()),
            Cell::Text(s) => match s.strip_prefix(ESCAPE_MARKER) {
                Some(rest) => CellValue::Text(rest.to_string()),
                None => CellValue::Text(s.clone()),
            },
            Cell::Formula(formula) => formula.value(lookup),
        }
    }

    /// Addresses this cell's formula reads, sorted and deduplicated.
    /// Empty for non-formula content.
    pub fn referenced_cells(&self) -> &[Address] {
        match self {
            Cell::Formula(formula) => &formula.refs,
            _ => &[],
        }
    }

    /// Drop the memoized formula result. A no-op for other variants and
    /// for an already-clear cache.
    pub fn invalidate_cache(&self) {
        if let Cell::Formula(formula) = self {
            formula.cache.borrow_mut().take();
        }
    }

    pub fn is_formula(&self) -> bool {
        matches!(self, Cell::Formula(_))
    }
}

impl FormulaCell {
    fn value<L: CellLookup>(&self, lookup: &L) -> CellValue {
        let cached = *self.cache.borrow();
        let result = match cached {
            Some(result) => result,
            None => {
                // The borrow is released before evaluation: reading a
                // referenced cell may populate that cell's own cache.
                let result = eval::evaluate(&self.expr, lookup);
                *self.cache.borrow_mut() = Some(result);
                result
            }
        };
        match result {
            Ok(n) => CellValue::Number(n),
            Err(e) => CellValue::Error(e),
        }
    }

    /// Whether a result is currently memoized.
    pub fn is_cached(&self) -> bool {
        self.cache.borrow().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Lookup that counts how often each address is read.
    struct CountingLookup {
        values: HashMap<Address, CellValue>,
        reads: RefCell<usize>,
    }

    impl CountingLookup {
        fn new() -> Self {
            Self {
                values: HashMap::new(),
                reads: RefCell::new(0),
            }
        }

        fn with(mut self, name: &str, value: CellValue) -> Self {
            self.values.insert(Address::parse(name), value);
            self
        }
    }

    impl CellLookup for CountingLookup {
        fn value_at(&self, addr: Address) -> CellValue {
            *self.reads.borrow_mut() += 1;
            self.values
                .get(&addr)
                .cloned()
                .unwrap_or_else(|| CellValue::Text(String::new()))
        }
    }

    #[test]
    fn test_empty_classification() {
        let cell = Cell::from_input("").unwrap();
        assert!(matches!(cell, Cell::Empty));
        assert_eq!(cell.text(), "");
        assert_eq!(
            cell.value(&CountingLookup::new()),
            CellValue::Text(String::new())
        );
    }

    #[test]
    fn test_text_classification() {
        let cell = Cell::from_input("hello").unwrap();
        assert_eq!(cell.text(), "hello");
        assert_eq!(
            cell.value(&CountingLookup::new()),
            CellValue::Text("hello".to_string())
        );
        assert!(cell.referenced_cells().is_empty());
    }

    #[test]
    fn test_lone_marker_chars_are_text() {
        assert!(matches!(Cell::from_input("=").unwrap(), Cell::Text(_)));
        assert!(matches!(Cell::from_input("'").unwrap(), Cell::Text(_)));
    }

    #[test]
    fn test_escape_marker_stripped_from_value_only() {
        let cell = Cell::from_input("'123").unwrap();
        assert_eq!(cell.text(), "'123");
        assert_eq!(
            cell.value(&CountingLookup::new()),
            CellValue::Text("123".to_string())
        );
        // The marker escapes a would-be formula too.
        let cell = Cell::from_input("'=1+2").unwrap();
        assert_eq!(cell.text(), "'=1+2");
        assert_eq!(
            cell.value(&CountingLookup::new()),
            CellValue::Text("=1+2".to_string())
        );
    }

    #[test]
    fn test_formula_classification_and_canonical_text() {
        let cell = Cell::from_input("= 1 +  2*3").unwrap();
        assert!(cell.is_formula());
        assert_eq!(cell.text(), "=1+2*3");
        assert_eq!(
            cell.value(&CountingLookup::new()),
            CellValue::Number(7.0)
        );
    }

    #[test]
    fn test_malformed_formula_is_an_error_not_text() {
        assert!(Cell::from_input("=1+").is_err());
        assert!(Cell::from_input("=)").is_err());
    }

    #[test]
    fn test_formula_referenced_cells() {
        let cell = Cell::from_input("=B2+A1+B2").unwrap();
        assert_eq!(
            cell.referenced_cells(),
            &[Address::new(0, 0), Address::new(1, 1)]
        );
    }

    #[test]
    fn test_formula_value_is_memoized() {
        let lookup = CountingLookup::new().with("A1", CellValue::Number(5.0));
        let cell = Cell::from_input("=A1*2").unwrap();

        assert_eq!(cell.value(&lookup), CellValue::Number(10.0));
        assert_eq!(cell.value(&lookup), CellValue::Number(10.0));
        // Second read served from the cache.
        assert_eq!(*lookup.reads.borrow(), 1);
    }

    #[test]
    fn test_invalidate_cache_forces_recompute() {
        let lookup = CountingLookup::new().with("A1", CellValue::Number(5.0));
        let cell = Cell::from_input("=A1*2").unwrap();

        assert_eq!(cell.value(&lookup), CellValue::Number(10.0));
        cell.invalidate_cache();
        // Repeated invalidation of a clear cache is fine.
        cell.invalidate_cache();
        assert_eq!(cell.value(&lookup), CellValue::Number(10.0));
        assert_eq!(*lookup.reads.borrow(), 2);
    }

    #[test]
    fn test_error_results_are_cached_values() {
        let lookup = CountingLookup::new();
        let cell = Cell::from_input("=1/0").unwrap();
        assert_eq!(cell.value(&lookup), CellValue::Error(EvalError::DivByZero));
        if let Cell::Formula(formula) = &cell {
            assert!(formula.is_cached());
        }
    }

    #[test]
    fn test_cell_value_display() {
        assert_eq!(CellValue::Text("x".to_string()).to_string(), "x");
        assert_eq!(CellValue::Number(10.0).to_string(), "10");
        assert_eq!(CellValue::Number(2.5).to_string(), "2.5");
        assert_eq!(
            CellValue::Error(EvalError::Value).to_string(),
            "#VALUE!"
        );
    }
}
