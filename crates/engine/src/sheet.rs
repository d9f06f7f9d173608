//! The sheet: sparse cell storage plus edit orchestration.
//!
//! All mutation funnels through [`Sheet::set_cell`] and
//! [`Sheet::clear_cell`], which keep the dependency graph and the
//! per-cell value caches consistent with the stored content. A rejected
//! edit leaves the sheet exactly as it was: validation, parsing, and
//! cycle detection all run before the first mutation.

use std::io::{self, Write};

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::cell::{Cell, CellValue};
use crate::dep_graph::DepGraph;
use crate::formula::eval::CellLookup;

/// Printable bounding box, in 1-based row/column counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub rows: i32,
    pub cols: i32,
}

/// A rejected edit. The sheet and the graph are unchanged whenever one
/// of these is returned.
#[derive(Debug, Clone, PartialEq)]
pub enum SheetError {
    /// The address lies outside the fixed sheet bounds.
    InvalidPosition(Address),
    /// The formula text could not be parsed.
    Parse(String),
    /// Accepting the edit would make the cell depend on itself.
    CircularDependency(Address),
}

impl std::fmt::Display for SheetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SheetError::InvalidPosition(addr) => {
                write!(f, "invalid position ({}, {})", addr.row, addr.col)
            }
            SheetError::Parse(msg) => write!(f, "formula parse error: {}", msg),
            SheetError::CircularDependency(addr) => {
                write!(f, "circular dependency at {}", addr)
            }
        }
    }
}

impl std::error::Error for SheetError {}

#[derive(Debug, Clone, Default)]
pub struct Sheet {
    cells: FxHashMap<Address, Cell>,
    deps: DepGraph,
}

impl Sheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `text` into the cell at `addr`.
    ///
    /// The edit is accepted or rejected as a whole:
    ///
    /// 1. out-of-bounds address → [`SheetError::InvalidPosition`]
    /// 2. malformed formula → [`SheetError::Parse`]
    /// 3. formula closing a reference loop →
    ///    [`SheetError::CircularDependency`]
    /// 4. otherwise: invalidate the caches of `addr` and every
    ///    transitive dependent, store the new content, swap the outgoing
    ///    edges, and materialize an empty record for each referenced
    ///    address not yet present.
    pub fn set_cell(&mut self, addr: Address, text: &str) -> Result<(), SheetError> {
        if !addr.is_valid() {
            return Err(SheetError::InvalidPosition(addr));
        }

        let cell = Cell::from_input(text).map_err(SheetError::Parse)?;
        let refs = cell.referenced_cells().to_vec();

        if self.deps.would_create_cycle(addr, &refs) {
            return Err(SheetError::CircularDependency(addr));
        }

        self.invalidate_from(addr);
        self.cells.insert(addr, cell);
        self.deps.replace_edges(addr, refs.iter().copied().collect());

        // Referenced-but-absent addresses become real empty records so
        // later graph and grid lookups are well-defined. They count
        // toward the printable bounding box from here on.
        for referenced in refs {
            self.cells.entry(referenced).or_insert(Cell::Empty);
        }

        Ok(())
    }

    /// Remove the record at `addr` entirely.
    ///
    /// Readers observe the same as an `Empty` cell; the printable
    /// bounding box stops counting the address. Formulas referencing it
    /// keep their edges and now read it as empty.
    pub fn clear_cell(&mut self, addr: Address) -> Result<(), SheetError> {
        if !addr.is_valid() {
            return Err(SheetError::InvalidPosition(addr));
        }

        self.invalidate_from(addr);
        self.cells.remove(&addr);
        self.deps.clear_cell(addr);

        Ok(())
    }

    /// The cell at `addr`, or `None` for an address that was never set.
    ///
    /// Out-of-bounds is an error so callers can tell "never set" from
    /// "not addressable".
    pub fn get_cell(&self, addr: Address) -> Result<Option<&Cell>, SheetError> {
        if !addr.is_valid() {
            return Err(SheetError::InvalidPosition(addr));
        }
        Ok(self.cells.get(&addr))
    }

    /// The dependency graph, for inspection.
    pub fn dep_graph(&self) -> &DepGraph {
        &self.deps
    }

    /// Smallest rectangle covering every stored record; `{0, 0}` when
    /// the sheet is empty.
    ///
    /// Recomputed on each call: records come and go by address, and a
    /// cached box would drift out of sync on clears.
    pub fn printable_size(&self) -> Size {
        let mut size = Size::default();
        for addr in self.cells.keys() {
            if addr.row >= size.rows {
                size.rows = addr.row + 1;
            }
            if addr.col >= size.cols {
                size.cols = addr.col + 1;
            }
        }
        size
    }

    /// Tab-separated cell values over the bounding box, one row per
    /// line. Absent cells render as empty fields.
    pub fn print_values<W: Write>(&self, out: &mut W) -> io::Result<()> {
        self.print_grid(out, |sheet, cell| cell.value(sheet).to_string())
    }

    /// Tab-separated raw cell texts over the bounding box, one row per
    /// line.
    pub fn print_texts<W: Write>(&self, out: &mut W) -> io::Result<()> {
        self.print_grid(out, |_, cell| cell.text())
    }

    fn print_grid<W, F>(&self, out: &mut W, render: F) -> io::Result<()>
    where
        W: Write,
        F: Fn(&Sheet, &Cell) -> String,
    {
        let size = self.printable_size();
        for row in 0..size.rows {
            for col in 0..size.cols {
                if col > 0 {
                    out.write_all(b"\t")?;
                }
                if let Some(cell) = self.cells.get(&Address::new(row, col)) {
                    write!(out, "{}", render(self, cell))?;
                }
            }
            writeln!(out)?;
        }
        Ok(())
    }

    /// Clear the memoized result of `start` and of every cell whose
    /// value could observe it, following reverse dependency edges.
    ///
    /// Each address is visited at most once. Invalidation itself is
    /// idempotent, so revisits would be harmless, just wasted work on
    /// diamond-shaped graphs.
    fn invalidate_from(&self, start: Address) {
        let mut visited: FxHashSet<Address> = FxHashSet::default();
        let mut stack = vec![start];

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            if let Some(cell) = self.cells.get(&current) {
                cell.invalidate_cache();
            }
            stack.extend(self.deps.dependents(current));
        }
    }
}

impl CellLookup for Sheet {
    fn value_at(&self, addr: Address) -> CellValue {
        match self.cells.get(&addr) {
            Some(cell) => cell.value(self),
            None => CellValue::Text(String::new()),
        }
    }
}
