//! Result row sequences
//!
//! [`Results`] borrows the executor that produced it, so it cannot outlive
//! the connection whose arena holds the tuple table. Rows are decoded on
//! first access and cached; every access re-checks the tuple table through
//! the registry first. Dropping a [`Results`] frees its tuple table.

use std::cell::OnceCell;
use std::fmt;

use tracing::warn;

use super::decode::FromRow;
use crate::error::{Error, Result};
use crate::host::Host;
use crate::memory::{MemoryContext, TrackedPtr};
use crate::types::ColumnDesc;

pub struct Results<'e, R> {
    host: &'e Host,
    tuptable: TrackedPtr,
    columns: Vec<ColumnDesc>,
    rows: Vec<OnceCell<R>>,
}

impl<'e, R: FromRow> Results<'e, R> {
    pub(crate) fn new(
        host: &'e Host,
        tuptable: TrackedPtr,
        columns: Vec<ColumnDesc>,
        processed: usize,
    ) -> Self {
        Self {
            host,
            tuptable,
            columns,
            rows: (0..processed).map(|_| OnceCell::new()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row descriptor of the execution
    pub fn columns(&self) -> &[ColumnDesc] {
        &self.columns
    }

    /// Tracked handle of the underlying tuple table
    pub fn tuptable(&self) -> TrackedPtr {
        self.tuptable
    }

    /// Row `index`, decoded on first access
    pub fn get(&self, index: usize) -> Result<&R> {
        let cell = self.rows.get(index).ok_or(Error::OutOfBounds {
            index,
            len: self.rows.len(),
        })?;

        MemoryContext::for_pointer(self.host, self.tuptable)?;

        if let Some(row) = cell.get() {
            return Ok(row);
        }
        let values = self.host.native_row(self.tuptable.ptr(), index)?;
        let row = R::from_row(values)?;
        Ok(cell.get_or_init(|| row))
    }

    pub fn first(&self) -> Result<Option<&R>> {
        if self.is_empty() {
            return Ok(None);
        }
        self.get(0).map(Some)
    }

    /// Iterate in order; may be called any number of times
    pub fn iter(&self) -> Iter<'_, 'e, R> {
        Iter {
            results: self,
            next: 0,
            done: false,
        }
    }

    /// Decode every row into an owned vector that outlives the executor
    pub fn into_vec(mut self) -> Result<Vec<R>> {
        MemoryContext::for_pointer(self.host, self.tuptable)?;
        let rows = std::mem::take(&mut self.rows);
        let mut out = Vec::with_capacity(rows.len());
        for (index, cell) in rows.into_iter().enumerate() {
            let row = match cell.into_inner() {
                Some(row) => row,
                None => R::from_row(self.host.native_row(self.tuptable.ptr(), index)?)?,
            };
            out.push(row);
        }
        Ok(out)
    }
}

// Frees the tuple table early; the connection arena would release it anyway
impl<R> Drop for Results<'_, R> {
    fn drop(&mut self) {
        if MemoryContext::for_pointer(self.host, self.tuptable).is_err() {
            return;
        }
        if let Err(e) = self.host.free_tuptable(self.tuptable.ptr()) {
            warn!(tuptable = %self.tuptable, error = %e, "failed to free tuple table");
        }
    }
}

impl<R> fmt::Debug for Results<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Results")
            .field("tuptable", &self.tuptable)
            .field("columns", &self.columns)
            .field("len", &self.rows.len())
            .finish()
    }
}

/// Iterator over a [`Results`]; stops after the first error
pub struct Iter<'r, 'e, R> {
    results: &'r Results<'e, R>,
    next: usize,
    done: bool,
}

impl<'r, 'e, R: FromRow> Iterator for Iter<'r, 'e, R> {
    type Item = Result<&'r R>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.next >= self.results.len() {
            return None;
        }
        let item = self.results.get(self.next);
        self.next += 1;
        if item.is_err() {
            self.done = true;
        }
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            return (0, Some(0));
        }
        (0, Some(self.results.len() - self.next))
    }
}

impl<R: FromRow> std::iter::FusedIterator for Iter<'_, '_, R> {}

impl<'r, 'e, R: FromRow> IntoIterator for &'r Results<'e, R> {
    type Item = Result<&'r R>;
    type IntoIter = Iter<'r, 'e, R>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
