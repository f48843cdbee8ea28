//! Batched reads over an executed select.

use std::iter::FusedIterator;

use crate::engine::{Row, Session};
use crate::error::DbResult;

/// Lazy sequence of row batches from one executed select.
///
/// Not restartable: once it ends, run the select again for a fresh pass.
pub struct Batches<'a, S: Session> {
    session: &'a mut S,
    batch_size: usize,
    done: bool,
}

impl<'a, S: Session> Batches<'a, S> {
    pub(crate) fn new(session: &'a mut S, batch_size: usize) -> Self {
        Self {
            session,
            batch_size,
            done: false,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl<S: Session> Iterator for Batches<'_, S> {
    type Item = DbResult<Vec<Row>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.session.fetch_many(self.batch_size) {
            Ok(rows) if rows.is_empty() => {
                self.done = true;
                None
            }
            Ok(rows) => Some(Ok(rows)),
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl<S: Session> FusedIterator for Batches<'_, S> {}
