//! Event sources: anything that can be read partition by partition.

use std::fmt;

use sf_core::{Error, Result};

use crate::column::{EventTable, Schema};

/// One independently readable slice of a source (a file, a chunk).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Position in the source; results are merged in this order.
    pub index: usize,
    /// Human-readable label used in logs and errors (file path, chunk id).
    pub label: String,
}

/// A columnar event source.
///
/// Implementations must be shareable across worker threads; each call to
/// [`EventSource::read_partition`] is independent.
pub trait EventSource: Send + Sync + fmt::Debug {
    /// Short description (used as `source_name` in execution errors).
    fn describe(&self) -> String;

    /// Columns available in every partition.
    fn schema(&self) -> &Schema;

    /// Partitions in read order.
    fn partitions(&self) -> Vec<Partition>;

    /// Read the requested columns of one partition.
    ///
    /// With an empty column list the returned table has no columns but still
    /// reports the partition's event count.
    fn read_partition(&self, index: usize, columns: &[String]) -> Result<EventTable>;
}

/// In-memory source over an [`EventTable`], split into fixed-size chunks.
#[derive(Debug, Clone)]
pub struct MemorySource {
    table: EventTable,
    schema: Schema,
    chunk_size: usize,
}

impl MemorySource {
    /// Whole table as a single partition.
    pub fn new(table: EventTable) -> Self {
        let chunk_size = table.n_events().max(1);
        Self { schema: table.schema(), table, chunk_size }
    }

    /// Split into partitions of at most `chunk_size` events.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Underlying table.
    pub fn table(&self) -> &EventTable {
        &self.table
    }
}

impl EventSource for MemorySource {
    fn describe(&self) -> String {
        format!("memory({} events)", self.table.n_events())
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn partitions(&self) -> Vec<Partition> {
        let n = self.table.n_events();
        (0..n.div_ceil(self.chunk_size))
            .map(|index| Partition { index, label: format!("memory[{index}]") })
            .collect()
    }

    fn read_partition(&self, index: usize, columns: &[String]) -> Result<EventTable> {
        let start = index * self.chunk_size;
        if start >= self.table.n_events() {
            return Err(Error::Validation(format!("partition {index} out of range")));
        }
        let end = (start + self.chunk_size).min(self.table.n_events());
        if columns.is_empty() {
            return Ok(EventTable::with_events(end - start));
        }
        Ok(self.table.select(columns)?.slice(start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column;

    #[test]
    fn chunks_cover_all_events() {
        let t = EventTable::from_columns([("x", Column::ints(0..10))]).unwrap();
        let src = MemorySource::new(t).with_chunk_size(4);
        let parts = src.partitions();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[2].label, "memory[2]");

        let cols = vec!["x".to_string()];
        let last = src.read_partition(2, &cols).unwrap();
        assert_eq!(last.get("x").unwrap().as_scalar().unwrap(), &[8.0, 9.0]);
        assert_eq!(src.read_partition(1, &[]).unwrap().n_events(), 4);
        assert!(src.read_partition(3, &cols).is_err());
    }

    #[test]
    fn unknown_column_is_reported() {
        let t = EventTable::from_columns([("x", Column::ints([1]))]).unwrap();
        let src = MemorySource::new(t);
        let err = src.read_partition(0, &["y".to_string()]).unwrap_err();
        assert!(matches!(err, Error::UnknownColumn(_)));
    }
}
