//! Columnar event storage: scalar and jagged columns, tables and schemas.
//!
//! All values are stored as `f64` (booleans as 0/1, integers exactly up to
//! 2^53); the [`DType`] tag records what the values mean so writers can emit
//! the right physical type.

use indexmap::IndexMap;
use sf_core::{ColumnType, DType, Error, NameKind, Result, Shape};

/// Variable-length per-event array column.
#[derive(Debug, Clone, PartialEq)]
pub struct JaggedCol {
    /// Flat array of all values across all entries.
    pub flat: Vec<f64>,
    /// Entry boundaries: `offsets.len() == n_entries + 1`.
    pub offsets: Vec<usize>,
}

impl JaggedCol {
    /// Build from raw parts, validating the offsets.
    pub fn new(flat: Vec<f64>, offsets: Vec<usize>) -> Result<Self> {
        if offsets.first() != Some(&0) {
            return Err(Error::Validation("jagged offsets must start at 0".into()));
        }
        if offsets.windows(2).any(|w| w[1] < w[0]) {
            return Err(Error::Validation("jagged offsets must be non-decreasing".into()));
        }
        if offsets.last() != Some(&flat.len()) {
            return Err(Error::Validation(format!(
                "jagged offsets end at {:?} but {} values are stored",
                offsets.last(),
                flat.len()
            )));
        }
        Ok(Self { flat, offsets })
    }

    /// Column with zero entries.
    pub fn empty() -> Self {
        Self { flat: Vec::new(), offsets: vec![0] }
    }

    /// Build from one slice per entry.
    pub fn from_rows<I, R>(rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: AsRef<[f64]>,
    {
        let mut out = Self::empty();
        for row in rows {
            out.push_row(row.as_ref());
        }
        out
    }

    /// Append one entry.
    pub fn push_row(&mut self, row: &[f64]) {
        self.flat.extend_from_slice(row);
        self.offsets.push(self.flat.len());
    }

    /// Number of entries.
    pub fn n_entries(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Values of entry `row`.
    pub fn row(&self, row: usize) -> &[f64] {
        &self.flat[self.offsets[row]..self.offsets[row + 1]]
    }

    /// Length of entry `row`.
    pub fn row_len(&self, row: usize) -> usize {
        self.offsets[row + 1] - self.offsets[row]
    }

    /// Gather the given entries, in order.
    pub fn take(&self, rows: &[usize]) -> Self {
        let mut out = Self { flat: Vec::new(), offsets: Vec::with_capacity(rows.len() + 1) };
        out.offsets.push(0);
        for &r in rows {
            out.push_row(self.row(r));
        }
        out
    }

    /// Append all entries of `other`.
    pub fn extend(&mut self, other: &JaggedCol) {
        let base = self.flat.len();
        self.flat.extend_from_slice(&other.flat);
        self.offsets.extend(other.offsets[1..].iter().map(|o| o + base));
    }
}

/// Physical storage of a [`Column`].
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// One value per event.
    Scalar(Vec<f64>),
    /// Variable-length array per event.
    Jagged(JaggedCol),
}

/// A typed column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    dtype: DType,
    data: ColumnData,
}

impl Column {
    /// Wrap raw data with its element type.
    pub fn new(dtype: DType, data: ColumnData) -> Self {
        Self { dtype, data }
    }

    /// Scalar boolean column.
    pub fn bools(values: impl IntoIterator<Item = bool>) -> Self {
        let v = values.into_iter().map(|b| if b { 1.0 } else { 0.0 }).collect();
        Self::new(DType::Bool, ColumnData::Scalar(v))
    }

    /// Scalar integer column.
    pub fn ints(values: impl IntoIterator<Item = i64>) -> Self {
        Self::new(DType::Int, ColumnData::Scalar(values.into_iter().map(|x| x as f64).collect()))
    }

    /// Scalar floating-point column.
    pub fn floats(values: impl IntoIterator<Item = f64>) -> Self {
        Self::new(DType::Float, ColumnData::Scalar(values.into_iter().collect()))
    }

    /// Jagged column from one slice per event.
    pub fn jagged<I, R>(dtype: DType, rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: AsRef<[f64]>,
    {
        Self::new(dtype, ColumnData::Jagged(JaggedCol::from_rows(rows)))
    }

    /// Zero-length column of the given type.
    pub fn empty(ty: ColumnType) -> Self {
        let data = match ty.shape {
            Shape::Scalar => ColumnData::Scalar(Vec::new()),
            Shape::Jagged => ColumnData::Jagged(JaggedCol::empty()),
        };
        Self::new(ty.dtype, data)
    }

    /// Element type.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Storage.
    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    /// Static type.
    pub fn column_type(&self) -> ColumnType {
        match self.data {
            ColumnData::Scalar(_) => ColumnType::scalar(self.dtype),
            ColumnData::Jagged(_) => ColumnType::jagged(self.dtype),
        }
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        match &self.data {
            ColumnData::Scalar(v) => v.len(),
            ColumnData::Jagged(j) => j.n_entries(),
        }
    }

    /// True if the column holds no events.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scalar values, `None` for jagged columns.
    pub fn as_scalar(&self) -> Option<&[f64]> {
        match &self.data {
            ColumnData::Scalar(v) => Some(v),
            ColumnData::Jagged(_) => None,
        }
    }

    /// Jagged values, `None` for scalar columns.
    pub fn as_jagged(&self) -> Option<&JaggedCol> {
        match &self.data {
            ColumnData::Scalar(_) => None,
            ColumnData::Jagged(j) => Some(j),
        }
    }

    /// Gather the given events, in order.
    pub fn take(&self, rows: &[usize]) -> Column {
        let data = match &self.data {
            ColumnData::Scalar(v) => ColumnData::Scalar(rows.iter().map(|&r| v[r]).collect()),
            ColumnData::Jagged(j) => ColumnData::Jagged(j.take(rows)),
        };
        Column::new(self.dtype, data)
    }

    /// Append all events of `other`; both columns must have the same type.
    pub fn extend(&mut self, other: &Column) -> Result<()> {
        if self.column_type() != other.column_type() {
            return Err(Error::Validation(format!(
                "cannot append {} column to {} column",
                other.column_type(),
                self.column_type()
            )));
        }
        match (&mut self.data, &other.data) {
            (ColumnData::Scalar(a), ColumnData::Scalar(b)) => a.extend_from_slice(b),
            (ColumnData::Jagged(a), ColumnData::Jagged(b)) => a.extend(b),
            _ => unreachable!("column types checked above"),
        }
        Ok(())
    }
}

// ── Schema ─────────────────────────────────────────────────────

/// Ordered mapping of column names to static types.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    columns: IndexMap<String, ColumnType>,
}

impl Schema {
    /// Empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Type of `name`, if present.
    pub fn get(&self, name: &str) -> Option<ColumnType> {
        self.columns.get(name).copied()
    }

    /// Type of `name`, or [`Error::UnknownColumn`].
    pub fn column_type(&self, name: &str) -> Result<ColumnType> {
        self.get(name).ok_or_else(|| Error::UnknownColumn(name.to_string()))
    }

    /// True if `name` is present.
    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Add a column; names must be unique.
    pub fn insert(&mut self, name: impl Into<String>, ty: ColumnType) -> Result<()> {
        let name = name.into();
        if self.columns.contains_key(&name) {
            return Err(Error::duplicate(NameKind::Column, name));
        }
        self.columns.insert(name, ty);
        Ok(())
    }

    /// Column names in definition order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// `(name, type)` pairs in definition order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, ColumnType)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, ColumnType)> for Schema {
    fn from_iter<T: IntoIterator<Item = (S, ColumnType)>>(iter: T) -> Self {
        Self { columns: iter.into_iter().map(|(k, v)| (k.into(), v)).collect() }
    }
}

// ── EventTable ─────────────────────────────────────────────────

/// Named columns sharing one event count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventTable {
    n_events: usize,
    columns: IndexMap<String, Column>,
}

impl EventTable {
    /// Table with no columns and no events.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with no columns and `n_events` events (used for counting-only reads).
    pub fn with_events(n_events: usize) -> Self {
        Self { n_events, columns: IndexMap::new() }
    }

    /// Build from named columns; all columns must have the same length.
    pub fn from_columns<S: Into<String>>(
        columns: impl IntoIterator<Item = (S, Column)>,
    ) -> Result<Self> {
        let mut t = Self::new();
        for (name, col) in columns {
            t.insert(name, col)?;
        }
        Ok(t)
    }

    /// Number of events.
    pub fn n_events(&self) -> usize {
        self.n_events
    }

    /// Number of columns.
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// Column `name`, if present.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Column `name`, or [`Error::UnknownColumn`].
    pub fn get(&self, name: &str) -> Result<&Column> {
        self.column(name).ok_or_else(|| Error::UnknownColumn(name.to_string()))
    }

    /// Column names in insertion order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// `(name, column)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Schema of this table.
    pub fn schema(&self) -> Schema {
        self.columns.iter().map(|(k, c)| (k.clone(), c.column_type())).collect()
    }

    /// Add a column. Its length must match the table's event count (the first
    /// column of an empty table sets it).
    pub fn insert(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        let name = name.into();
        if self.columns.contains_key(&name) {
            return Err(Error::duplicate(NameKind::Column, name));
        }
        if self.columns.is_empty() && self.n_events == 0 {
            self.n_events = column.len();
        } else if column.len() != self.n_events {
            return Err(Error::Validation(format!(
                "column length mismatch for '{}': expected {}, got {}",
                name,
                self.n_events,
                column.len()
            )));
        }
        self.columns.insert(name, column);
        Ok(())
    }

    /// Gather the given events, in order.
    pub fn take(&self, rows: &[usize]) -> EventTable {
        EventTable {
            n_events: rows.len(),
            columns: self.columns.iter().map(|(k, c)| (k.clone(), c.take(rows))).collect(),
        }
    }

    /// Keep only events whose `keep` flag is set.
    pub fn retain(&mut self, keep: &[bool]) {
        debug_assert_eq!(keep.len(), self.n_events);
        if keep.iter().all(|&k| k) {
            return;
        }
        let rows: Vec<usize> = keep.iter().enumerate().filter(|(_, k)| **k).map(|(i, _)| i).collect();
        *self = self.take(&rows);
    }

    /// Events `start..end`.
    pub fn slice(&self, start: usize, end: usize) -> EventTable {
        let rows: Vec<usize> = (start..end.min(self.n_events)).collect();
        self.take(&rows)
    }

    /// New table with only the named columns, in the given order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<EventTable> {
        let mut out = EventTable::with_events(self.n_events);
        for name in names {
            let name = name.as_ref();
            out.insert(name, self.get(name)?.clone())?;
        }
        Ok(out)
    }

    /// Append the events of `other`, which must have the same columns in the same order.
    pub fn extend(&mut self, other: &EventTable) -> Result<()> {
        if self.columns.len() != other.columns.len()
            || self.columns.keys().zip(other.columns.keys()).any(|(a, b)| a != b)
        {
            return Err(Error::Validation("cannot append tables with different columns".into()));
        }
        for (col, other_col) in self.columns.values_mut().zip(other.columns.values()) {
            col.extend(other_col)?;
        }
        self.n_events += other.n_events;
        Ok(())
    }
}
