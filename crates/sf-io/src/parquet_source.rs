//! Parquet files as an [`EventSource`]: one partition per file.

use std::fs::File;
use std::path::Path;

use parquet::arrow::ProjectionMask;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use sf_core::{Error, Result};
use sf_frame::{EventSource, EventTable, Partition, Schema};

use crate::artifact::{META_KEY_TABLE_NAME, empty_table};
use crate::convert::{schema_from_arrow, table_from_record_batch};

/// True for locators that need a remote protocol (`root://`, `https://`, ...).
pub fn is_remote(locator: &str) -> bool {
    locator.contains("://") && !locator.starts_with("file://")
}

fn local_path(locator: &str) -> &Path {
    Path::new(locator.strip_prefix("file://").unwrap_or(locator))
}

/// Event source reading the same table from a list of Parquet files.
#[derive(Debug, Clone)]
pub struct ParquetSource {
    locators: Vec<String>,
    table_name: String,
    schema: Schema,
}

impl ParquetSource {
    /// Open a source over `locators`.
    ///
    /// The schema is taken from the first file. Fails with
    /// [`Error::EmptySource`] when `locators` is empty.
    pub fn open<S: AsRef<str>>(locators: &[S], table_name: &str) -> Result<Self> {
        let locators: Vec<String> = locators.iter().map(|l| l.as_ref().to_string()).collect();
        let Some(first) = locators.first() else {
            return Err(Error::EmptySource(table_name.to_string()));
        };
        // Remote inputs fail as execution errors even before the event loop.
        let builder = open_builder(first, table_name).map_err(|e| match e {
            Error::Validation(message) if is_remote(first) => {
                Error::EngineExecution { source_name: first.clone(), events_processed: 0, message }
            }
            other => other,
        })?;
        let schema = schema_from_arrow(builder.schema());
        tracing::info!(
            files = locators.len(),
            table = table_name,
            columns = schema.len(),
            "opened parquet source"
        );
        Ok(Self { locators, table_name: table_name.to_string(), schema })
    }

    /// Input locators, in partition order.
    pub fn locators(&self) -> &[String] {
        &self.locators
    }

    /// Event table name.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

fn open_builder(locator: &str, table_name: &str) -> Result<ParquetRecordBatchReaderBuilder<File>> {
    if is_remote(locator) {
        return Err(Error::Validation(format!(
            "remote locator {locator} cannot be fetched; stage the file locally"
        )));
    }
    let path = local_path(locator);
    let file = File::open(path)
        .map_err(|e| Error::Validation(format!("failed to open {}: {e}", path.display())))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| Error::Validation(format!("failed to read Parquet {}: {e}", path.display())))?;
    if let Some(found) = builder.schema().metadata().get(META_KEY_TABLE_NAME)
        && found != table_name
    {
        return Err(Error::Validation(format!(
            "{} holds table '{found}', expected '{table_name}'",
            path.display()
        )));
    }
    Ok(builder)
}

impl EventSource for ParquetSource {
    fn describe(&self) -> String {
        format!("parquet({} files, table '{}')", self.locators.len(), self.table_name)
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn partitions(&self) -> Vec<Partition> {
        self.locators
            .iter()
            .enumerate()
            .map(|(index, l)| Partition { index, label: l.clone() })
            .collect()
    }

    fn read_partition(&self, index: usize, columns: &[String]) -> Result<EventTable> {
        let locator = self
            .locators
            .get(index)
            .ok_or_else(|| Error::Validation(format!("partition {index} out of range")))?;
        let builder = open_builder(locator, &self.table_name)?;

        if columns.is_empty() {
            let n = builder.metadata().file_metadata().num_rows();
            return Ok(EventTable::with_events(usize::try_from(n).unwrap_or(0)));
        }

        let file_schema = builder.schema().clone();
        let mut roots = Vec::with_capacity(columns.len());
        for c in columns {
            roots.push(file_schema.index_of(c).map_err(|_| Error::UnknownColumn(c.clone()))?);
        }
        let mask = ProjectionMask::roots(builder.parquet_schema(), roots);
        let reader = builder
            .with_projection(mask)
            .build()
            .map_err(|e| Error::Validation(format!("failed to build Parquet reader: {e}")))?;

        let mut table: Option<EventTable> = None;
        for batch in reader {
            let batch = batch
                .map_err(|e| Error::Validation(format!("failed to read Parquet batch: {e}")))?;
            let part = table_from_record_batch(&batch, &self.schema, columns)?;
            match table.as_mut() {
                Some(t) => t.extend(&part)?,
                None => table = Some(part),
            }
        }
        match table {
            Some(t) => Ok(t),
            None => {
                let schema: Schema = columns
                    .iter()
                    .map(|c| Ok((c.clone(), self.schema.column_type(c)?)))
                    .collect::<Result<Vec<_>>>()?
                    .into_iter()
                    .collect();
                empty_table(&schema)
            }
        }
    }
}
