//! Arrow bridge: [`EventTable`] columns ↔ Arrow arrays.
//!
//! | Column type     | Arrow type (write)  | Accepted on read                              |
//! |-----------------|---------------------|-----------------------------------------------|
//! | `bool`          | `Boolean`           | `Boolean`                                     |
//! | `int`           | `Int64`             | any signed/unsigned integer                   |
//! | `float`         | `Float64`           | `Float16`, `Float32`, `Float64`               |
//! | `RVec<T>`       | `List<T>`           | `List<T>` / `LargeList<T>` of the above       |
//!
//! Other Arrow types (strings, structs, ...) are not part of the event schema
//! and are skipped when a schema is derived from a file.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int64Array, ListArray};
use arrow::buffer::{OffsetBuffer, ScalarBuffer};
use arrow::datatypes::{DataType, Field, Float64Type, Schema as ArrowSchema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use sf_core::{ColumnType, DType, Error, Result, Shape};
use sf_frame::{Column, ColumnData, EventTable, JaggedCol, Schema};

fn element_dtype(dt: &DataType) -> Option<DType> {
    match dt {
        DataType::Boolean => Some(DType::Bool),
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => Some(DType::Int),
        DataType::Float16 | DataType::Float32 | DataType::Float64 => Some(DType::Float),
        _ => None,
    }
}

/// Column type for an Arrow data type, `None` if unsupported.
pub fn column_type_of(dt: &DataType) -> Option<ColumnType> {
    match dt {
        DataType::List(f) | DataType::LargeList(f) => {
            element_dtype(f.data_type()).map(ColumnType::jagged)
        }
        other => element_dtype(other).map(ColumnType::scalar),
    }
}

/// Event schema of an Arrow schema; unsupported fields are skipped.
pub fn schema_from_arrow(schema: &ArrowSchema) -> Schema {
    schema
        .fields()
        .iter()
        .filter_map(|f| match column_type_of(f.data_type()) {
            Some(ty) => Some((f.name().clone(), ty)),
            None => {
                tracing::debug!(column = %f.name(), data_type = %f.data_type(), "skipping unsupported column");
                None
            }
        })
        .collect()
}

fn arrow_element_type(dtype: DType) -> DataType {
    match dtype {
        DType::Bool => DataType::Boolean,
        DType::Int => DataType::Int64,
        DType::Float => DataType::Float64,
    }
}

/// Arrow data type written for a column type.
pub fn arrow_type_of(ty: ColumnType) -> DataType {
    let elem = arrow_element_type(ty.dtype);
    match ty.shape {
        Shape::Scalar => elem,
        Shape::Jagged => DataType::List(Arc::new(Field::new_list_field(elem, false))),
    }
}

fn reject_nulls(name: &str, array: &dyn Array) -> Result<()> {
    if array.null_count() > 0 {
        return Err(Error::Validation(format!(
            "column '{name}' contains {} null values",
            array.null_count()
        )));
    }
    Ok(())
}

fn to_f64_values(name: &str, array: &dyn Array) -> Result<Vec<f64>> {
    reject_nulls(name, array)?;
    let cast = arrow::compute::cast(array, &DataType::Float64)
        .map_err(|e| Error::Validation(format!("cannot convert column '{name}': {e}")))?;
    Ok(cast.as_primitive::<Float64Type>().values().to_vec())
}

fn jagged_from_offsets<O: Copy + TryInto<usize>>(
    name: &str,
    offsets: &[O],
    values: &dyn Array,
) -> Result<JaggedCol> {
    let bad = || Error::Validation(format!("column '{name}' has invalid list offsets"));
    let offsets: Vec<usize> =
        offsets.iter().map(|&o| o.try_into().map_err(|_| bad())).collect::<Result<_>>()?;
    let (first, last) = match (offsets.first(), offsets.last()) {
        (Some(&f), Some(&l)) if f <= l && l <= values.len() => (f, l),
        _ => return Err(bad()),
    };
    let flat = to_f64_values(name, values.slice(first, last - first).as_ref())?;
    JaggedCol::new(flat, offsets.iter().map(|o| o - first).collect())
}

/// Convert an Arrow array to a column of the given type.
pub fn column_from_array(name: &str, array: &ArrayRef, expected: ColumnType) -> Result<Column> {
    let actual = column_type_of(array.data_type()).ok_or_else(|| {
        Error::Validation(format!("column '{name}' has unsupported type {}", array.data_type()))
    })?;
    if actual != expected {
        return Err(Error::Validation(format!(
            "column '{name}' is {actual} in this file but {expected} in the source schema"
        )));
    }
    // Null list entries would otherwise read back as empty rows.
    reject_nulls(name, array.as_ref())?;
    let data = match array.data_type() {
        DataType::List(_) => {
            let list = array.as_list::<i32>();
            ColumnData::Jagged(jagged_from_offsets(name, list.value_offsets(), list.values().as_ref())?)
        }
        DataType::LargeList(_) => {
            let list = array.as_list::<i64>();
            ColumnData::Jagged(jagged_from_offsets(name, list.value_offsets(), list.values().as_ref())?)
        }
        _ => ColumnData::Scalar(to_f64_values(name, array.as_ref())?),
    };
    Ok(Column::new(expected.dtype, data))
}

fn element_array(name: &str, dtype: DType, values: &[f64]) -> Result<ArrayRef> {
    Ok(match dtype {
        DType::Bool => Arc::new(BooleanArray::from(values.iter().map(|&x| x != 0.0).collect::<Vec<_>>())),
        DType::Int => {
            if let Some(x) = values.iter().find(|x| !x.is_finite()) {
                return Err(Error::Validation(format!(
                    "int column '{name}' holds non-finite value {x}"
                )));
            }
            Arc::new(Int64Array::from(values.iter().map(|&x| x as i64).collect::<Vec<_>>()))
        }
        DType::Float => Arc::new(Float64Array::from(values.to_vec())),
    })
}

/// Convert a column to an Arrow array.
pub fn column_to_array(name: &str, column: &Column) -> Result<ArrayRef> {
    match column.data() {
        ColumnData::Scalar(v) => element_array(name, column.dtype(), v),
        ColumnData::Jagged(j) => {
            let offsets: Vec<i32> = j
                .offsets
                .iter()
                .map(|&o| i32::try_from(o))
                .collect::<std::result::Result<_, _>>()
                .map_err(|_| Error::Validation(format!("column '{name}' is too large for List<>")))?;
            let field = Arc::new(Field::new_list_field(arrow_element_type(column.dtype()), false));
            let list = ListArray::try_new(
                field,
                OffsetBuffer::new(ScalarBuffer::from(offsets)),
                element_array(name, column.dtype(), &j.flat)?,
                None,
            )
            .map_err(|e| Error::Validation(format!("failed to build list column '{name}': {e}")))?;
            Ok(Arc::new(list))
        }
    }
}

/// Build a [`RecordBatch`] from a table; `metadata` is attached to the schema.
pub fn table_to_record_batch(
    table: &EventTable,
    metadata: HashMap<String, String>,
) -> Result<RecordBatch> {
    let mut fields = Vec::with_capacity(table.n_columns());
    let mut arrays = Vec::with_capacity(table.n_columns());
    for (name, col) in table.iter() {
        fields.push(Field::new(name, arrow_type_of(col.column_type()), false));
        arrays.push(column_to_array(name, col)?);
    }
    let schema = Arc::new(ArrowSchema::new(fields).with_metadata(metadata));
    let options = RecordBatchOptions::new().with_row_count(Some(table.n_events()));
    RecordBatch::try_new_with_options(schema, arrays, &options)
        .map_err(|e| Error::Validation(format!("failed to build RecordBatch: {e}")))
}

/// Convert the named columns of a batch, typed by `schema`.
pub fn table_from_record_batch(
    batch: &RecordBatch,
    schema: &Schema,
    columns: &[String],
) -> Result<EventTable> {
    let mut table = EventTable::with_events(batch.num_rows());
    for name in columns {
        let expected = schema.column_type(name)?;
        let array =
            batch.column_by_name(name).ok_or_else(|| Error::UnknownColumn(name.clone()))?;
        table.insert(name.as_str(), column_from_array(name, array, expected)?)?;
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{
        Float32Array, Float64Builder, Int32Array, Int32Builder, LargeListBuilder, ListBuilder,
    };

    #[test]
    fn type_mapping() {
        assert_eq!(column_type_of(&DataType::Int32), Some(ColumnType::scalar(DType::Int)));
        assert_eq!(column_type_of(&DataType::Float32), Some(ColumnType::scalar(DType::Float)));
        assert_eq!(column_type_of(&DataType::Utf8), None);
        let list = DataType::LargeList(Arc::new(Field::new_list_field(DataType::UInt8, true)));
        assert_eq!(column_type_of(&list), Some(ColumnType::jagged(DType::Int)));
    }

    #[test]
    fn narrow_primitives_widen() {
        let a: ArrayRef = Arc::new(Int32Array::from(vec![1, -2, 3]));
        let c = column_from_array("nJet", &a, ColumnType::scalar(DType::Int)).unwrap();
        assert_eq!(c.as_scalar().unwrap(), &[1.0, -2.0, 3.0]);

        let f: ArrayRef = Arc::new(Float32Array::from(vec![0.5_f32]));
        let c = column_from_array("MET_pt", &f, ColumnType::scalar(DType::Float)).unwrap();
        assert_eq!(c.as_scalar().unwrap(), &[0.5]);

        assert!(column_from_array("MET_pt", &f, ColumnType::scalar(DType::Int)).is_err());
    }

    #[test]
    fn large_list_is_read_as_jagged() {
        let mut b = LargeListBuilder::new(Int32Builder::new());
        b.values().append_value(1);
        b.values().append_value(2);
        b.append(true);
        b.append(true);
        b.values().append_value(7);
        b.append(true);
        let a: ArrayRef = Arc::new(b.finish());
        let c = column_from_array("Muon_charge", &a, ColumnType::jagged(DType::Int)).unwrap();
        let j = c.as_jagged().unwrap();
        assert_eq!(j.offsets, vec![0, 2, 2, 3]);
        assert_eq!(j.flat, vec![1.0, 2.0, 7.0]);
    }

    #[test]
    fn sliced_list_offsets_are_rebased() {
        let col = Column::jagged(DType::Float, [vec![1.0], vec![2.0, 3.0], vec![4.0]]);
        let arr = column_to_array("x", &col).unwrap().slice(1, 2);
        let back = column_from_array("x", &arr, ColumnType::jagged(DType::Float)).unwrap();
        assert_eq!(back.as_jagged().unwrap().offsets, vec![0, 2, 3]);
        assert_eq!(back.as_jagged().unwrap().flat, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn nulls_are_rejected() {
        let a: ArrayRef = Arc::new(Float64Array::from(vec![Some(1.0), None]));
        let err = column_from_array("MET_pt", &a, ColumnType::scalar(DType::Float)).unwrap_err();
        assert!(err.to_string().contains("null"));
    }

    #[test]
    fn null_list_entries_are_rejected() {
        let mut b = ListBuilder::new(Float64Builder::new());
        b.values().append_value(25.0);
        b.append(true);
        b.append_null();
        let a: ArrayRef = Arc::new(b.finish());
        let err = column_from_array("Muon_pt", &a, ColumnType::jagged(DType::Float)).unwrap_err();
        assert!(err.to_string().contains("1 null values"), "{err}");
    }

    #[test]
    fn non_finite_int_values_are_rejected() {
        let col = Column::new(DType::Int, ColumnData::Scalar(vec![2.0, f64::NAN]));
        let err = column_to_array("nGoodMuon", &col).unwrap_err();
        assert!(matches!(err, Error::Validation(ref m) if m.contains("nGoodMuon")));
        let ok = Column::ints([1, 2]);
        assert_eq!(column_to_array("nMuon", &ok).unwrap().len(), 2);
    }

    #[test]
    fn zero_column_batch_keeps_row_count() {
        let t = EventTable::with_events(5);
        let batch = table_to_record_batch(&t, HashMap::new()).unwrap();
        assert_eq!(batch.num_rows(), 5);
        assert_eq!(batch.num_columns(), 0);
    }
}
