//! Parquet / Arrow event I/O.
//!
//! Defines the **event table schema v1** and bridges Arrow [`RecordBatch`] ↔
//! [`EventsView`].
//!
//! # Schema: `afw_events_v1`
//!
//! | Column        | Arrow Type        | Description                          |
//! |---------------|-------------------|--------------------------------------|
//! | `<flat>`      | `Float64`         | one value per event                  |
//! | `<flat>`      | `Int64`           | counts, flags                        |
//! | `<flat>`      | `Boolean`         | trigger bits, masks                  |
//! | `<Coll>_<x>`  | `List<Float64>`   | per-object values of a collection    |
//! | `_entry`      | `UInt64`          | source entry number (row provenance) |
//!
//! Inputs not written by afw are accepted too: `Float32`/`Int32` columns and
//! `List<Float32>` are widened, other types are skipped, and a missing
//! `_entry` column is synthesized from the row position in the file. Columns
//! holding nulls are rejected with a data error.
//!
//! ## File metadata
//!
//! | Key                   | Value             |
//! |-----------------------|-------------------|
//! | `afw.schema_version`  | `"afw_events_v1"` |
//!
//! Writers may attach more keys (skim provenance, delta descriptors).

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int64Array, ListArray, UInt64Array};
use arrow::buffer::{OffsetBuffer, ScalarBuffer};
use arrow::datatypes::{DataType, Field, Float32Type, Float64Type, Int32Type, Int64Type, Schema, UInt64Type};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::file::properties::WriterProperties;

use af_core::{Error, Result};

use crate::column::{Column, Jagged};
use crate::view::EventsView;

/// Value of [`META_KEY_SCHEMA_VERSION`] in files written by afw.
pub const EVENTS_SCHEMA_V1: &str = "afw_events_v1";

/// Key-value metadata entry naming the event schema.
pub const META_KEY_SCHEMA_VERSION: &str = "afw.schema_version";

/// Reserved column holding the source entry of each row.
pub const ENTRY_COLUMN: &str = "_entry";

/// Build an Arrow [`RecordBatch`] from an [`EventsView`].
///
/// `metadata` is merged into the schema metadata next to the schema version.
pub fn view_to_record_batch(
    view: &EventsView,
    metadata: &HashMap<String, String>,
) -> Result<RecordBatch> {
    let mut fields = Vec::with_capacity(view.field_names().len() + 1);
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(view.field_names().len() + 1);

    for (name, col) in view.iter() {
        if name == ENTRY_COLUMN {
            return Err(Error::Data(format!("field name '{ENTRY_COLUMN}' is reserved")));
        }
        let arr = column_to_array(name, col)?;
        fields.push(Field::new(name, arr.data_type().clone(), false));
        arrays.push(arr);
    }
    fields.push(Field::new(ENTRY_COLUMN, DataType::UInt64, false));
    arrays.push(Arc::new(UInt64Array::from(view.entries().to_vec())));

    let mut meta = metadata.clone();
    meta.insert(META_KEY_SCHEMA_VERSION.to_string(), EVENTS_SCHEMA_V1.to_string());
    let schema = Arc::new(Schema::new(fields).with_metadata(meta));

    RecordBatch::try_new(schema, arrays)
        .map_err(|e| Error::Data(format!("failed to build RecordBatch: {e}")))
}

fn column_to_array(name: &str, col: &Column) -> Result<ArrayRef> {
    Ok(match col {
        Column::F64(v) => Arc::new(Float64Array::from(v.clone())),
        Column::I64(v) => Arc::new(Int64Array::from(v.clone())),
        Column::Bool(v) => Arc::new(BooleanArray::from(v.clone())),
        Column::Jagged(j) => {
            let offsets = j
                .offsets()
                .iter()
                .map(|&o| i32::try_from(o))
                .collect::<std::result::Result<Vec<i32>, _>>()
                .map_err(|_| Error::Data(format!("field '{name}' has too many objects for i32 offsets")))?;
            let item = Arc::new(Field::new("item", DataType::Float64, false));
            let list = ListArray::try_new(
                item,
                OffsetBuffer::new(ScalarBuffer::from(offsets)),
                Arc::new(Float64Array::from(j.values().to_vec())),
                None,
            )
            .map_err(|e| Error::Data(format!("field '{name}': failed to build list array: {e}")))?;
            Arc::new(list)
        }
    })
}

/// Write an [`EventsView`] to a Parquet file.
///
/// Uses Zstd compression if the `zstd` feature is enabled, otherwise Snappy.
pub fn write_events_parquet(
    view: &EventsView,
    path: &Path,
    metadata: &HashMap<String, String>,
) -> Result<()> {
    let batch = view_to_record_batch(view, metadata)?;
    let file = File::create(path).map_err(|e| Error::storage(path.display(), e))?;

    let props = WriterProperties::builder().set_compression(default_compression()).build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
        .map_err(|e| Error::storage(path.display(), format!("failed to create Parquet writer: {e}")))?;
    writer
        .write(&batch)
        .map_err(|e| Error::storage(path.display(), format!("failed to write Parquet: {e}")))?;
    writer
        .close()
        .map_err(|e| Error::storage(path.display(), format!("failed to close Parquet writer: {e}")))?;
    Ok(())
}

/// Build an [`EventsView`] from a [`RecordBatch`].
///
/// When the batch has no `_entry` column, rows are numbered from `entry_base`.
pub fn view_from_record_batch(batch: &RecordBatch, entry_base: u64) -> Result<EventsView> {
    let schema = batch.schema();
    if let Some(v) = schema.metadata().get(META_KEY_SCHEMA_VERSION)
        && v != EVENTS_SCHEMA_V1
    {
        return Err(Error::Data(format!("unsupported event schema version '{v}'")));
    }

    let entries = match schema.index_of(ENTRY_COLUMN) {
        Ok(i) => {
            let arr = batch.column(i);
            if arr.data_type() != &DataType::UInt64 {
                return Err(Error::Data(format!(
                    "column '{ENTRY_COLUMN}' has type {:?}, expected UInt64",
                    arr.data_type()
                )));
            }
            arr.as_primitive::<UInt64Type>().values().to_vec()
        }
        Err(_) => (entry_base..entry_base + batch.num_rows() as u64).collect(),
    };

    let mut columns = Vec::with_capacity(schema.fields().len());
    for (field, arr) in schema.fields().iter().zip(batch.columns()) {
        if field.name() == ENTRY_COLUMN {
            continue;
        }
        if let Some(col) = column_from_array(field.name(), arr)? {
            columns.push((field.name().clone(), col));
        }
    }
    EventsView::from_columns(columns, Some(entries))
}

fn column_from_array(name: &str, arr: &ArrayRef) -> Result<Option<Column>> {
    let col = match arr.data_type() {
        DataType::Float64 => Column::F64(arr.as_primitive::<Float64Type>().values().to_vec()),
        DataType::Float32 => {
            Column::F64(arr.as_primitive::<Float32Type>().values().iter().map(|&x| x as f64).collect())
        }
        DataType::Int64 => Column::I64(arr.as_primitive::<Int64Type>().values().to_vec()),
        DataType::Int32 => {
            Column::I64(arr.as_primitive::<Int32Type>().values().iter().map(|&x| x as i64).collect())
        }
        DataType::Boolean => Column::Bool(arr.as_boolean().values().iter().collect()),
        DataType::List(item) if matches!(item.data_type(), DataType::Float64 | DataType::Float32) => {
            let list = arr.as_list::<i32>();
            if list.values().null_count() > 0 {
                return Err(Error::Data(format!("column '{name}' has null per-object values")));
            }
            let offs = list.value_offsets();
            let base = offs[0] as usize;
            let end = offs[offs.len() - 1] as usize;
            let values: Vec<f64> = match list.values().data_type() {
                DataType::Float64 => list.values().as_primitive::<Float64Type>().values()[base..end].to_vec(),
                _ => list.values().as_primitive::<Float32Type>().values()[base..end]
                    .iter()
                    .map(|&x| x as f64)
                    .collect(),
            };
            let offsets = offs.iter().map(|&o| (o as usize) - base).collect();
            Column::Jagged(
                Jagged::new(offsets, values)
                    .map_err(|e| Error::Data(format!("column '{name}': {e}")))?,
            )
        }
        other => {
            tracing::debug!(field = name, data_type = ?other, "skipping unsupported column type");
            return Ok(None);
        }
    };
    if arr.null_count() > 0 {
        return Err(Error::Data(format!("column '{name}' has {} null entries", arr.null_count())));
    }
    Ok(Some(col))
}

fn open(path: &Path) -> Result<ParquetRecordBatchReaderBuilder<File>> {
    let file = File::open(path).map_err(|e| Error::storage(path.display(), e))?;
    ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| Error::storage(path.display(), format!("failed to read Parquet: {e}")))
}

fn read_with(path: &Path, range: Option<(u64, u64)>) -> Result<EventsView> {
    let mut builder = open(path)?;
    // build() consumes the builder; keep the schema for concat
    let full_schema = builder.schema().clone();
    let mut entry_base = 0;
    if let Some((start, stop)) = range {
        builder = builder.with_offset(start as usize).with_limit(stop.saturating_sub(start) as usize);
        entry_base = start;
    }
    let reader = builder
        .build()
        .map_err(|e| Error::storage(path.display(), format!("failed to build Parquet reader: {e}")))?;
    let batches: std::result::Result<Vec<_>, _> = reader.collect();
    let batches = batches
        .map_err(|e| Error::storage(path.display(), format!("failed to read Parquet batches: {e}")))?;
    let merged = arrow::compute::concat_batches(&full_schema, &batches)
        .map_err(|e| Error::storage(path.display(), format!("failed to concat Parquet batches: {e}")))?;
    view_from_record_batch(&merged, entry_base)
}

/// Read a whole Parquet file.
pub fn read_events_parquet(path: &Path) -> Result<EventsView> {
    read_with(path, None)
}

/// Read entries `[start, stop)` of a Parquet file.
pub fn read_events_parquet_range(path: &Path, start: u64, stop: u64) -> Result<EventsView> {
    read_with(path, Some((start, stop)))
}

/// Key-value metadata of a Parquet file's Arrow schema.
pub fn read_schema_metadata(path: &Path) -> Result<HashMap<String, String>> {
    Ok(open(path)?.schema().metadata().clone())
}

/// Number of entries in a Parquet file, from its footer.
pub fn count_entries(path: &Path) -> Result<u64> {
    let builder = open(path)?;
    let n = builder.metadata().file_metadata().num_rows();
    u64::try_from(n).map_err(|_| Error::storage(path.display(), format!("negative row count {n}")))
}

fn default_compression() -> parquet::basic::Compression {
    #[cfg(feature = "zstd")]
    {
        parquet::basic::Compression::ZSTD(Default::default())
    }
    #[cfg(not(feature = "zstd"))]
    {
        parquet::basic::Compression::SNAPPY
    }
}
