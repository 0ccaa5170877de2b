//! Flat event tables stored as Parquet.
//!
//! # Event Table Schema
//!
//! | Column   | Type                          | Description                    |
//! |----------|-------------------------------|--------------------------------|
//! | *any*    | integer / float / `Boolean`   | One column per event variable  |
//!
//! Only the columns referenced by the compiled expressions are decoded
//! (projection pushdown). Every numeric or boolean column is cast to
//! `Float64` before evaluation; other types and null values are rejected.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, Float64Array};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Float64Type, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::ProjectionMask;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::error::{NtupleError, Result};
use crate::expr::ExprSet;

/// Rows decoded per record batch.
pub const DEFAULT_BATCH_SIZE: usize = 64 * 1024;

/// Outcome of one pass over an event table.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSummary {
    /// One sum per weight of the [`ExprSet`], in its order.
    pub sums: Vec<f64>,
    /// Rows read.
    pub rows: u64,
    /// Rows passing the selection.
    pub selected: u64,
}

/// Scan the Parquet file at `path` once, accumulating every weight of
/// `exprs` over the rows that pass its selection.
pub fn scan_parquet(path: &Path, exprs: &ExprSet, batch_size: usize) -> Result<ScanSummary> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

    let mut summary =
        ScanSummary { sums: vec![0.0; exprs.n_weights()], rows: 0, selected: 0 };

    // Constant expressions only: nothing to decode, the row count suffices.
    if exprs.columns().is_empty() {
        let n_rows = usize::try_from(builder.metadata().file_metadata().num_rows()).unwrap_or(0);
        summary.rows = n_rows as u64;
        summary.selected = exprs.accumulate(&[], n_rows, &mut summary.sums);
        return Ok(summary);
    }

    let schema = builder.schema().clone();
    let mut roots = Vec::with_capacity(exprs.columns().len());
    for name in exprs.columns() {
        let idx = schema.index_of(name).map_err(|_| NtupleError::MissingColumn(name.clone()))?;
        check_numeric(name, schema.field(idx).data_type())?;
        roots.push(idx);
    }
    let mask = ProjectionMask::roots(builder.parquet_schema(), roots);
    let reader = builder.with_projection(mask).with_batch_size(batch_size.max(1)).build()?;

    for batch in reader {
        let batch = batch?;
        let columns = numeric_columns(&batch, exprs.columns())?;
        let slices: Vec<&[f64]> = columns.iter().map(|c| &c.values()[..]).collect();
        summary.rows += batch.num_rows() as u64;
        summary.selected += exprs.accumulate(&slices, batch.num_rows(), &mut summary.sums);
    }

    Ok(summary)
}

fn check_numeric(name: &str, dt: &DataType) -> Result<()> {
    if dt.is_numeric() || *dt == DataType::Boolean {
        Ok(())
    } else {
        Err(NtupleError::UnsupportedType { col: name.to_string(), actual: format!("{dt:?}") })
    }
}

/// Extract `names` from `batch` as `Float64` arrays, casting where needed.
fn numeric_columns(batch: &RecordBatch, names: &[String]) -> Result<Vec<Float64Array>> {
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        let col = batch
            .column_by_name(name)
            .ok_or_else(|| NtupleError::MissingColumn(name.clone()))?;
        if col.null_count() > 0 {
            return Err(NtupleError::NullValues(name.clone()));
        }
        let col: ArrayRef = if col.data_type() == &DataType::Float64 {
            Arc::clone(col)
        } else {
            check_numeric(name, col.data_type())?;
            cast(col, &DataType::Float64)?
        };
        out.push(col.as_primitive::<Float64Type>().clone());
    }
    Ok(out)
}

/// Write `columns` as a flat `Float64` event table.
///
/// All columns must have the same length. Uses Snappy compression.
pub fn write_event_table(path: &Path, columns: &[(&str, Vec<f64>)]) -> Result<()> {
    let fields: Vec<Field> =
        columns.iter().map(|(name, _)| Field::new(*name, DataType::Float64, false)).collect();
    let arrays: Vec<ArrayRef> = columns
        .iter()
        .map(|(_, values)| Arc::new(Float64Array::from(values.clone())) as ArrayRef)
        .collect();
    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?;
    write_batches(path, &[batch])
}

/// Write record batches to a Parquet file.
pub fn write_batches(path: &Path, batches: &[RecordBatch]) -> Result<()> {
    let Some(first) = batches.first() else {
        return Ok(());
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let props = WriterProperties::builder().set_compression(Compression::SNAPPY).build();
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, first.schema(), Some(props))?;
    for batch in batches {
        writer.write(batch)?;
    }
    writer.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use arrow::array::{BooleanArray, Int32Array, StringArray};
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn tmp_path(filename: &str) -> PathBuf {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        let mut p = std::env::temp_dir();
        p.push(format!("ns_ntuple_{}_{}_{}", std::process::id(), nanos, filename));
        p
    }

    fn weights(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn scan_sums_selected_weights() {
        let path = tmp_path("events.parquet");
        write_event_table(
            &path,
            &[
                ("nJets", vec![3.0, 4.0, 5.0, 6.0]),
                ("w", vec![1.0, 2.0, 3.0, 4.0]),
                ("unused", vec![0.0; 4]),
            ],
        )
        .unwrap();

        let exprs =
            ExprSet::compile("nJets >= 4", &weights(&[("nominal", "w"), ("up", "(w)*(1.5)")]))
                .unwrap();
        let s = scan_parquet(&path, &exprs, DEFAULT_BATCH_SIZE).unwrap();
        assert_eq!(s.rows, 4);
        assert_eq!(s.selected, 3);
        assert_relative_eq!(s.sums[0], 9.0);
        assert_relative_eq!(s.sums[1], 13.5);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn small_batches_give_the_same_sums() {
        let path = tmp_path("batches.parquet");
        let n: Vec<f64> = (0..1000).map(|i| f64::from(i % 7)).collect();
        let w: Vec<f64> = (0..1000).map(|i| 0.5 + f64::from(i % 3)).collect();
        write_event_table(&path, &[("n", n), ("w", w)]).unwrap();

        let exprs = ExprSet::compile("n > 2", &weights(&[("nominal", "w")])).unwrap();
        let big = scan_parquet(&path, &exprs, DEFAULT_BATCH_SIZE).unwrap();
        let small = scan_parquet(&path, &exprs, 17).unwrap();
        assert_eq!(big.selected, small.selected);
        assert_relative_eq!(big.sums[0], small.sums[0], epsilon = 1e-9);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn no_surviving_rows_gives_zero() {
        let path = tmp_path("empty_sel.parquet");
        write_event_table(&path, &[("x", vec![1.0, 2.0]), ("w", vec![5.0, 5.0])]).unwrap();
        let exprs = ExprSet::compile("x > 10", &weights(&[("nominal", "w")])).unwrap();
        let s = scan_parquet(&path, &exprs, DEFAULT_BATCH_SIZE).unwrap();
        assert_eq!(s.selected, 0);
        assert_eq!(s.sums, vec![0.0]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn constant_expressions_use_row_count() {
        let path = tmp_path("const.parquet");
        write_event_table(&path, &[("x", vec![1.0, 2.0, 3.0])]).unwrap();
        let exprs = ExprSet::compile("", &weights(&[("nominal", "2*0.5")])).unwrap();
        let s = scan_parquet(&path, &exprs, DEFAULT_BATCH_SIZE).unwrap();
        assert_eq!(s.rows, 3);
        assert_relative_eq!(s.sums[0], 3.0);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn integer_and_boolean_columns_are_cast() {
        let path = tmp_path("typed.parquet");
        let schema = Arc::new(Schema::new(vec![
            Field::new("nJets", DataType::Int32, false),
            Field::new("isTight", DataType::Boolean, false),
            Field::new("w", DataType::Float64, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int32Array::from(vec![2, 4, 6])),
                Arc::new(BooleanArray::from(vec![true, false, true])),
                Arc::new(Float64Array::from(vec![1.0, 10.0, 100.0])),
            ],
        )
        .unwrap();
        write_batches(&path, &[batch]).unwrap();

        let exprs =
            ExprSet::compile("nJets >= 4 && isTight", &weights(&[("nominal", "w")])).unwrap();
        let s = scan_parquet(&path, &exprs, DEFAULT_BATCH_SIZE).unwrap();
        assert_eq!(s.selected, 1);
        assert_relative_eq!(s.sums[0], 100.0);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_and_non_numeric_columns_are_errors() {
        let path = tmp_path("bad.parquet");
        let schema = Arc::new(Schema::new(vec![
            Field::new("label", DataType::Utf8, false),
            Field::new("w", DataType::Float64, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["a", "b"])),
                Arc::new(Float64Array::from(vec![1.0, 2.0])),
            ],
        )
        .unwrap();
        write_batches(&path, &[batch]).unwrap();

        let missing = ExprSet::compile("nJets > 1", &weights(&[("nominal", "w")])).unwrap();
        let err = scan_parquet(&path, &missing, DEFAULT_BATCH_SIZE).unwrap_err();
        assert!(matches!(err, NtupleError::MissingColumn(ref c) if c == "nJets"), "{err}");

        let string_col = ExprSet::compile("label > 1", &weights(&[("nominal", "w")])).unwrap();
        let err = scan_parquet(&path, &string_col, DEFAULT_BATCH_SIZE).unwrap_err();
        assert!(matches!(err, NtupleError::UnsupportedType { .. }), "{err}");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn null_values_are_rejected() {
        let path = tmp_path("nulls.parquet");
        let schema = Arc::new(Schema::new(vec![Field::new("w", DataType::Float64, true)]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(Float64Array::from(vec![Some(1.0), None, Some(2.0)]))],
        )
        .unwrap();
        write_batches(&path, &[batch]).unwrap();

        let exprs = ExprSet::compile("", &weights(&[("nominal", "w")])).unwrap();
        let err = scan_parquet(&path, &exprs, DEFAULT_BATCH_SIZE).unwrap_err();
        assert!(matches!(err, NtupleError::NullValues(ref c) if c == "w"), "{err}");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_file_is_io_error() {
        let exprs = ExprSet::compile("", &weights(&[("nominal", "1")])).unwrap();
        let err = scan_parquet(&tmp_path("nope.parquet"), &exprs, DEFAULT_BATCH_SIZE).unwrap_err();
        assert!(matches!(err, NtupleError::Io(_)), "{err}");
    }
}
