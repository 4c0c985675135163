//! In-memory dataframes
//!
//! A [`DataFrame`] is a fixed Arrow schema plus the record batches that hold
//! its rows. Frames produced by a [`Session`] stay bound to it so they can be
//! written back through the warehouse connector.

use crate::connector::DataFrameWriter;
use crate::error::{Error, Result};
use crate::session::Session;
use arrow::array::{ArrayRef, Int64Array};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use serde_json::Value;
use std::sync::Arc;

/// Materialized tabular result with a fixed schema
#[derive(Debug, Clone)]
pub struct DataFrame {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
    session: Option<Session>,
}

impl DataFrame {
    /// Create a frame from batches that all share `schema`
    pub fn new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Result<Self> {
        for batch in &batches {
            if batch.schema().fields() != schema.fields() {
                return Err(Error::frame(format!(
                    "batch schema {:?} does not match frame schema {:?}",
                    batch.schema().fields(),
                    schema.fields()
                )));
            }
        }

        Ok(Self {
            schema,
            batches,
            session: None,
        })
    }

    /// Create a frame with no rows
    pub fn empty(schema: SchemaRef) -> Self {
        Self {
            schema,
            batches: Vec::new(),
            session: None,
        }
    }

    /// Single Int64 column `id` holding `start`, `start + step`, ... up to `end` (exclusive)
    pub fn range(start: i64, end: i64, step: i64) -> Result<Self> {
        if step == 0 {
            return Err(Error::frame("range step cannot be zero"));
        }

        let mut values = Vec::new();
        let mut current = start;
        while (step > 0 && current < end) || (step < 0 && current > end) {
            values.push(current);
            current = match current.checked_add(step) {
                Some(next) => next,
                None => break,
            };
        }

        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
        let column: ArrayRef = Arc::new(Int64Array::from(values));
        let batch = RecordBatch::try_new(schema.clone(), vec![column])?;

        Self::new(schema, vec![batch])
    }

    /// Rename every column, in order
    pub fn to_df<I, S>(self, names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.len() != self.schema.fields().len() {
            return Err(Error::frame(format!(
                "expected {} column names, got {}",
                self.schema.fields().len(),
                names.len()
            )));
        }

        let fields: Vec<Field> = self
            .schema
            .fields()
            .iter()
            .zip(&names)
            .map(|(field, name)| field.as_ref().clone().with_name(name))
            .collect();
        let schema = Arc::new(Schema::new_with_metadata(
            fields,
            self.schema.metadata().clone(),
        ));

        let batches = self
            .batches
            .iter()
            .map(|batch| RecordBatch::try_new(schema.clone(), batch.columns().to_vec()))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            schema,
            batches,
            session: self.session,
        })
    }

    /// Bind the frame to a session
    #[must_use]
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    /// The session this frame belongs to
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Frame schema
    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// Column names, in order
    pub fn columns(&self) -> Vec<String> {
        self.schema
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    /// Total number of rows
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// Underlying record batches
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    /// Concatenate all batches into one
    pub fn collect(&self) -> Result<RecordBatch> {
        Ok(arrow::compute::concat_batches(&self.schema, &self.batches)?)
    }

    /// First `n` rows
    #[must_use]
    pub fn limit(&self, n: usize) -> Self {
        let mut remaining = n;
        let mut batches = Vec::new();

        for batch in &self.batches {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(batch.num_rows());
            batches.push(batch.slice(0, take));
            remaining -= take;
        }

        Self {
            schema: self.schema.clone(),
            batches,
            session: self.session.clone(),
        }
    }

    /// Rows as JSON objects
    pub fn to_json_rows(&self) -> Result<Vec<Value>> {
        if self.num_rows() == 0 {
            return Ok(Vec::new());
        }

        let mut writer = arrow::json::ArrayWriter::new(Vec::new());
        for batch in &self.batches {
            writer.write(batch)?;
        }
        writer.finish()?;

        Ok(serde_json::from_slice(&writer.into_inner())?)
    }

    /// Render as an ASCII table
    pub fn to_pretty_string(&self) -> Result<String> {
        Ok(arrow::util::pretty::pretty_format_batches(&self.batches)?.to_string())
    }

    /// Start a write through the warehouse connector
    pub fn write(&self) -> DataFrameWriter<'_> {
        DataFrameWriter::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, StringArray};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn values(df: &DataFrame) -> Vec<i64> {
        let batch = df.collect().unwrap();
        let col = batch
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        (0..col.len()).map(|i| col.value(i)).collect()
    }

    #[test]
    fn test_range_to_df_value_column() {
        let df = DataFrame::range(0, 5, 1).unwrap().to_df(["value"]).unwrap();

        assert_eq!(df.columns(), vec!["value"]);
        assert_eq!(df.num_rows(), 5);
        assert_eq!(values(&df), vec![0, 1, 2, 3, 4]);
        assert_eq!(df.schema().field(0).data_type(), &DataType::Int64);
    }

    #[test]
    fn test_range_steps() {
        assert_eq!(values(&DataFrame::range(0, 10, 3).unwrap()), vec![0, 3, 6, 9]);
        assert_eq!(values(&DataFrame::range(5, 0, -2).unwrap()), vec![5, 3, 1]);
        assert_eq!(DataFrame::range(3, 3, 1).unwrap().num_rows(), 0);
        assert!(DataFrame::range(0, 5, 0).is_err());
    }

    #[test]
    fn test_to_df_wrong_arity() {
        let df = DataFrame::range(0, 2, 1).unwrap();
        assert!(df.to_df(["a", "b"]).is_err());
    }

    #[test]
    fn test_new_rejects_mismatched_batches() {
        let ids = DataFrame::range(0, 2, 1).unwrap();
        let other = Arc::new(Schema::new(vec![Field::new("name", DataType::Utf8, true)]));
        let batch = RecordBatch::try_new(
            other,
            vec![Arc::new(StringArray::from(vec!["a"])) as ArrayRef],
        )
        .unwrap();

        assert!(DataFrame::new(ids.schema(), vec![batch]).is_err());
    }

    #[test]
    fn test_limit_spans_batches() {
        let a = DataFrame::range(0, 3, 1).unwrap();
        let b = DataFrame::range(3, 6, 1).unwrap();
        let mut batches = a.batches().to_vec();
        batches.extend_from_slice(b.batches());
        let df = DataFrame::new(a.schema(), batches).unwrap();

        let limited = df.limit(4);
        assert_eq!(limited.num_rows(), 4);
        assert_eq!(values(&limited), vec![0, 1, 2, 3]);
        assert_eq!(df.limit(100).num_rows(), 6);
    }

    #[test]
    fn test_to_json_rows() {
        let df = DataFrame::range(0, 2, 1).unwrap().to_df(["value"]).unwrap();
        let rows = df.to_json_rows().unwrap();
        assert_eq!(rows, vec![json!({"value": 0}), json!({"value": 1})]);

        let empty = DataFrame::empty(df.schema());
        assert!(empty.to_json_rows().unwrap().is_empty());
    }

    #[test]
    fn test_pretty_string() {
        let df = DataFrame::range(0, 2, 1).unwrap().to_df(["value"]).unwrap();
        let table = df.to_pretty_string().unwrap();
        assert!(table.contains("value"));
        assert!(table.contains("| 1"));
    }
}
