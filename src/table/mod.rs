use anyhow::{anyhow, Context, Result};
use arrow::array::{Array, ArrayRef, BooleanArray, Float64Array, StringArray};
use arrow::compute::{cast, filter_record_batch};
use arrow::datatypes::{DataType, Field, FieldRef, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

/// An immutable record table. Every operation builds a new `Table`, so a
/// pipeline step is a plain `Table -> Table` function and later steps always
/// observe fully materialized columns.
#[derive(Debug, Clone)]
pub struct Table {
    batch: RecordBatch,
}

impl Table {
    pub fn new(batch: RecordBatch) -> Self {
        Self { batch }
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.batch
            .schema()
            .index_of(name)
            .map_err(|_| anyhow!("column `{}` not present", name))
    }

    pub fn column(&self, name: &str) -> Result<&ArrayRef> {
        Ok(self.batch.column(self.index_of(name)?))
    }

    /// Borrow a Utf8 column.
    pub fn str_column(&self, name: &str) -> Result<&StringArray> {
        let col = self.column(name)?;
        col.as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| {
                anyhow!(
                    "column `{}` is not a string column (found {:?})",
                    name,
                    col.data_type()
                )
            })
    }

    /// A numeric column widened to f64. Nulls survive the cast.
    pub fn f64_column(&self, name: &str) -> Result<Float64Array> {
        let col = self.column(name)?;
        if !col.data_type().is_numeric() {
            return Err(anyhow!(
                "column `{}` is not numeric (found {:?})",
                name,
                col.data_type()
            ));
        }
        let widened = cast(col, &DataType::Float64)
            .with_context(|| format!("casting column `{}` to f64", name))?;
        Ok(widened
            .as_any()
            .downcast_ref::<Float64Array>()
            .ok_or_else(|| anyhow!("column `{}` did not cast to f64", name))?
            .clone())
    }

    /// Drop columns by name. Asking for an absent column is an error, never a
    /// silent no-op.
    pub fn drop_columns(&self, names: &[&str]) -> Result<Table> {
        for name in names {
            self.index_of(name)?;
        }
        let schema = self.batch.schema();
        let mut fields: Vec<FieldRef> = Vec::with_capacity(schema.fields().len());
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());
        for (i, field) in schema.fields().iter().enumerate() {
            if names.contains(&field.name().as_str()) {
                continue;
            }
            fields.push(field.clone());
            columns.push(self.batch.column(i).clone());
        }
        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
            .context("rebuilding batch after column drop")?;
        Ok(Table::new(batch))
    }

    /// Append a derived column.
    pub fn with_column(&self, field: Field, array: ArrayRef) -> Result<Table> {
        if self.index_of(field.name()).is_ok() {
            return Err(anyhow!("column `{}` already present", field.name()));
        }
        let schema = self.batch.schema();
        let mut fields: Vec<FieldRef> = schema.fields().iter().cloned().collect();
        fields.push(Arc::new(field));
        let mut columns = self.batch.columns().to_vec();
        columns.push(array);
        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
            .context("rebuilding batch with appended column")?;
        Ok(Table::new(batch))
    }

    /// Swap a column in place, keeping its position in the schema.
    pub fn replace_column(&self, name: &str, field: Field, array: ArrayRef) -> Result<Table> {
        let idx = self.index_of(name)?;
        let schema = self.batch.schema();
        let mut fields: Vec<FieldRef> = schema.fields().iter().cloned().collect();
        fields[idx] = Arc::new(field);
        let mut columns = self.batch.columns().to_vec();
        columns[idx] = array;
        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
            .with_context(|| format!("rebuilding batch after replacing `{}`", name))?;
        Ok(Table::new(batch))
    }

    /// Keep only the rows where `mask` is true.
    pub fn filter(&self, mask: &BooleanArray) -> Result<Table> {
        let batch = filter_record_batch(&self.batch, mask).context("filtering rows")?;
        Ok(Table::new(batch))
    }
}
