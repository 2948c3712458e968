//! Per-rank packing of surface point records into the point-major send layout.
//!
//! The local buffer holds exactly `local_count` rows. Padding to the global
//! maximum happens only when the gather builds its fixed-stride send buffers
//! (see [`LocalFieldBuffer::padded_ids`]).

use crate::algs::wire::{WireId, WireScalar};
use crate::data::field_catalog::FieldCatalog;
use crate::output_error::{OutputError, Stage};

/// One locally owned surface point as produced by the solution-mapping stage.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalPointRecord {
    /// Domain-wide unique point id.
    pub global_id: u64,
    /// One value per catalog field, in catalog order.
    pub values: Vec<f64>,
}

impl LocalPointRecord {
    pub fn new(global_id: u64, values: impl Into<Vec<f64>>) -> Self {
        Self {
            global_id,
            values: values.into(),
        }
    }
}

/// Contiguous ids and point-major values of this rank's surface points.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LocalFieldBuffer {
    ids: Vec<u64>,
    values: Vec<f64>,
    width: usize,
}

impl LocalFieldBuffer {
    /// Pack row records; every record must carry `catalog.len()` values.
    pub fn from_records(
        catalog: &FieldCatalog,
        records: &[LocalPointRecord],
    ) -> Result<Self, OutputError> {
        let width = catalog.len();
        let mut ids = Vec::with_capacity(records.len());
        let mut values = Vec::with_capacity(records.len() * width);
        for (index, rec) in records.iter().enumerate() {
            if rec.values.len() != width {
                return Err(OutputError::InvalidRecord {
                    index,
                    global_id: rec.global_id,
                    expected: width,
                    found: rec.values.len(),
                });
            }
            ids.push(rec.global_id);
            values.extend_from_slice(&rec.values);
        }
        Ok(Self { ids, values, width })
    }

    /// Pack field-major columns (`columns[field][point]`) into point-major rows.
    pub fn from_columns(
        catalog: &FieldCatalog,
        ids: &[u64],
        columns: &[Vec<f64>],
    ) -> Result<Self, OutputError> {
        let width = catalog.len();
        if columns.len() != width {
            return Err(OutputError::ColumnCount {
                expected: width,
                found: columns.len(),
            });
        }
        if let Some((field, col)) = columns.iter().enumerate().find(|(_, c)| c.len() != ids.len()) {
            return Err(OutputError::ColumnMismatch {
                field,
                expected: ids.len(),
                found: col.len(),
            });
        }
        let mut values = Vec::with_capacity(ids.len() * width);
        for point in 0..ids.len() {
            values.extend(columns.iter().map(|col| col[point]));
        }
        Ok(Self {
            ids: ids.to_vec(),
            values,
            width,
        })
    }

    /// Number of real (non-padding) points on this rank.
    pub fn local_count(&self) -> usize {
        self.ids.len()
    }

    /// Values per point.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Values of local point `p`.
    pub fn row(&self, p: usize) -> &[f64] {
        &self.values[p * self.width..(p + 1) * self.width]
    }

    /// Id send buffer padded with zeroed rows up to `rows` entries.
    pub fn padded_ids(&self, rows: usize) -> Result<Vec<WireId>, OutputError> {
        let mut buf = try_alloc::<WireId>(rows, Stage::Gather)?;
        buf.extend(self.ids.iter().map(|&id| WireId::of(id)));
        buf.resize(rows, WireId::default());
        Ok(buf)
    }

    /// Value send buffer padded with zeroed rows up to `rows * width` entries.
    pub fn padded_values(&self, rows: usize) -> Result<Vec<WireScalar>, OutputError> {
        let len = rows.checked_mul(self.width).ok_or(OutputError::BufferTooLarge {
            stage: Stage::Gather,
            what: "value send buffer",
        })?;
        let mut buf = try_alloc::<WireScalar>(len, Stage::Gather)?;
        buf.extend(self.values.iter().map(|&v| WireScalar::of(v)));
        buf.resize(len, WireScalar::default());
        Ok(buf)
    }
}

/// Empty vector with room for exactly `elements`, or an allocation error.
pub(crate) fn try_alloc<T>(elements: usize, stage: Stage) -> Result<Vec<T>, OutputError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(elements)
        .map_err(|_| OutputError::Allocation { stage, elements })?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog2() -> FieldCatalog {
        FieldCatalog::new(["P", "T"]).unwrap()
    }

    #[test]
    fn records_pack_point_major() {
        let recs = [
            LocalPointRecord::new(9, [1.0, 2.0]),
            LocalPointRecord::new(4, [3.0, 4.0]),
        ];
        let buf = LocalFieldBuffer::from_records(&catalog2(), &recs).unwrap();
        assert_eq!(buf.ids(), &[9, 4]);
        assert_eq!(buf.values(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(buf.row(1), &[3.0, 4.0]);
    }

    #[test]
    fn columns_are_transposed() {
        let cols = vec![vec![1.0, 3.0], vec![2.0, 4.0]];
        let buf = LocalFieldBuffer::from_columns(&catalog2(), &[9, 4], &cols).unwrap();
        let recs = [
            LocalPointRecord::new(9, [1.0, 2.0]),
            LocalPointRecord::new(4, [3.0, 4.0]),
        ];
        assert_eq!(buf, LocalFieldBuffer::from_records(&catalog2(), &recs).unwrap());
    }

    #[test]
    fn wrong_width_record_is_rejected() {
        let recs = [
            LocalPointRecord::new(1, [1.0, 2.0]),
            LocalPointRecord::new(2, [1.0]),
        ];
        let err = LocalFieldBuffer::from_records(&catalog2(), &recs).unwrap_err();
        assert!(matches!(
            err,
            OutputError::InvalidRecord { index: 1, global_id: 2, expected: 2, found: 1 }
        ));
        assert_eq!(err.stage(), Some(Stage::Pack));
    }

    #[test]
    fn ragged_column_is_rejected() {
        let cols = vec![vec![1.0, 3.0], vec![2.0]];
        let err = LocalFieldBuffer::from_columns(&catalog2(), &[9, 4], &cols).unwrap_err();
        assert!(matches!(err, OutputError::ColumnMismatch { field: 1, expected: 2, found: 1 }));
    }

    #[test]
    fn impossible_allocation_is_an_error() {
        let err = try_alloc::<WireScalar>(usize::MAX, Stage::Gather).unwrap_err();
        assert!(matches!(
            err,
            OutputError::Allocation { stage: Stage::Gather, elements: usize::MAX }
        ));
    }

    #[test]
    fn padding_extends_to_stride() {
        let recs = [LocalPointRecord::new(7, [1.5, -2.0])];
        let buf = LocalFieldBuffer::from_records(&catalog2(), &recs).unwrap();
        let ids = buf.padded_ids(3).unwrap();
        let vals = buf.padded_values(3).unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(vals.len(), 6);
        assert_eq!(ids[0].get(), 7);
        assert_eq!(vals[1].get(), -2.0);
    }
}
