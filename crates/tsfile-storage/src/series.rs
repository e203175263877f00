//! Time-sorted points of one series, rebuilt from chunks at open

use std::collections::BTreeMap;

use tsfile_common::types::{DataType, Timestamp, Value};

/// Points of one (device, measurement) pair in ascending timestamp order
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesData {
    data_type: DataType,
    timestamps: Vec<Timestamp>,
    values: Vec<Value>,
}

impl SeriesData {
    pub fn empty(data_type: DataType) -> Self {
        Self {
            data_type,
            timestamps: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn timestamps(&self) -> &[Timestamp] {
        &self.timestamps
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Value stored at exactly `timestamp`
    pub fn value_at(&self, timestamp: Timestamp) -> Option<&Value> {
        self.timestamps
            .binary_search(&timestamp)
            .ok()
            .map(|idx| &self.values[idx])
    }

    /// Point at position `idx`
    pub fn point(&self, idx: usize) -> Option<(Timestamp, &Value)> {
        Some((*self.timestamps.get(idx)?, self.values.get(idx)?))
    }
}

/// Accumulates points from successive chunks; a later point replaces an
/// earlier one at the same timestamp
#[derive(Debug)]
pub(crate) struct SeriesBuilder {
    data_type: DataType,
    points: BTreeMap<Timestamp, Value>,
}

impl SeriesBuilder {
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            points: BTreeMap::new(),
        }
    }

    pub fn extend(&mut self, timestamps: Vec<Timestamp>, values: Vec<Value>) {
        self.points.extend(timestamps.into_iter().zip(values));
    }

    pub fn build(self) -> SeriesData {
        let (timestamps, values) = self.points.into_iter().unzip();
        SeriesData {
            data_type: self.data_type,
            timestamps,
            values,
        }
    }
}
