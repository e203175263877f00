//! Single-row records for sparse, point-wise ingestion

use tsfile_common::error::{Result, StorageError};
use tsfile_common::types::{Timestamp, Value};

/// One measurement value inside a record
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    pub measurement: String,
    pub value: Value,
}

/// A bounded set of points for one device sharing a timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct TsRecord {
    device_id: String,
    timestamp: Timestamp,
    points: Vec<DataPoint>,
    capacity: usize,
}

impl TsRecord {
    pub fn new(device_id: impl Into<String>, timestamp: Timestamp, capacity: usize) -> Self {
        Self {
            device_id: device_id.into(),
            timestamp,
            points: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a point, failing without change once the record is full
    pub fn insert(&mut self, measurement: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        if self.points.len() + 1 > self.capacity {
            return Err(StorageError::BufferNotEnough {
                capacity: self.capacity,
            }
            .into());
        }
        self.points.push(DataPoint {
            measurement: measurement.into(),
            value: value.into(),
        });
        Ok(())
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn points(&self) -> &[DataPoint] {
        &self.points
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
