//! Query execution against an open reader

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use tsfile_common::error::{QueryError, Result};
use tsfile_common::types::{Path, Timestamp};
use tsfile_storage::TsFileReader;

use crate::expression::Expression;
use crate::planner::QueryExpression;
use crate::result_set::{ResultSet, ResultSetMetadata};

/// Runs query requests over one reader
pub struct Executor<'r> {
    reader: &'r TsFileReader,
}

impl<'r> Executor<'r> {
    pub fn new(reader: &'r TsFileReader) -> Self {
        Self { reader }
    }

    /// Resolve every selected and filtered path, then open a cursor.
    ///
    /// Unknown devices and measurements fail here, before any row is read,
    /// and so does a path selected twice.
    pub fn execute(&self, query: QueryExpression) -> Result<ResultSet> {
        let (selected, expression) = query.into_parts();
        if selected.is_empty() {
            return Err(QueryError::InvalidQuery("no columns selected".to_string()).into());
        }
        let duplicate = {
            let mut seen = BTreeSet::new();
            selected.iter().find(|path| !seen.insert(*path)).cloned()
        };
        if let Some(path) = duplicate {
            return Err(QueryError::InvalidQuery(format!("{path} selected more than once")).into());
        }

        let mut columns = Vec::with_capacity(selected.len());
        let mut described = Vec::with_capacity(selected.len());
        for path in selected {
            let series = self.reader.series(&path)?;
            described.push((path, series.data_type()));
            columns.push(series);
        }

        let mut filter_series = BTreeMap::new();
        if let Some(expr) = &expression {
            for path in expr.paths() {
                if !filter_series.contains_key(path) {
                    filter_series.insert(path.clone(), self.reader.series(path)?);
                }
            }
        }

        match &expression {
            Some(expr) => info!("Executing query over {} columns where {}", described.len(), expr),
            None => info!("Executing query over {} columns", described.len()),
        }
        debug!(
            "Query reads {} selected and {} filter series from {:?}",
            columns.len(),
            filter_series.len(),
            self.reader.path()
        );

        Ok(ResultSet::new(
            ResultSetMetadata::new(described),
            columns,
            filter_series,
            expression,
        ))
    }

    /// Selected paths filtered by an optional expression
    pub fn query(&self, selected: Vec<Path>, expression: Option<Expression>) -> Result<ResultSet> {
        self.execute(QueryExpression::new(selected, expression))
    }

    /// Rows with `begin <= time <= end`; `None` leaves a side open
    pub fn query_time_range(
        &self,
        selected: Vec<Path>,
        begin: Option<Timestamp>,
        end: Option<Timestamp>,
    ) -> Result<ResultSet> {
        self.execute(QueryExpression::time_range(selected, begin, end))
    }

    /// Like [`Executor::query_time_range`] with `-1` for an open side
    pub fn begin_end(&self, selected: Vec<Path>, begin: Timestamp, end: Timestamp) -> Result<ResultSet> {
        self.execute(QueryExpression::begin_end(selected, begin, end))
    }

    /// Every row of the selected columns
    pub fn read_all(&self, selected: Vec<Path>) -> Result<ResultSet> {
        self.execute(QueryExpression::read_all(selected))
    }

    /// Measurements of one device over an inclusive time range
    pub fn query_timeseries(
        &self,
        device: &str,
        measurements: &[&str],
        begin: Timestamp,
        end: Timestamp,
    ) -> Result<ResultSet> {
        let selected = measurements.iter().map(|m| Path::new(device, *m)).collect();
        self.query_time_range(selected, Some(begin), Some(end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Operator;
    use tsfile_common::error::codes::*;
    use tsfile_common::types::{DataType, Value};
    use tsfile_storage::{ColumnSchema, DeviceSchema, Tablet, TsFileContext, TsFileWriter};

    /// d1.s1 holds 0..10 at t=0..9; d1.s2 holds text at even timestamps only
    fn sample_reader(dir: &tempfile::TempDir) -> TsFileReader {
        let ctx = TsFileContext::default();
        let path = dir.path().join("exec.tsfile");
        let mut writer = TsFileWriter::open(&ctx, &path).unwrap();
        writer
            .register_device(&DeviceSchema::new(
                "d1",
                vec![
                    ColumnSchema::field("s1", DataType::Int64),
                    ColumnSchema::field("s2", DataType::Text),
                    ColumnSchema::field("s3", DataType::Boolean),
                ],
            ))
            .unwrap();

        let mut tablet = Tablet::new("d1", 10).unwrap();
        tablet.add_column("s1", DataType::Int64).unwrap();
        tablet.add_column("s2", DataType::Text).unwrap();
        for row in 0..10usize {
            let ts = i64::try_from(row).unwrap();
            tablet.add_timestamp(row, ts).unwrap();
            tablet.add_value(row, "s1", ts).unwrap();
            if row % 2 == 0 {
                tablet.add_value(row, "s2", format!("v{row}")).unwrap();
            }
        }
        writer.write_tablet(tablet).unwrap();
        writer.close().unwrap();
        TsFileReader::open(&ctx, &path).unwrap()
    }

    fn collect_timestamps(mut rs: ResultSet) -> Vec<Timestamp> {
        let mut out = Vec::new();
        while rs.next().unwrap() {
            out.push(rs.timestamp().unwrap());
        }
        out
    }

    #[test]
    fn test_read_all_and_cursor_states() {
        let dir = tempfile::tempdir().unwrap();
        let reader = sample_reader(&dir);
        let executor = Executor::new(&reader);

        let mut rs = executor
            .read_all(vec![Path::new("d1", "s1"), Path::new("d1", "s2")])
            .unwrap();
        assert_eq!(rs.metadata().column_names(), &["d1.s1", "d1.s2"]);
        assert_eq!(rs.timestamp().unwrap_err().code(), E_INVALID_ARG);

        assert!(rs.next().unwrap());
        assert_eq!(rs.get::<i64>("s1").unwrap(), 0);
        assert_eq!(rs.get::<String>("d1.s2").unwrap(), "v0");

        assert!(rs.next().unwrap());
        assert!(rs.is_null(1usize).unwrap());
        assert_eq!(rs.get::<String>("s2").unwrap_err().code(), E_NOT_EXIST);
        assert_eq!(rs.get::<i32>("s1").unwrap_err().code(), E_TYPE_MISMATCH);
        assert_eq!(rs.value("s1").unwrap(), Some(&Value::Int64(1)));
        assert_eq!(rs.is_null("s3").unwrap_err().code(), E_MEASUREMENT_NOT_EXIST);

        let mut count = 2;
        while rs.next().unwrap() {
            count += 1;
        }
        assert_eq!(count, 10);
        assert!(!rs.next().unwrap());
        assert_eq!(rs.is_null("s1").unwrap_err().code(), E_INVALID_ARG);
    }

    #[test]
    fn test_time_range_forms() {
        let dir = tempfile::tempdir().unwrap();
        let reader = sample_reader(&dir);
        let executor = Executor::new(&reader);
        let paths = || vec![Path::new("d1", "s1")];

        let rs = executor.query_time_range(paths(), Some(3), Some(5)).unwrap();
        assert_eq!(collect_timestamps(rs), vec![3, 4, 5]);

        let rs = executor.begin_end(paths(), -1, 2).unwrap();
        assert_eq!(collect_timestamps(rs), vec![0, 1, 2]);

        let rs = executor.begin_end(paths(), 8, -1).unwrap();
        assert_eq!(collect_timestamps(rs), vec![8, 9]);

        let rs = executor.query_timeseries("d1", &["s1", "s2"], 4, 6).unwrap();
        assert_eq!(collect_timestamps(rs), vec![4, 5, 6]);

        let rs = executor.query_time_range(paths(), Some(6), Some(2)).unwrap();
        assert!(collect_timestamps(rs).is_empty());
    }

    #[test]
    fn test_filter_on_other_series() {
        let dir = tempfile::tempdir().unwrap();
        let reader = sample_reader(&dir);
        let executor = Executor::new(&reader);

        let expr = Expression::and(
            Expression::time_filter("d1", "s2", Operator::Ge, 0),
            Expression::column_filter("d1", "s1", Operator::Gt, 4i32),
        );
        let rs = executor.query(vec![Path::new("d1", "s1")], Some(expr)).unwrap();
        assert_eq!(collect_timestamps(rs), vec![6, 8]);

        let expr = Expression::column_filter("d1", "s2", Operator::Lt, "v4");
        let rs = executor.query(vec![Path::new("d1", "s2")], Some(expr)).unwrap();
        assert_eq!(collect_timestamps(rs), vec![0, 2]);
    }

    #[test]
    fn test_unknown_paths_fail_at_execution() {
        let dir = tempfile::tempdir().unwrap();
        let reader = sample_reader(&dir);
        let executor = Executor::new(&reader);

        let err = executor.read_all(vec![Path::new("d1", "nope")]).err().unwrap();
        assert_eq!(err.code(), E_MEASUREMENT_NOT_EXIST);

        let err = executor.read_all(vec![Path::new("d9", "s1")]).err().unwrap();
        assert_eq!(err.code(), E_DEVICE_NOT_EXIST);

        let filter = Expression::column_filter("d9", "s1", Operator::Gt, 0i64);
        let err = executor
            .query(vec![Path::new("d1", "s1")], Some(filter))
            .err()
            .unwrap();
        assert_eq!(err.code(), E_DEVICE_NOT_EXIST);

        let err = executor.read_all(Vec::new()).err().unwrap();
        assert_eq!(err.code(), E_INVALID_QUERY);
    }

    #[test]
    fn test_duplicate_selection_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let reader = sample_reader(&dir);
        let executor = Executor::new(&reader);

        let err = executor
            .read_all(vec![Path::new("d1", "s1"), Path::new("d1", "s2"), Path::new("d1", "s1")])
            .err()
            .unwrap();
        assert_eq!(err.code(), E_INVALID_QUERY);

        let mut rs = executor
            .read_all(vec![Path::new("d1", "s1"), Path::new("d1", "s2")])
            .unwrap();
        let batch = crate::pull(&mut rs, 10).unwrap();
        assert_eq!(batch.column_count(), 2);
        assert_eq!(batch.current_row_count(), 10);
    }

    #[test]
    fn test_registered_but_empty_series() {
        let dir = tempfile::tempdir().unwrap();
        let reader = sample_reader(&dir);
        let executor = Executor::new(&reader);

        let mut rs = executor.read_all(vec![Path::new("d1", "s3")]).unwrap();
        assert_eq!(rs.metadata().data_types(), &[DataType::Boolean]);
        assert!(!rs.next().unwrap());
    }
}
