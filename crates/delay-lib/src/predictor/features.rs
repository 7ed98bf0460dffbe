//! One-hot feature encoding for flight records
//!
//! Each record contributes one hot column per categorical dimension:
//! carrier (`OPERA_*`), flight type (`TIPOVUELO_*`) and month (`MES_*`).
//! Without a configured feature list the columns are whatever the batch
//! contains. With one, the output is reconciled to exactly that list so it
//! can be fed to a classifier or artifact trained against the same list.

use crate::config::ModelConfig;
use crate::error::{ModelError, Result};
use crate::models::{FlightRecord, FlightType, Labels, TrainingRecord};
use std::collections::{BTreeSet, HashMap};
use tract_onnx::prelude::tract_ndarray::{Array2, ArrayView1, ArrayView2, Axis};

pub const CARRIER_PREFIX: &str = "OPERA";
pub const FLIGHT_TYPE_PREFIX: &str = "TIPOVUELO";
pub const MONTH_PREFIX: &str = "MES";

/// Canonical feature name for a carrier
pub fn carrier_feature(carrier: &str) -> String {
    format!("{}_{}", CARRIER_PREFIX, carrier)
}

/// Canonical feature name for a flight type
pub fn flight_type_feature(flight_type: FlightType) -> String {
    format!("{}_{}", FLIGHT_TYPE_PREFIX, flight_type.code())
}

/// Canonical feature name for a month
pub fn month_feature(month: u8) -> String {
    format!("{}_{}", MONTH_PREFIX, month)
}

/// Row-major `f32` matrix with named columns
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    values: Array2<f32>,
}

impl FeatureMatrix {
    pub fn new(columns: Vec<String>, values: Array2<f32>) -> Result<Self> {
        if values.ncols() != columns.len() {
            return Err(ModelError::ShapeMismatch {
                expected: columns.len(),
                actual: values.ncols(),
            });
        }
        Ok(Self { columns, values })
    }

    /// Build from row vectors; every row must match the column count
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<f32>>) -> Result<Self> {
        let width = columns.len();
        let n_rows = rows.len();
        let mut flat = Vec::with_capacity(n_rows * width);
        for row in rows {
            if row.len() != width {
                return Err(ModelError::ShapeMismatch {
                    expected: width,
                    actual: row.len(),
                });
            }
            flat.extend(row);
        }
        let values = Array2::from_shape_vec((n_rows, width), flat)
            .map_err(|e| ModelError::Training(format!("invalid feature matrix: {}", e)))?;
        Ok(Self { columns, values })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_cols(&self) -> usize {
        self.values.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows() == 0
    }

    pub fn values(&self) -> ArrayView2<'_, f32> {
        self.values.view()
    }

    pub fn row(&self, index: usize) -> ArrayView1<'_, f32> {
        self.values.row(index)
    }

    /// Column by canonical name (first match)
    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f32>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.values.column(idx))
    }

    /// Copy of the matrix restricted to the given row indices, in that order
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.clone(),
            values: self.values.select(Axis(0), indices),
        }
    }

    pub fn to_rows(&self) -> Vec<Vec<f32>> {
        self.values.outer_iter().map(|r| r.to_vec()).collect()
    }

    pub(crate) fn into_array(self) -> Array2<f32> {
        self.values
    }
}

/// Deterministic encoder from flight records to one-hot features
#[derive(Debug, Clone)]
pub struct FeatureEncoder {
    top_features: Vec<String>,
    delay_threshold_minutes: i64,
}

impl FeatureEncoder {
    pub fn new(top_features: Vec<String>, delay_threshold_minutes: i64) -> Self {
        Self {
            top_features,
            delay_threshold_minutes,
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(config.top_features.clone(), config.delay_threshold_minutes)
    }

    pub fn top_features(&self) -> &[String] {
        &self.top_features
    }

    pub fn is_restricted(&self) -> bool {
        !self.top_features.is_empty()
    }

    /// Encode serving-time records into a feature matrix
    pub fn encode(&self, records: &[FlightRecord]) -> FeatureMatrix {
        let flights: Vec<&FlightRecord> = records.iter().collect();
        self.encode_flights(&flights)
    }

    /// Encode historical records into features plus delay labels
    pub fn encode_training(&self, records: &[TrainingRecord]) -> (FeatureMatrix, Labels) {
        let flights: Vec<&FlightRecord> = records.iter().map(|r| &r.flight).collect();
        let features = self.encode_flights(&flights);
        let labels = records.iter().map(|r| self.label(r)).collect();
        (features, labels)
    }

    /// 1 when the departure was strictly later than the threshold
    pub fn label(&self, record: &TrainingRecord) -> i64 {
        if record.delay_minutes() > self.delay_threshold_minutes as f64 {
            1
        } else {
            0
        }
    }

    fn encode_flights(&self, flights: &[&FlightRecord]) -> FeatureMatrix {
        let columns = if self.is_restricted() {
            self.top_features.clone()
        } else {
            natural_columns(flights)
        };

        // A configured list may name a column twice; both copies are filled.
        let mut positions: HashMap<&str, Vec<usize>> = HashMap::with_capacity(columns.len());
        for (idx, name) in columns.iter().enumerate() {
            positions.entry(name.as_str()).or_default().push(idx);
        }

        let mut values = Array2::<f32>::zeros((flights.len(), columns.len()));
        for (row, flight) in flights.iter().enumerate() {
            for name in hot_features(flight) {
                if let Some(cols) = positions.get(name.as_str()) {
                    for &col in cols {
                        values[[row, col]] = 1.0;
                    }
                }
            }
        }

        FeatureMatrix { columns, values }
    }
}

/// The three canonical names that are hot for a record
fn hot_features(flight: &FlightRecord) -> [String; 3] {
    [
        carrier_feature(&flight.carrier),
        flight_type_feature(flight.flight_type),
        month_feature(flight.month),
    ]
}

/// Columns observed in a batch: carriers sorted, then flight types, then months
fn natural_columns(flights: &[&FlightRecord]) -> Vec<String> {
    let carriers: BTreeSet<&str> = flights.iter().map(|f| f.carrier.as_str()).collect();
    let flight_types: BTreeSet<FlightType> = flights.iter().map(|f| f.flight_type).collect();
    let months: BTreeSet<u8> = flights.iter().map(|f| f.month).collect();

    carriers
        .into_iter()
        .map(carrier_feature)
        .chain(
            FlightType::ALL
                .into_iter()
                .filter(|t| flight_types.contains(t))
                .map(flight_type_feature),
        )
        .chain(months.into_iter().map(month_feature))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDateTime};

    fn flight(carrier: &str, flight_type: FlightType, month: u8) -> FlightRecord {
        FlightRecord::new(carrier, flight_type, month)
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn training(flight: FlightRecord, delay: Duration) -> TrainingRecord {
        let scheduled =
            NaiveDateTime::parse_from_str("2017-07-01 10:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        TrainingRecord {
            flight,
            scheduled_departure: scheduled,
            actual_departure: scheduled + delay,
        }
    }

    #[test]
    fn test_restricted_encoding_scenario() {
        let encoder = FeatureEncoder::new(
            names(&["OPERA_A", "OPERA_B", "TIPOVUELO_I", "MES_7", "MES_12"]),
            15,
        );
        let records = vec![
            flight("A", FlightType::International, 7),
            flight("B", FlightType::National, 7),
            flight("A", FlightType::International, 12),
        ];

        let features = encoder.encode(&records);
        assert_eq!(
            features.columns(),
            &names(&["OPERA_A", "OPERA_B", "TIPOVUELO_I", "MES_7", "MES_12"])[..]
        );
        assert_eq!(
            features.to_rows(),
            vec![
                vec![1.0, 0.0, 1.0, 1.0, 0.0],
                vec![0.0, 1.0, 0.0, 1.0, 0.0],
                vec![1.0, 0.0, 1.0, 0.0, 1.0],
            ]
        );
    }

    #[test]
    fn test_full_mode_columns_follow_batch() {
        let encoder = FeatureEncoder::new(Vec::new(), 15);
        let records = vec![
            flight("Sky Airline", FlightType::National, 12),
            flight("Grupo LATAM", FlightType::National, 3),
            flight("Grupo LATAM", FlightType::National, 12),
        ];

        let features = encoder.encode(&records);
        assert_eq!(
            features.columns(),
            &names(&[
                "OPERA_Grupo LATAM",
                "OPERA_Sky Airline",
                "TIPOVUELO_N",
                "MES_3",
                "MES_12",
            ])[..]
        );
        assert_eq!(features.row(0).to_vec(), vec![0.0, 1.0, 1.0, 0.0, 1.0]);
        // Every row has exactly one hot value per dimension
        for row in features.to_rows() {
            assert_eq!(row.iter().sum::<f32>(), 3.0);
        }
    }

    #[test]
    fn test_absent_feature_is_zero_filled() {
        let encoder = FeatureEncoder::new(names(&["MES_7", "COLUMNA_FALSA"]), 15);
        let features = encoder.encode(&[flight("Copa Air", FlightType::International, 7)]);

        assert_eq!(features.n_cols(), 2);
        let fake = features.column("COLUMNA_FALSA").unwrap();
        assert_eq!(fake.sum(), 0.0);
        assert_eq!(features.column("MES_7").unwrap().sum(), 1.0);
    }

    #[test]
    fn test_unlisted_categories_are_dropped() {
        let encoder = FeatureEncoder::new(names(&["OPERA_Copa Air"]), 15);
        let features = encoder.encode(&[
            flight("Copa Air", FlightType::International, 1),
            flight("Unknown Air", FlightType::National, 2),
        ]);

        assert_eq!(features.columns(), &names(&["OPERA_Copa Air"])[..]);
        assert_eq!(features.to_rows(), vec![vec![1.0], vec![0.0]]);
    }

    #[test]
    fn test_column_order_is_independent_of_batch() {
        let list = names(&["MES_12", "TIPOVUELO_N", "OPERA_Grupo LATAM"]);
        let encoder = FeatureEncoder::new(list.clone(), 15);

        let a = encoder.encode(&[flight("Grupo LATAM", FlightType::National, 12)]);
        let b = encoder.encode(&[flight("Sky Airline", FlightType::International, 4)]);

        assert_eq!(a.columns(), &list[..]);
        assert_eq!(b.columns(), &list[..]);
        assert_eq!(a.to_rows(), vec![vec![1.0, 1.0, 1.0]]);
        assert_eq!(b.to_rows(), vec![vec![0.0, 0.0, 0.0]]);
    }

    #[test]
    fn test_duplicate_configured_names_are_both_filled() {
        let encoder = FeatureEncoder::new(names(&["MES_7", "MES_7"]), 15);
        let features = encoder.encode(&[flight("A", FlightType::National, 7)]);
        assert_eq!(features.to_rows(), vec![vec![1.0, 1.0]]);
    }

    #[test]
    fn test_encoding_is_pure() {
        let encoder = FeatureEncoder::new(names(&["OPERA_A", "MES_7"]), 15);
        let records = vec![
            flight("A", FlightType::International, 7),
            flight("B", FlightType::National, 8),
        ];
        assert_eq!(encoder.encode(&records), encoder.encode(&records));
    }

    #[test]
    fn test_row_count_preserved() {
        let encoder = FeatureEncoder::new(Vec::new(), 15);
        let records: Vec<FlightRecord> = (0..50)
            .map(|i| flight("A", FlightType::International, (i % 12 + 1) as u8))
            .collect();
        assert_eq!(encoder.encode(&records).n_rows(), records.len());
    }

    #[test]
    fn test_empty_batch() {
        let encoder = FeatureEncoder::new(names(&["MES_7", "MES_8"]), 15);
        let features = encoder.encode(&[]);
        assert_eq!(features.n_rows(), 0);
        assert_eq!(features.n_cols(), 2);

        let full = FeatureEncoder::new(Vec::new(), 15).encode(&[]);
        assert_eq!(full.n_cols(), 0);
    }

    #[test]
    fn test_label_threshold_is_strict() {
        let encoder = FeatureEncoder::new(Vec::new(), 15);
        let f = flight("A", FlightType::National, 7);

        let on_threshold = training(f.clone(), Duration::minutes(15));
        let just_over = training(f.clone(), Duration::minutes(15) + Duration::seconds(1));
        let early = training(f, Duration::minutes(-10));

        assert_eq!(encoder.label(&on_threshold), 0);
        assert_eq!(encoder.label(&just_over), 1);
        assert_eq!(encoder.label(&early), 0);
    }

    #[test]
    fn test_encode_training_returns_aligned_labels() {
        let encoder = FeatureEncoder::new(names(&["OPERA_A", "OPERA_B"]), 20);
        let records = vec![
            training(flight("A", FlightType::National, 1), Duration::minutes(30)),
            training(flight("B", FlightType::National, 1), Duration::minutes(20)),
            training(flight("A", FlightType::National, 1), Duration::minutes(0)),
        ];

        let (features, labels) = encoder.encode_training(&records);
        assert_eq!(features.n_rows(), 3);
        assert_eq!(labels, vec![1, 0, 0]);
    }

    #[test]
    fn test_from_rows_rejects_ragged_input() {
        let result = FeatureMatrix::from_rows(names(&["a", "b"]), vec![vec![1.0, 0.0], vec![1.0]]);
        assert!(matches!(result, Err(ModelError::ShapeMismatch { .. })));
    }
}
