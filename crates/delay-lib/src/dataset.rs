//! Historical flight dataset loading
//!
//! Reads the airport operations CSV (one row per flight, columns named as in
//! the source export) into [`TrainingRecord`]s. Columns other than the five
//! used for training are ignored.

use crate::models::{FlightRecord, FlightType, TrainingRecord};
use chrono::NaiveDateTime;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Timestamp layout of `Fecha-I` / `Fecha-O`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read dataset: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid row {row}: {message}")]
    InvalidRow { row: usize, message: String },

    #[error("dataset has no rows")]
    Empty,
}

#[derive(Debug, Deserialize)]
struct FlightRow {
    #[serde(rename = "Fecha-I")]
    scheduled: String,
    #[serde(rename = "Fecha-O")]
    actual: String,
    #[serde(rename = "OPERA")]
    carrier: String,
    #[serde(rename = "TIPOVUELO")]
    flight_type: String,
    #[serde(rename = "MES")]
    month: u8,
}

impl FlightRow {
    fn into_record(self, row: usize) -> Result<TrainingRecord, DatasetError> {
        let invalid = |message: String| DatasetError::InvalidRow { row, message };

        let flight_type: FlightType = self.flight_type.trim().parse().map_err(invalid)?;
        if !(1..=12).contains(&self.month) {
            return Err(invalid(format!("month {} is outside 1-12", self.month)));
        }
        let scheduled_departure = parse_timestamp(&self.scheduled)
            .map_err(|e| invalid(format!("Fecha-I '{}': {}", self.scheduled, e)))?;
        let actual_departure = parse_timestamp(&self.actual)
            .map_err(|e| invalid(format!("Fecha-O '{}': {}", self.actual, e)))?;

        Ok(TrainingRecord {
            flight: FlightRecord::new(self.carrier, flight_type, self.month),
            scheduled_departure,
            actual_departure,
        })
    }
}

fn parse_timestamp(raw: &str) -> chrono::ParseResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT)
}

/// Load every row of a dataset file
pub fn load_training_records(path: &Path) -> Result<Vec<TrainingRecord>, DatasetError> {
    let reader = csv::Reader::from_path(path)?;
    let records = collect(reader)?;
    info!(path = %path.display(), rows = records.len(), "Loaded training dataset");
    Ok(records)
}

/// Parse a dataset from any reader with a header row
pub fn read_training_records<R: Read>(reader: R) -> Result<Vec<TrainingRecord>, DatasetError> {
    collect(csv::Reader::from_reader(reader))
}

fn collect<R: Read>(mut reader: csv::Reader<R>) -> Result<Vec<TrainingRecord>, DatasetError> {
    let mut records = Vec::new();
    for (idx, row) in reader.deserialize::<FlightRow>().enumerate() {
        // Row numbers are 1-based and skip the header
        records.push(row?.into_record(idx + 1)?);
    }
    if records.is_empty() {
        return Err(DatasetError::Empty);
    }
    Ok(records)
}

/// Shuffled train/validation index split, reproducible for a given seed.
/// The validation share is rounded up so a non-zero fraction keeps at least
/// one row whenever there are two or more.
pub fn train_validation_split(
    n_rows: usize,
    validation_fraction: f64,
    seed: u64,
) -> (Vec<usize>, Vec<usize>) {
    let fraction = validation_fraction.clamp(0.0, 1.0);
    let mut indices: Vec<usize> = (0..n_rows).collect();
    if fraction == 0.0 || n_rows < 2 {
        return (indices, Vec::new());
    }

    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_validation = ((n_rows as f64 * fraction).ceil() as usize).min(n_rows - 1);
    let validation = indices.split_off(n_rows - n_validation);
    (indices, validation)
}
