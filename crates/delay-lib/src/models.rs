//! Core data models for the delay predictor

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Binary delay labels, one per training row (1 = delayed)
pub type Labels = Vec<i64>;

/// Flight type code as it appears in the operations dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FlightType {
    #[serde(rename = "I")]
    International,
    #[serde(rename = "N")]
    National,
}

impl FlightType {
    /// Every flight type, in one-hot column order
    pub const ALL: [FlightType; 2] = [FlightType::International, FlightType::National];

    pub fn code(&self) -> &'static str {
        match self {
            FlightType::International => "I",
            FlightType::National => "N",
        }
    }
}

impl fmt::Display for FlightType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for FlightType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "I" => Ok(FlightType::International),
            "N" => Ok(FlightType::National),
            other => Err(format!(
                "flight type must be 'I' (international) or 'N' (national), got '{}'",
                other
            )),
        }
    }
}

/// A single flight as seen at serving time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightRecord {
    /// Operating airline name (OPERA)
    pub carrier: String,
    /// Flight type code (TIPOVUELO)
    pub flight_type: FlightType,
    /// Month of operation, 1-12 (MES)
    pub month: u8,
}

impl FlightRecord {
    pub fn new(carrier: impl Into<String>, flight_type: FlightType, month: u8) -> Self {
        Self {
            carrier: carrier.into(),
            flight_type,
            month,
        }
    }
}

/// A historical flight with its scheduled and actual departure times
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub flight: FlightRecord,
    /// Scheduled departure (Fecha-I)
    pub scheduled_departure: NaiveDateTime,
    /// Actual departure (Fecha-O)
    pub actual_departure: NaiveDateTime,
}

impl TrainingRecord {
    /// Minutes between scheduled and actual departure; negative when early
    pub fn delay_minutes(&self) -> f64 {
        (self.actual_departure - self.scheduled_departure).num_seconds() as f64 / 60.0
    }
}
