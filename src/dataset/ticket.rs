use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dataset::MAX_ROWS;
use crate::error::{FlightPollError, Result};

/// Named datasets served without going through the poll protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StaticDataset {
    #[serde(rename = "sample")]
    Sample,
    /// Same rows as `Sample`, emitted only after the configured probe delay.
    #[serde(rename = "sample-delay")]
    SampleDelay,
}

impl StaticDataset {
    pub const ALL: [StaticDataset; 2] = [StaticDataset::Sample, StaticDataset::SampleDelay];

    pub fn name(&self) -> &'static str {
        match self {
            StaticDataset::Sample => "sample",
            StaticDataset::SampleDelay => "sample-delay",
        }
    }

    pub fn is_delayed(&self) -> bool {
        matches!(self, StaticDataset::SampleDelay)
    }
}

impl fmt::Display for StaticDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StaticDataset {
    type Err = FlightPollError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sample" => Ok(StaticDataset::Sample),
            "sample-delay" => Ok(StaticDataset::SampleDelay),
            other => Err(FlightPollError::DatasetNotFound(other.to_string())),
        }
    }
}

/// Opaque reference redeemable through the retrieval path.
///
/// Carries everything needed to regenerate the dataset, so redeeming it never
/// consults the job registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultTicket {
    Dataset { name: StaticDataset },
    Query { query: String, job: u64, rows: usize },
}

impl ResultTicket {
    pub fn kind(&self) -> &'static str {
        match self {
            ResultTicket::Dataset { .. } => "dataset",
            ResultTicket::Query { .. } => "query",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| FlightPollError::Internal(format!("failed to encode ticket: {e}")))
    }

    /// Decode a ticket. Anything unrecognised is reported as not found.
    ///
    /// A bare dataset name (`sample`) is accepted as well as the encoded form.
    /// Query tickets with more rows than a result can hold are rejected.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if let Ok(ticket) = serde_json::from_slice::<ResultTicket>(bytes) {
            return match ticket {
                ResultTicket::Query { rows, .. } if rows > MAX_ROWS => Err(
                    FlightPollError::TicketNotFound(String::from_utf8_lossy(bytes).into()),
                ),
                ticket => Ok(ticket),
            };
        }
        std::str::from_utf8(bytes)
            .ok()
            .and_then(|name| name.parse::<StaticDataset>().ok())
            .map(|name| ResultTicket::Dataset { name })
            .ok_or_else(|| FlightPollError::TicketNotFound(String::from_utf8_lossy(bytes).into()))
    }
}
