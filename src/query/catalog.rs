use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::error::{FlightPollError, Result};

/// A named long-running query class with a fixed declared duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryClass {
    pub name: String,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    /// Rows in the synthetic result produced on completion.
    pub rows: usize,
}

impl QueryClass {
    pub fn new(name: impl Into<String>, duration: Duration, rows: usize) -> Self {
        Self {
            name: name.into(),
            duration,
            rows,
        }
    }
}

/// Parses `NAME=SECS` or `NAME=SECS:ROWS`.
impl FromStr for QueryClass {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (name, rest) = s
            .split_once('=')
            .ok_or_else(|| format!("expected NAME=SECS[:ROWS], got {s:?}"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err("query class name cannot be empty".to_string());
        }

        let (secs, rows) = match rest.split_once(':') {
            Some((secs, rows)) => (
                secs,
                rows.trim()
                    .parse::<usize>()
                    .map_err(|e| format!("invalid row count {rows:?}: {e}"))?,
            ),
            None => (rest, DEFAULT_ROWS),
        };
        let secs = secs
            .trim()
            .parse::<u64>()
            .map_err(|e| format!("invalid duration {secs:?}: {e}"))?;

        Ok(Self::new(name, Duration::from_secs(secs), rows))
    }
}

const DEFAULT_ROWS: usize = 1_000;

/// The set of query classes a submission may name.
#[derive(Debug, Clone, Serialize)]
pub struct QueryCatalog {
    classes: BTreeMap<String, QueryClass>,
}

impl Default for QueryCatalog {
    fn default() -> Self {
        Self::empty()
            .with_class(QueryClass::new("short", Duration::from_secs(60), 1_000))
            .with_class(QueryClass::new("long", Duration::from_secs(120), 2_000))
            .with_class(QueryClass::new("very-long", Duration::from_secs(300), 5_000))
            .with_class(QueryClass::new(
                "ultra-long",
                Duration::from_secs(2 * 60 * 60),
                10_000,
            ))
    }
}

impl QueryCatalog {
    pub fn empty() -> Self {
        Self {
            classes: BTreeMap::new(),
        }
    }

    /// Add or replace a class.
    pub fn with_class(mut self, class: QueryClass) -> Self {
        self.classes.insert(class.name.clone(), class);
        self
    }

    pub fn lookup(&self, name: &str) -> Result<&QueryClass> {
        self.classes
            .get(name)
            .ok_or_else(|| FlightPollError::QueryNotFound(name.to_string()))
    }

    pub fn classes(&self) -> impl Iterator<Item = &QueryClass> {
        self.classes.values()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }
}
