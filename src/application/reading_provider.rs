// Provider trait for raw readings
use crate::domain::reading::RawReading;
use async_trait::async_trait;
use thiserror::Error;

/// The one failure mode a provider exposes: no reading could be obtained at
/// all (source unreachable, malformed response, budget exhausted). The report
/// contract has no optional fields, so there is no partial-success case.
#[derive(Debug, Error)]
#[error("no raw reading available from the source: {reason}")]
pub struct DataUnavailable {
    pub reason: String,
}

impl DataUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Supplies one complete instantaneous reading per call. The transport behind
/// it (cloud API, serial link, sensor bus) is the implementation's business.
#[async_trait]
pub trait ReadingProvider: Send + Sync {
    async fn latest_reading(&self) -> Result<RawReading, DataUnavailable>;
}
