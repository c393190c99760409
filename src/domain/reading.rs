// Raw reading domain model
use chrono::{DateTime, Utc};

/// One instantaneous sweep of the monitored system, as supplied by a
/// reading provider. All power values are watts; SOC is a percentage.
#[derive(Debug, Clone)]
pub struct RawReading {
    pub solar_w: f64,
    pub grid_w: f64,
    pub battery_soc_pct: f64,
    pub consumption_w: f64,
    pub generation_alarms: Vec<String>,
    pub consumption_alarms: Vec<String>,
    pub notes: Vec<String>,
    /// When the source device took/published the measurement.
    pub data_time: DateTime<Utc>,
}
