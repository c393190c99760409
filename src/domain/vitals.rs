// Vitals report domain model
//
// The serialized shape of this report is a compatibility contract: key names
// (including the accented "generación"), nesting, and timestamp precision are
// fixed and consumed by external parsers. Do not rename fields.
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Serialize)]
pub struct VitalsReport {
    /// Instant the report was assembled (the query time), microsecond precision.
    #[serde(serialize_with = "rfc3339_micros")]
    pub timestamp_utc: DateTime<Utc>,
    /// Instant the underlying measurement was taken, second precision.
    #[serde(serialize_with = "rfc3339_seconds")]
    pub timestamp_data: DateTime<Utc>,
    #[serde(rename = "generación")]
    pub generacion: GenerationBlock,
    pub consumo: ConsumptionBlock,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationBlock {
    pub solar: PowerReading,
    pub red: PowerReading,
    pub bateria: BatteryReading,
    pub alarmas: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PowerReading {
    pub potencia_w: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatteryReading {
    pub bateria_soc_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsumptionBlock {
    pub potencia_w: f64,
    pub alarmas: Vec<String>,
}

impl VitalsReport {
    /// How far the measurement lags behind the query instant. Negative when
    /// the source clock runs ahead of ours.
    pub fn data_age(&self) -> Duration {
        self.timestamp_utc - self.timestamp_data
    }

    /// A reading older than `tolerance` means the source went offline and we
    /// are looking at a cached/last-known value. Stale reports are still
    /// valid reports; staleness is a signal, not an error.
    pub fn is_stale(&self, tolerance: Duration) -> bool {
        self.data_age() > tolerance
    }
}

fn rfc3339_micros<S: Serializer>(t: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&t.to_rfc3339_opts(SecondsFormat::Micros, true))
}

fn rfc3339_seconds<S: Serializer>(t: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&t.to_rfc3339_opts(SecondsFormat::Secs, true))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn sample_report() -> VitalsReport {
        VitalsReport {
            timestamp_utc: utc("2025-09-16T13:16:40.302827Z"),
            timestamp_data: utc("2025-09-16T12:16:42Z"),
            generacion: GenerationBlock {
                solar: PowerReading { potencia_w: 3142.89 },
                red: PowerReading { potencia_w: 98.0 },
                bateria: BatteryReading { bateria_soc_pct: 84.0 },
                alarmas: vec![],
            },
            consumo: ConsumptionBlock {
                potencia_w: 2788.5,
                alarmas: vec![],
            },
            notes: vec![],
        }
    }

    #[test]
    fn test_serializes_exact_contract_keys() {
        let value = serde_json::to_value(sample_report()).unwrap();
        let expected = serde_json::json!({
            "timestamp_utc": "2025-09-16T13:16:40.302827Z",
            "timestamp_data": "2025-09-16T12:16:42Z",
            "generación": {
                "solar": { "potencia_w": 3142.89 },
                "red": { "potencia_w": 98.0 },
                "bateria": { "bateria_soc_pct": 84.0 },
                "alarmas": []
            },
            "consumo": {
                "potencia_w": 2788.5,
                "alarmas": []
            },
            "notes": []
        });
        assert_eq!(value, expected);
    }

    #[test]
    fn test_empty_lists_serialize_as_arrays() {
        let value = serde_json::to_value(sample_report()).unwrap();
        assert!(value["generación"]["alarmas"].as_array().unwrap().is_empty());
        assert!(value["consumo"]["alarmas"].as_array().unwrap().is_empty());
        assert!(value["notes"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_timestamp_utc_keeps_microsecond_precision() {
        let value = serde_json::to_value(sample_report()).unwrap();
        assert_eq!(value["timestamp_utc"], "2025-09-16T13:16:40.302827Z");
        // Whole-second instants still carry the full fractional part.
        let mut report = sample_report();
        report.timestamp_utc = utc("2025-09-16T13:16:40Z");
        let value = serde_json::to_value(report).unwrap();
        assert_eq!(value["timestamp_utc"], "2025-09-16T13:16:40.000000Z");
    }

    #[test]
    fn test_timestamp_data_truncates_to_seconds() {
        let mut report = sample_report();
        report.timestamp_data = utc("2025-09-16T12:16:42.987654Z");
        let value = serde_json::to_value(report).unwrap();
        assert_eq!(value["timestamp_data"], "2025-09-16T12:16:42Z");
    }

    #[test]
    fn test_staleness_flips_past_tolerance() {
        let report = sample_report();
        // ~1h gap in the sample: stale against a 5-minute window.
        assert!(report.is_stale(Duration::minutes(5)));
        assert!(!report.is_stale(Duration::hours(2)));

        // Boundary: an age exactly at the tolerance is still fresh.
        let mut report = sample_report();
        report.timestamp_utc = utc("2025-09-16T12:21:42Z");
        assert!(!report.is_stale(Duration::minutes(5)));
        report.timestamp_utc = utc("2025-09-16T12:21:43Z");
        assert!(report.is_stale(Duration::minutes(5)));
    }

    #[test]
    fn test_source_clock_ahead_reads_as_fresh() {
        let mut report = sample_report();
        report.timestamp_data = utc("2025-09-16T13:16:45Z");
        assert!(report.data_age() < Duration::zero());
        assert!(!report.is_stale(Duration::minutes(5)));
    }
}
