// Vitals service - Use case for building one vitals report snapshot
use crate::application::reading_provider::{DataUnavailable, ReadingProvider};
use crate::domain::reading::RawReading;
use crate::domain::vitals::{
    BatteryReading, ConsumptionBlock, GenerationBlock, PowerReading, VitalsReport,
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

#[derive(Clone)]
pub struct VitalsService {
    provider: Arc<dyn ReadingProvider>,
    stale_after: Duration,
}

impl VitalsService {
    pub fn new(provider: Arc<dyn ReadingProvider>, stale_after: Duration) -> Self {
        Self {
            provider,
            stale_after,
        }
    }

    /// Builds one fresh report: acquire a reading, stamp it with the current
    /// instant, reshape it into the output contract. Fails with
    /// `DataUnavailable` when the provider has nothing; a stale reading is
    /// returned as-is (the two timestamps carry the staleness signal).
    pub async fn build_report(&self) -> Result<VitalsReport, DataUnavailable> {
        let reading = self.provider.latest_reading().await?;
        let report = Self::assemble(reading, Utc::now());

        if report.is_stale(self.stale_after) {
            tracing::warn!(
                timestamp_data = %report.timestamp_data,
                age_secs = report.data_age().num_seconds(),
                "data source looks disconnected, serving last-known reading"
            );
        } else if report.data_age() < Duration::zero() {
            tracing::debug!(
                timestamp_data = %report.timestamp_data,
                "source clock is ahead of ours"
            );
        }

        Ok(report)
    }

    fn assemble(reading: RawReading, now: DateTime<Utc>) -> VitalsReport {
        VitalsReport {
            timestamp_utc: now,
            timestamp_data: reading.data_time,
            generacion: GenerationBlock {
                solar: PowerReading {
                    potencia_w: reading.solar_w,
                },
                red: PowerReading {
                    potencia_w: reading.grid_w,
                },
                bateria: BatteryReading {
                    bateria_soc_pct: reading.battery_soc_pct,
                },
                alarmas: reading.generation_alarms,
            },
            consumo: ConsumptionBlock {
                potencia_w: reading.consumption_w,
                alarmas: reading.consumption_alarms,
            },
            notes: reading.notes,
        }
    }
}
