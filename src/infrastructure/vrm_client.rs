// Victron VRM cloud API client
//
// Produces one complete RawReading per sweep: discover the generation and
// consumption installations for the token's user, pull the latest venus stats
// sample for each series, and collect active alarms. Every GET shares one
// wall-clock budget so a flaky upstream cannot hang the caller.
use crate::application::reading_provider::{DataUnavailable, ReadingProvider};
use crate::domain::reading::RawReading;
use crate::infrastructure::config::Settings;
use anyhow::{Context, Result, bail, ensure};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::{Duration, Instant};

pub struct VrmClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    retries: u32,
    read_timeout: Duration,
    backoff_base: Duration,
    total_budget: Duration,
    generation_filter: String,
    consumption_filter: String,
}

#[derive(Debug, Deserialize)]
struct UsersMeResponse {
    user: Option<UserRecord>,
}

#[derive(Debug, Deserialize)]
struct UserRecord {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct InstallationsResponse {
    #[serde(default)]
    records: Vec<Installation>,
}

#[derive(Debug, Deserialize)]
struct Installation {
    #[serde(rename = "idSite")]
    id_site: Option<i64>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VenusStatsResponse {
    /// Map of series name ("solar_yield", "bs", ...) to its sample rows.
    #[serde(default)]
    records: Value,
}

impl VrmClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs_f64(settings.connect_timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("vrm-vitals/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            retries: settings.retries.max(1),
            read_timeout: Duration::from_secs_f64(settings.read_timeout_secs),
            backoff_base: Duration::from_secs_f64(settings.backoff_base_secs),
            total_budget: Duration::from_secs_f64(settings.total_budget_secs),
            generation_filter: settings.generation_site.clone(),
            consumption_filter: settings.consumption_site.clone(),
        })
    }

    /// GET with bounded retries for transient failures. `t0` anchors the
    /// sweep-wide budget; a request never waits longer than what remains.
    async fn api_get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        t0: Instant,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0u32;
        loop {
            let remaining = self
                .total_budget
                .checked_sub(t0.elapsed())
                .filter(|d| !d.is_zero())
                .with_context(|| {
                    format!(
                        "time budget of {:.1}s exhausted before GET {url}",
                        self.total_budget.as_secs_f64()
                    )
                })?;
            attempt += 1;

            let result = self
                .http
                .get(&url)
                .query(query)
                .header("X-Authorization", format!("Token {}", self.token))
                .header("Accept", "application/json")
                .timeout(self.read_timeout.min(remaining))
                .send()
                .await;

            match result {
                Ok(response) => {
                    if response.status() == StatusCode::UNAUTHORIZED {
                        bail!("401 Unauthorized from {url} (bad token or missing permissions)");
                    }
                    let response = response
                        .error_for_status()
                        .with_context(|| format!("GET {url} failed"))?;
                    return response
                        .json::<T>()
                        .await
                        .with_context(|| format!("malformed JSON from {url}"));
                }
                Err(e) if (e.is_timeout() || e.is_connect()) && attempt < self.retries => {
                    let backoff = self.backoff_base.mul_f64(f64::from(1u32 << (attempt - 1)));
                    let cap = remaining.div_f64(4.0).max(Duration::from_millis(100));
                    tracing::debug!(%url, attempt, error = %e, "transient VRM error, backing off");
                    tokio::time::sleep(backoff.min(cap)).await;
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("GET {url} failed after {attempt} attempt(s)"));
                }
            }
        }
    }

    async fn current_user_id(&self, t0: Instant) -> Result<i64> {
        let me: UsersMeResponse = self.api_get("/users/me", &[], t0).await?;
        Ok(me.user.context("/users/me returned no user record")?.id)
    }

    async fn installations(&self, user_id: i64, t0: Instant) -> Result<Vec<Installation>> {
        let response: InstallationsResponse = self
            .api_get(&format!("/users/{user_id}/installations"), &[], t0)
            .await?;
        Ok(response.records)
    }

    /// Venus-type stats for a site: the latest batch of time/value series.
    async fn venus_stats(&self, site_id: i64, t0: Instant) -> Result<Value> {
        let response: VenusStatsResponse = self
            .api_get(
                &format!("/installations/{site_id}/stats"),
                &[("type", "venus")],
                t0,
            )
            .await?;
        Ok(response.records)
    }

    async fn active_alarms(&self, site_id: i64, t0: Instant) -> Result<Vec<String>> {
        let response: Value = self
            .api_get(
                &format!("/installations/{site_id}/alarms"),
                &[("active", "true")],
                t0,
            )
            .await?;
        Ok(alarm_records(&response)
            .iter()
            .filter(|record| is_active(record))
            .map(alarm_line)
            .collect())
    }

    async fn sweep(&self) -> Result<RawReading> {
        let t0 = Instant::now();

        let user_id = self.current_user_id(t0).await?;
        let installations = self.installations(user_id, t0).await?;
        ensure!(
            !installations.is_empty(),
            "token has no visible installations"
        );

        let generation_site = pick_site(&installations, &self.generation_filter)
            .with_context(|| {
                format!(
                    "no installation name matches '{}'",
                    self.generation_filter
                )
            })?;
        let consumption_site = pick_site(&installations, &self.consumption_filter)
            .with_context(|| {
                format!(
                    "no installation name matches '{}'",
                    self.consumption_filter
                )
            })?;

        let generation_stats = self.venus_stats(generation_site, t0).await?;
        let consumption_stats = self.venus_stats(consumption_site, t0).await?;

        // Every contract field is mandatory, so a series with no usable
        // sample fails the whole sweep rather than producing a partial report.
        let (solar_ts, solar_w) =
            last_point(&generation_stats["solar_yield"]).context("no usable solar_yield samples")?;
        let (grid_ts, grid_w) = last_point(&generation_stats["from_to_grid"])
            .context("no usable from_to_grid samples")?;
        let (soc_ts, battery_soc_pct) =
            last_point(&generation_stats["bs"]).context("no usable battery SOC samples")?;
        let (load_ts, consumption_w) =
            last_point(&consumption_stats["ac_loads"]).context("no usable ac_loads samples")?;

        let newest_ms = solar_ts.max(grid_ts).max(soc_ts).max(load_ts);
        let data_time = Utc
            .timestamp_millis_opt(newest_ms)
            .single()
            .with_context(|| format!("sample timestamp {newest_ms}ms is out of range"))?;

        // Alarm reads degrade to an advisory note instead of failing the sweep.
        let mut notes = Vec::new();
        let generation_alarms = match self.active_alarms(generation_site, t0).await {
            Ok(alarms) => alarms,
            Err(e) => {
                tracing::warn!(site_id = generation_site, error = %format!("{e:#}"), "alarm read failed");
                notes.push(format!("error reading generation alarms: {e:#}"));
                Vec::new()
            }
        };
        let consumption_alarms = match self.active_alarms(consumption_site, t0).await {
            Ok(alarms) => alarms,
            Err(e) => {
                tracing::warn!(site_id = consumption_site, error = %format!("{e:#}"), "alarm read failed");
                notes.push(format!("error reading consumption alarms: {e:#}"));
                Vec::new()
            }
        };

        Ok(RawReading {
            solar_w,
            grid_w,
            battery_soc_pct,
            consumption_w,
            generation_alarms,
            consumption_alarms,
            notes,
            data_time,
        })
    }
}

#[async_trait]
impl ReadingProvider for VrmClient {
    async fn latest_reading(&self) -> Result<RawReading, DataUnavailable> {
        self.sweep().await.map_err(|e| {
            let reason = format!("{e:#}");
            tracing::error!(error = %reason, "VRM sweep failed");
            DataUnavailable::new(reason)
        })
    }
}

/// Match installation names case- and accent-insensitively, so a filter of
/// "generacion" finds a site named "Generación".
fn normalize(s: &str) -> String {
    s.to_lowercase().chars().map(fold_accent).collect()
}

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ñ' => 'n',
        _ => c,
    }
}

fn pick_site(installations: &[Installation], name_filter: &str) -> Option<i64> {
    let target = normalize(name_filter);
    installations.iter().find_map(|installation| {
        let name = installation.name.as_deref()?;
        if normalize(name).contains(&target) {
            installation.id_site
        } else {
            None
        }
    })
}

/// Rows are `[ts_ms, value]` or `[ts_ms, avg, min, max]`; in both layouts
/// index 1 holds the value of interest (the average, for aggregated rows).
/// Scans from the end for the newest row with a numeric timestamp and a
/// finite value, skipping trailing nulls.
fn last_point(entries: &Value) -> Option<(i64, f64)> {
    let rows = entries.as_array()?;
    for row in rows.iter().rev() {
        let Some(columns) = row.as_array() else {
            continue;
        };
        if columns.len() < 2 {
            continue;
        }
        let Some(ts) = columns[0].as_f64() else {
            continue;
        };
        let Some(value) = columns[1].as_f64() else {
            continue;
        };
        if !value.is_finite() {
            continue;
        }
        return Some((ts as i64, value));
    }
    None
}

/// The alarms endpoint has been observed returning its list under several
/// keys; try each known shape in order.
fn alarm_records(response: &Value) -> &[Value] {
    [
        &response["records"],
        &response["data"]["records"],
        &response["alarms"],
        &response["data"]["alarms"],
    ]
    .into_iter()
    .find_map(Value::as_array)
    .map(Vec::as_slice)
    .unwrap_or(&[])
}

fn is_active(record: &Value) -> bool {
    match &record["active"] {
        Value::Bool(true) => return true,
        Value::Number(n) if n.as_i64() == Some(1) => return true,
        _ => {}
    }
    matches!(record["state"].as_str(), Some("active") | Some("1"))
        || record["state"].as_i64() == Some(1)
}

/// One display line per alarm: name, bracketed severity, trailing message.
fn alarm_line(record: &Value) -> String {
    let name = record["name"]
        .as_str()
        .or_else(|| record["title"].as_str())
        .or_else(|| record["code"].as_str())
        .unwrap_or("unnamed alarm");
    let mut line = name.to_string();
    match &record["severity"] {
        Value::String(severity) => line.push_str(&format!(" [{severity}]")),
        Value::Number(severity) => line.push_str(&format!(" [severity {severity}]")),
        _ => {}
    }
    if let Some(message) = record["message"]
        .as_str()
        .or_else(|| record["text"].as_str())
    {
        line.push_str(": ");
        line.push_str(message);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_last_point_takes_newest_non_null() {
        let entries = json!([
            [1758024900000i64, 3100.0],
            [1758025002000i64, 3142.89],
            [1758025062000i64, null],
            [1758025122000i64, null]
        ]);
        assert_eq!(last_point(&entries), Some((1758025002000, 3142.89)));
    }

    #[test]
    fn test_last_point_reads_avg_column_of_aggregated_rows() {
        let entries = json!([
            [1758024900000i64, 83.5, 82.0, 85.0],
            [1758025002000i64, 84.0, 83.0, 85.0]
        ]);
        assert_eq!(last_point(&entries), Some((1758025002000, 84.0)));
    }

    #[test]
    fn test_last_point_skips_malformed_rows() {
        let entries = json!([
            [1758025002000i64, 98.0],
            "garbage",
            [1758025062000i64],
            [null, 77.0]
        ]);
        assert_eq!(last_point(&entries), Some((1758025002000, 98.0)));
    }

    #[test]
    fn test_last_point_handles_missing_series() {
        assert_eq!(last_point(&Value::Null), None);
        assert_eq!(last_point(&json!([])), None);
    }

    fn install(id: i64, name: &str) -> Installation {
        Installation {
            id_site: Some(id),
            name: Some(name.to_string()),
        }
    }

    #[test]
    fn test_pick_site_ignores_case_and_accents() {
        let installations = vec![
            install(11, "Casa - Generación FV"),
            install(22, "Casa - Consumo"),
        ];
        assert_eq!(pick_site(&installations, "generacion"), Some(11));
        assert_eq!(pick_site(&installations, "CONSUMO"), Some(22));
        assert_eq!(pick_site(&installations, "bodega"), None);
    }

    #[test]
    fn test_pick_site_skips_nameless_installations() {
        let installations = vec![
            Installation {
                id_site: Some(5),
                name: None,
            },
            install(7, "Generacion"),
        ];
        assert_eq!(pick_site(&installations, "generación"), Some(7));
    }

    #[test]
    fn test_alarm_records_accepts_known_shapes() {
        let flat = json!({"success": true, "records": [{"name": "a"}]});
        assert_eq!(alarm_records(&flat).len(), 1);

        let nested = json!({"data": {"records": [{"name": "a"}, {"name": "b"}]}});
        assert_eq!(alarm_records(&nested).len(), 2);

        let alt = json!({"alarms": [{"name": "a"}]});
        assert_eq!(alarm_records(&alt).len(), 1);

        assert!(alarm_records(&json!({"success": true})).is_empty());
    }

    #[test]
    fn test_is_active_accepts_flag_and_state_variants() {
        assert!(is_active(&json!({"active": true})));
        assert!(is_active(&json!({"active": 1})));
        assert!(is_active(&json!({"state": "active"})));
        assert!(is_active(&json!({"state": 1})));
        assert!(is_active(&json!({"state": "1"})));
        assert!(!is_active(&json!({"active": false})));
        assert!(!is_active(&json!({"state": "cleared"})));
        assert!(!is_active(&json!({})));
    }

    #[test]
    fn test_alarm_line_formats_available_fields() {
        let full = json!({
            "name": "Low battery voltage",
            "severity": "alarm",
            "message": "11.9V on battery bank"
        });
        assert_eq!(
            alarm_line(&full),
            "Low battery voltage [alarm]: 11.9V on battery bank"
        );

        let fallback = json!({"title": "Grid lost", "severity": 2});
        assert_eq!(alarm_line(&fallback), "Grid lost [severity 2]");

        assert_eq!(alarm_line(&json!({})), "unnamed alarm");
    }
}
