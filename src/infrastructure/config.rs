use serde::Deserialize;

/// Runtime settings. Loaded from `config/vrm.toml` when present, with `VRM_*`
/// environment variables taking precedence (e.g. `VRM_TOKEN`,
/// `VRM_TOTAL_BUDGET_SECS`), matching how the tool is usually deployed.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// VRM API access token. The only setting without a default.
    pub token: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: f64,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: f64,
    /// Total GET attempts per request (not extra retries on top of the first).
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: f64,
    /// Wall-clock budget shared by every request in one sweep.
    #[serde(default = "default_total_budget_secs")]
    pub total_budget_secs: f64,
    /// Substring (accent- and case-insensitive) identifying the generation
    /// installation by name.
    #[serde(default = "default_generation_site")]
    pub generation_site: String,
    #[serde(default = "default_consumption_site")]
    pub consumption_site: String,
    /// Data older than this counts as a disconnected/stale read.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: i64,
    /// Bind address for `serve` mode.
    #[serde(default = "default_http_bind")]
    pub http_bind: String,
}

fn default_base_url() -> String {
    "https://vrmapi.victronenergy.com/v2".to_string()
}

fn default_connect_timeout_secs() -> f64 {
    4.0
}

fn default_read_timeout_secs() -> f64 {
    6.0
}

fn default_retries() -> u32 {
    2
}

fn default_backoff_base_secs() -> f64 {
    0.4
}

fn default_total_budget_secs() -> f64 {
    25.0
}

fn default_generation_site() -> String {
    "generacion".to_string()
}

fn default_consumption_site() -> String {
    "consumo".to_string()
}

fn default_stale_after_secs() -> i64 {
    300
}

fn default_http_bind() -> String {
    "0.0.0.0:8080".to_string()
}

pub fn load_settings() -> anyhow::Result<Settings> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/vrm").required(false))
        .add_source(config::Environment::with_prefix("VRM").try_parsing(true))
        .build()?;

    Ok(settings.try_deserialize()?)
}
