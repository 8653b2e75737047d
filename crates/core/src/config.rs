//! Configuration types
//!
//! Values come from environment variables (optionally seeded from a `.env`
//! file by the binary). Unset or empty variables fall back to defaults.

use std::time::Duration;
use tracing::warn;

use crate::ConfigError;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_KRAKEN_BASE_URL: &str = "https://api.kraken.com";

/// Complete service configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub cache_ttl: Duration,
    pub http_timeout: Duration,
    pub kraken_base_url: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            cache_ttl: DEFAULT_CACHE_TTL,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            kraken_base_url: DEFAULT_KRAKEN_BASE_URL.to_string(),
        }
    }
}

impl ServiceConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from an explicit set of variables instead of the process environment
    pub fn from_vars(vars: config::Map<String, String>) -> Result<Self, ConfigError> {
        Self::load(Some(vars))
    }

    fn load(vars: Option<config::Map<String, String>>) -> Result<Self, ConfigError> {
        let env = config::Environment::default()
            .ignore_empty(true)
            .source(vars);

        let settings = config::Config::builder()
            .set_default("host", DEFAULT_HOST)?
            .set_default("port", DEFAULT_PORT.to_string())?
            .set_default("cache_ttl", "60s")?
            .set_default("http_timeout", "3s")?
            .set_default("kraken_base_url", DEFAULT_KRAKEN_BASE_URL)?
            .add_source(env)
            .build()?;

        let port_raw = settings.get_string("port")?;
        let port = port_raw
            .trim()
            .parse::<u16>()
            .map_err(|_| ConfigError::Invalid(format!("PORT must be a u16, got {port_raw:?}")))?;

        Ok(Self {
            host: settings.get_string("host")?,
            port,
            cache_ttl: parse_duration_or(
                "CACHE_TTL",
                &settings.get_string("cache_ttl")?,
                DEFAULT_CACHE_TTL,
            ),
            http_timeout: parse_duration_or(
                "HTTP_TIMEOUT",
                &settings.get_string("http_timeout")?,
                DEFAULT_HTTP_TIMEOUT,
            ),
            kraken_base_url: settings.get_string("kraken_base_url")?,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse a Go-style duration: one or more `<number><unit>` parts such as
/// `1m30s` or `1.5s`, with units `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`.
/// A bare integer is taken as seconds. Zero and negative values are rejected.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(secs) = raw.parse::<u64>() {
        return (secs > 0).then(|| Duration::from_secs(secs));
    }

    let mut rest = raw.strip_prefix('+').unwrap_or(raw);
    if rest.is_empty() {
        return None;
    }

    let mut total_nanos: u128 = 0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_len);

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);

        let unit_nanos = unit_nanos(unit)?;
        total_nanos = total_nanos.checked_add(component_nanos(number, unit_nanos)?)?;
        rest = tail;
    }

    if total_nanos == 0 {
        return None;
    }

    let secs = u64::try_from(total_nanos / 1_000_000_000).ok()?;
    Some(Duration::new(secs, (total_nanos % 1_000_000_000) as u32))
}

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(1_000),
        "ms" => Some(1_000_000),
        "s" => Some(1_000_000_000),
        "m" => Some(60_000_000_000),
        "h" => Some(3_600_000_000_000),
        _ => None,
    }
}

/// `number` is `int`, `int.frac`, `.frac` or `int.`
fn component_nanos(number: &str, unit_nanos: u128) -> Option<u128> {
    let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if frac_part.contains('.') {
        return None;
    }

    let int: u128 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().ok()?
    };
    let mut nanos = int.checked_mul(unit_nanos)?;

    // Digits past nanosecond precision cannot contribute
    let mut scale = unit_nanos;
    for digit in frac_part.chars() {
        let digit = u128::from(digit.to_digit(10)?);
        scale /= 10;
        nanos = nanos.checked_add(digit * scale)?;
    }

    Some(nanos)
}

fn parse_duration_or(key: &str, raw: &str, default: Duration) -> Duration {
    parse_duration(raw).unwrap_or_else(|| {
        warn!("Invalid {} {:?}, using default {:?}", key, raw, default);
        default
    })
}
