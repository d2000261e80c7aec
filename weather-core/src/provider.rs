use crate::{
    Config, Coordinate, WeatherSnapshot,
    error::FetchError,
    provider::{openmeteo::OpenMeteoProvider, openweather::OpenWeatherProvider},
};
use async_trait::async_trait;
use std::{convert::TryFrom, fmt::Debug, sync::Arc, time::Duration};

pub mod openmeteo;
pub mod openweather;

pub(crate) const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    OpenWeather,
    OpenMeteo,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenWeather => "openweather",
            ProviderId::OpenMeteo => "openmeteo",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::OpenWeather, ProviderId::OpenMeteo]
    }

    pub fn requires_api_key(&self) -> bool {
        matches!(self, ProviderId::OpenWeather)
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "openweather" => Ok(ProviderId::OpenWeather),
            "openmeteo" | "open-meteo" => Ok(ProviderId::OpenMeteo),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: openweather, openmeteo."
            )),
        }
    }
}

/// Remote source of snapshots. `current.observed_at` on the result must be the
/// server's own timestamp so it compares across calls.
#[async_trait]
pub trait WeatherFetcher: Send + Sync + Debug {
    async fn fetch(&self, coordinate: &Coordinate) -> Result<WeatherSnapshot, FetchError>;
}

/// Construct a fetcher from config and explicit ProviderId.
pub fn provider_from_config(
    id: ProviderId,
    config: &Config,
) -> anyhow::Result<Arc<dyn WeatherFetcher>> {
    let base_url = config.provider_config(id).and_then(|cfg| cfg.base_url.clone());

    let fetcher: Arc<dyn WeatherFetcher> = match id {
        ProviderId::OpenWeather => {
            let api_key = config.provider_api_key(id).ok_or_else(|| {
                anyhow::anyhow!(
                    "No API key configured for provider '{id}'.\n\
                     Hint: run `weather configure {id}` and enter your API key."
                )
            })?;
            let mut provider = OpenWeatherProvider::new(api_key.to_owned());
            if let Some(url) = base_url {
                provider = provider.with_base_url(url);
            }
            Arc::new(provider)
        }
        ProviderId::OpenMeteo => {
            let mut provider = OpenMeteoProvider::new();
            if let Some(url) = base_url {
                provider = provider.with_base_url(url);
            }
            Arc::new(provider)
        }
    };

    Ok(fetcher)
}

/// Construct the default fetcher from config, using `default_provider` field.
pub fn default_provider_from_config(config: &Config) -> anyhow::Result<Arc<dyn WeatherFetcher>> {
    let id = config.default_provider_id()?;
    provider_from_config(id, config)
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
