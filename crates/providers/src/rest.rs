use crate::error::{FaultKind, ProviderError, ProviderFault};
use crate::provider::DataProvider;
use async_trait::async_trait;
use chrono::NaiveDate;
use configuration::ProviderSettings;
use core_types::{
    DataDomain, DataSet, DateRange, FieldSet, FinancialMetrics, InsiderTrade, Instrument, Market,
    NewsItem, NewsSentiment, PriceBar,
};
use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;

const API_KEY_HEADER: &str = "X-API-KEY";

/// A JSON-over-HTTP data vendor.
///
/// Endpoints (all `GET`, with `ticker`, `start_date` and `end_date` query parameters):
/// `/prices/`, `/financial-metrics/`, `/insider-trades/`, `/news/`.
#[derive(Debug, Clone)]
pub struct RestProvider {
    name: String,
    base_url: String,
    markets: Vec<Market>,
    domains: Vec<DataDomain>,
    client: reqwest::Client,
}

// Intermediate structs for deserializing vendor payloads.
#[derive(Deserialize)]
struct PricesResponse {
    #[serde(default)]
    prices: Vec<RawPrice>,
}

#[derive(Deserialize)]
struct RawPrice {
    time: String,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    #[serde(default)]
    volume: f64,
}

#[derive(Deserialize)]
struct FinancialMetricsResponse {
    #[serde(default)]
    financial_metrics: Vec<FinancialMetrics>,
}

#[derive(Deserialize)]
struct InsiderTradesResponse {
    #[serde(default)]
    insider_trades: Vec<RawInsiderTrade>,
}

#[derive(Deserialize)]
struct RawInsiderTrade {
    #[serde(default)]
    transaction_date: Option<String>,
    filing_date: String,
    #[serde(default)]
    transaction_shares: Option<f64>,
}

#[derive(Deserialize)]
struct NewsResponse {
    #[serde(default)]
    news: Vec<RawNews>,
}

#[derive(Deserialize)]
struct RawNews {
    date: String,
    title: String,
    #[serde(default)]
    sentiment: Option<String>,
}

/// Parses the date part of `2024-01-02` or `2024-01-02T05:00:00Z`.
fn parse_day(text: &str) -> Result<NaiveDate, ProviderFault> {
    let day = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|e| ProviderFault::new(FaultKind::Malformed, format!("invalid date '{}': {}", text, e)))
}

fn parse_sentiment(label: Option<&str>) -> Option<NewsSentiment> {
    match label.map(|s| s.to_ascii_lowercase()) {
        Some(s) if s == "positive" => Some(NewsSentiment::Positive),
        Some(s) if s == "negative" => Some(NewsSentiment::Negative),
        Some(s) if s == "neutral" => Some(NewsSentiment::Neutral),
        _ => None,
    }
}

fn parse_prices(body: PricesResponse) -> Result<Vec<PriceBar>, ProviderFault> {
    body.prices
        .into_iter()
        .map(|raw| {
            Ok(PriceBar {
                date: parse_day(&raw.time)?,
                open: raw.open,
                high: raw.high,
                low: raw.low,
                close: raw.close,
                volume: raw.volume.max(0.0) as u64,
            })
        })
        .collect()
}

fn parse_insider_trades(body: InsiderTradesResponse) -> Result<Vec<InsiderTrade>, ProviderFault> {
    let mut trades = Vec::with_capacity(body.insider_trades.len());
    for raw in body.insider_trades {
        let Some(shares) = raw.transaction_shares else {
            continue;
        };
        let date = match raw.transaction_date.as_deref() {
            Some(d) => parse_day(d)?,
            None => parse_day(&raw.filing_date)?,
        };
        trades.push(InsiderTrade {
            date,
            transaction_shares: shares,
        });
    }
    Ok(trades)
}

fn parse_news(body: NewsResponse) -> Result<Vec<NewsItem>, ProviderFault> {
    body.news
        .into_iter()
        .map(|raw| {
            Ok(NewsItem {
                date: parse_day(&raw.date)?,
                title: raw.title,
                sentiment: parse_sentiment(raw.sentiment.as_deref()),
            })
        })
        .collect()
}

impl RestProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        markets: Vec<Market>,
        domains: Vec<DataDomain>,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        let name = name.into();
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let value = HeaderValue::from_str(&key).map_err(|_| {
                ProviderError::Configuration(format!("API key for '{}' is not a valid header value", name))
            })?;
            headers.insert(API_KEY_HEADER, value);
        }
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ProviderError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            name,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            markets,
            domains,
            client,
        })
    }

    /// Builds a provider from its `[[providers]]` entry, reading the API key from the
    /// named environment variable. A missing variable is logged and the provider runs
    /// unauthenticated.
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let api_key = match &settings.api_key_env {
            Some(var) => match std::env::var(var) {
                Ok(key) if !key.is_empty() => Some(key),
                _ => {
                    tracing::warn!(provider = %settings.name, env = %var, "API key variable not set; continuing without key.");
                    None
                }
            },
            None => None,
        };
        Self::new(
            settings.name.clone(),
            settings.base_url.clone(),
            settings.markets.clone(),
            settings.domains.clone(),
            api_key,
        )
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        instrument: &Instrument,
        range: &DateRange,
        extra: &[(&str, &str)],
    ) -> Result<T, ProviderFault> {
        let url = format!("{}/{}/", self.base_url, path);
        let start = range.start().to_string();
        let end = range.end().to_string();
        let mut query: Vec<(&str, &str)> = vec![
            ("ticker", instrument.symbol()),
            ("start_date", start.as_str()),
            ("end_date", end.as_str()),
        ];
        query.extend_from_slice(extra);

        let response = self.client.get(&url).query(&query).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            serde_json::from_str::<T>(&text).map_err(|e| {
                ProviderFault::new(FaultKind::Malformed, format!("failed to deserialize response: {}", e))
            })
        } else {
            Err(ProviderFault::new(
                FaultKind::from_status(status.as_u16()),
                format!("HTTP {} from {}: {}", status.as_u16(), url, text.chars().take(200).collect::<String>()),
            ))
        }
    }
}

#[async_trait]
impl DataProvider for RestProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn covers(&self, market: Market, domain: DataDomain) -> bool {
        self.markets.contains(&market) && self.domains.contains(&domain)
    }

    async fn fetch(
        &self,
        instrument: &Instrument,
        fields: &FieldSet,
        range: &DateRange,
    ) -> Result<DataSet, ProviderFault> {
        let mut data = DataSet::default();
        match fields.domain {
            DataDomain::Prices => {
                let body: PricesResponse = self
                    .get_json("prices", instrument, range, &[("interval", "day"), ("interval_multiplier", "1")])
                    .await?;
                data.prices = parse_prices(body)?;
            }
            DataDomain::Financials => {
                let body: FinancialMetricsResponse = self
                    .get_json("financial-metrics", instrument, range, &[("period", "ttm"), ("limit", "10")])
                    .await?;
                data.financial_metrics = body.financial_metrics;
            }
            DataDomain::Ownership => {
                let trades: InsiderTradesResponse =
                    self.get_json("insider-trades", instrument, range, &[]).await?;
                let news: NewsResponse = self.get_json("news", instrument, range, &[]).await?;
                data.insider_trades = parse_insider_trades(trades)?;
                data.news = parse_news(news)?;
            }
        }

        // An empty payload is treated as "not found" so the chain moves to the next provider.
        if data.is_empty() {
            return Err(ProviderFault::new(
                FaultKind::NotFound,
                format!("{} returned no {} records for {}", self.name, fields.domain, instrument),
            ));
        }
        Ok(data)
    }
}
