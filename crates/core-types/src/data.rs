use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single daily OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
}

/// Derived financial statement metrics for one reporting period. Every ratio is
/// optional because coverage differs wildly between markets and vendors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialMetrics {
    pub report_period: NaiveDate,
    #[serde(default)]
    pub return_on_equity: Option<f64>,
    #[serde(default)]
    pub net_margin: Option<f64>,
    #[serde(default)]
    pub operating_margin: Option<f64>,
    #[serde(default)]
    pub revenue_growth: Option<f64>,
    #[serde(default)]
    pub earnings_growth: Option<f64>,
    #[serde(default)]
    pub book_value_growth: Option<f64>,
    #[serde(default)]
    pub current_ratio: Option<f64>,
    #[serde(default)]
    pub debt_to_equity: Option<f64>,
    #[serde(default)]
    pub free_cash_flow_per_share: Option<f64>,
    #[serde(default)]
    pub earnings_per_share: Option<f64>,
    #[serde(default)]
    pub price_to_earnings_ratio: Option<f64>,
    #[serde(default)]
    pub price_to_book_ratio: Option<f64>,
    #[serde(default)]
    pub price_to_sales_ratio: Option<f64>,
}

/// An insider buy (positive shares) or sell (negative shares).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsiderTrade {
    pub date: NaiveDate,
    pub transaction_shares: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NewsSentiment {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub date: NaiveDate,
    pub title: String,
    #[serde(default)]
    pub sentiment: Option<NewsSentiment>,
}

/// The structured records returned by a data provider. A provider fills the
/// collections of the domain it was asked for; the orchestrator merges the
/// per-domain results into one `DataSet` per node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSet {
    #[serde(default)]
    pub prices: Vec<PriceBar>,
    #[serde(default)]
    pub financial_metrics: Vec<FinancialMetrics>,
    #[serde(default)]
    pub insider_trades: Vec<InsiderTrade>,
    #[serde(default)]
    pub news: Vec<NewsItem>,
}

impl DataSet {
    pub fn record_count(&self) -> usize {
        self.prices.len() + self.financial_metrics.len() + self.insider_trades.len() + self.news.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }

    /// Folds another dataset into this one, keeping prices sorted by date.
    pub fn merge(&mut self, other: DataSet) {
        self.prices.extend(other.prices);
        self.prices.sort_by_key(|bar| bar.date);
        self.prices.dedup_by_key(|bar| bar.date);
        self.financial_metrics.extend(other.financial_metrics);
        self.insider_trades.extend(other.insider_trades);
        self.news.extend(other.news);
    }

    /// The most recent bar on or before `as_of`.
    pub fn latest_bar(&self, as_of: NaiveDate) -> Option<&PriceBar> {
        self.prices.iter().filter(|bar| bar.date <= as_of).max_by_key(|bar| bar.date)
    }

    /// Closing prices in ascending date order.
    pub fn closes(&self) -> Vec<Decimal> {
        let mut bars: Vec<&PriceBar> = self.prices.iter().collect();
        bars.sort_by_key(|bar| bar.date);
        bars.into_iter().map(|bar| bar.close).collect()
    }

    /// Financial metrics for the most recent reporting period on or before `as_of`.
    pub fn latest_metrics(&self, as_of: NaiveDate) -> Option<&FinancialMetrics> {
        self.financial_metrics
            .iter()
            .filter(|m| m.report_period <= as_of)
            .max_by_key(|m| m.report_period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bar(day: u32, close: Decimal) -> PriceBar {
        PriceBar {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1_000,
        }
    }

    #[test]
    fn merge_keeps_prices_sorted_and_unique() {
        let mut a = DataSet {
            prices: vec![bar(3, dec!(12)), bar(1, dec!(10))],
            ..Default::default()
        };
        let b = DataSet {
            prices: vec![bar(2, dec!(11)), bar(3, dec!(12))],
            ..Default::default()
        };
        a.merge(b);
        assert_eq!(a.closes(), vec![dec!(10), dec!(11), dec!(12)]);
    }

    #[test]
    fn latest_bar_ignores_future_bars() {
        let set = DataSet {
            prices: vec![bar(1, dec!(10)), bar(5, dec!(50))],
            ..Default::default()
        };
        let as_of = NaiveDate::from_ymd_opt(2024, 1, 4).unwrap();
        assert_eq!(set.latest_bar(as_of).map(|b| b.close), Some(dec!(10)));
    }
}
