use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

use super::PriceHistorySource;
use crate::config::AlpacaConfig;
use crate::error::RankError;
use crate::model::bar::{normalize_series, PriceBar};

const MAX_PAGES: usize = 20;

/// Daily bars from the Alpaca market-data API.
pub struct AlpacaBarsSource {
    http: Client,
    data_base_url: String,
    feed: String,
}

impl AlpacaBarsSource {
    pub fn new(cfg: &AlpacaConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("APCA-API-KEY-ID", HeaderValue::from_str(&cfg.api_key)?);
        headers.insert(
            "APCA-API-SECRET-KEY",
            HeaderValue::from_str(&cfg.api_secret)?,
        );
        let http = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(20))
            .build()
            .context("failed to build Alpaca HTTP client")?;
        Ok(Self {
            http,
            data_base_url: cfg.data_base_url.trim_end_matches('/').to_string(),
            feed: cfg.feed.clone(),
        })
    }

    fn compact_error_body(body: &str) -> String {
        let normalized = body.split_whitespace().collect::<Vec<_>>().join(" ");
        if normalized.len() > 180 {
            let cut = (0..=180)
                .rev()
                .find(|i| normalized.is_char_boundary(*i))
                .unwrap_or(0);
            format!("{}...", &normalized[..cut])
        } else {
            normalized
        }
    }

    fn fetch_page(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
        page_token: Option<&str>,
    ) -> Result<Value, RankError> {
        let endpoint = format!("{}/v2/stocks/bars", self.data_base_url);
        let start = from.format("%Y-%m-%d").to_string();
        let end = to.format("%Y-%m-%d").to_string();
        let mut request = self.http.get(&endpoint).query(&[
            ("symbols", symbol),
            ("timeframe", "1Day"),
            ("start", start.as_str()),
            ("end", end.as_str()),
            ("limit", "10000"),
            ("adjustment", "all"),
            ("feed", self.feed.as_str()),
        ]);
        if let Some(token) = page_token {
            request = request.query(&[("page_token", token)]);
        }

        let response = request.send().map_err(|e| classify_transport(symbol, e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(classify_status(
                symbol,
                status,
                &Self::compact_error_body(&body),
            ));
        }
        response
            .json::<Value>()
            .map_err(|e| classify_transport(symbol, e))
    }
}

fn classify_status(symbol: &str, status: StatusCode, body: &str) -> RankError {
    let detail = format!("HTTP {} {}", status.as_u16(), body);
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        RankError::TransientFetchFailure {
            symbol: symbol.to_string(),
            attempts: 1,
            detail,
        }
    } else {
        RankError::DataUnavailable {
            symbol: symbol.to_string(),
            detail,
        }
    }
}

fn classify_transport(symbol: &str, err: reqwest::Error) -> RankError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RankError::TransientFetchFailure {
            symbol: symbol.to_string(),
            attempts: 1,
            detail: err.to_string(),
        }
    } else {
        RankError::Http(err)
    }
}

fn parse_bars(root: &Value, symbol: &str) -> Vec<PriceBar> {
    let bars = root
        .get("bars")
        .and_then(|b| b.get(symbol))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    bars.iter()
        .filter_map(|bar| {
            let ts = bar.get("t").and_then(Value::as_str)?;
            let date = DateTime::parse_from_rfc3339(ts).ok()?.date_naive();
            let open = bar.get("o").and_then(Value::as_f64)?;
            Some(PriceBar {
                date,
                open,
                high: bar.get("h").and_then(Value::as_f64).unwrap_or(open),
                low: bar.get("l").and_then(Value::as_f64).unwrap_or(open),
                close: bar.get("c").and_then(Value::as_f64).unwrap_or(open),
                volume: bar.get("v").and_then(Value::as_f64).unwrap_or(0.0),
            })
        })
        .collect()
}

impl PriceHistorySource for AlpacaBarsSource {
    fn name(&self) -> &str {
        "alpaca"
    }

    fn fetch_daily(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PriceBar>, RankError> {
        let symbol = symbol.trim().to_ascii_uppercase();
        let mut bars = Vec::new();
        let mut token: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let root = self.fetch_page(&symbol, from, to, token.as_deref())?;
            bars.extend(parse_bars(&root, &symbol));
            token = root
                .get("next_page_token")
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
                .map(str::to_string);
            if token.is_none() {
                break;
            }
        }
        Ok(normalize_series(bars))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        let e = classify_status("AAPL", StatusCode::TOO_MANY_REQUESTS, "");
        assert!(e.is_retryable());
        let e = classify_status("AAPL", StatusCode::BAD_GATEWAY, "");
        assert!(e.is_retryable());
        let e = classify_status("ZZZZ", StatusCode::NOT_FOUND, "");
        assert!(matches!(e, RankError::DataUnavailable { .. }));
        let e = classify_status("ZZZZ", StatusCode::UNPROCESSABLE_ENTITY, "invalid symbol");
        assert!(!e.is_retryable());
    }

    #[test]
    fn parses_bar_payload() {
        let root: Value = serde_json::from_str(
            r#"{"bars":{"AAPL":[
                {"t":"2025-10-23T04:00:00Z","o":10.0,"h":11.0,"l":9.5,"c":10.5,"v":12345},
                {"t":"bad","o":1.0}
            ]},"next_page_token":null}"#,
        )
        .unwrap();
        let bars = parse_bars(&root, "AAPL");
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2025, 10, 23).unwrap());
        assert!((bars[0].volume - 12345.0).abs() < f64::EPSILON);
    }
}
