// =============================================================================
// REST Client (C4)
// =============================================================================
//
// Built the way the teacher's `binance::client::BinanceClient` is built —
// one `reqwest::Client`, endpoint methods that assemble a request and parse
// `output`/`output1`/`output2`, `#[instrument(skip(self))]` on every public
// call — but the signing scheme, retry classification, and response shape
// come from the broker this core actually talks to rather than Binance's.
//
// Retry/backoff policy and response classification follow spec.md §4.4
// step 6-7; field names (`stck_prpr`, `dnca_tot_amt`, ...) are the broker's
// own wire vocabulary, confirmed against the original client's parsing.
// =============================================================================

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

use crate::broker::endpoints::{EndpointDescriptor, HttpMethod, HASHKEY};
use crate::broker::endpoints::{BALANCE, CURRENT_PRICE, DAILY_CHART, MINUTE_BARS, ORDERBOOK, ORDER_BUY, ORDER_SELL, TICK_CONCLUSIONS};
use crate::config::credentials::Credentials;
use crate::config::token_manager::TokenManager;
use crate::error::CoreError;
use crate::ratelimit::RateLimiter;
use crate::types::{OhlcvBar, PriceData};

const MAX_ATTEMPTS: u32 = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDivision {
    Limit,
    Market,
}

#[derive(Debug, Clone)]
pub struct PositionSummary {
    pub name: String,
    pub quantity: u64,
    pub orderable_quantity: u64,
    pub avg_price: f64,
    pub purchase_amount: f64,
    pub current_price: f64,
    pub eval_amount: f64,
    pub eval_profit_loss: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Balance {
    pub deposit: i64,
    pub total_eval_amount: i64,
    pub positions: HashMap<String, PositionSummary>,
}

#[derive(Debug, Clone)]
pub struct OrderResult {
    pub success: bool,
    pub order_number: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Orderbook {
    pub ask_prices: [f64; 10],
    pub bid_prices: [f64; 10],
    pub ask_volumes: [u64; 10],
    pub bid_volumes: [u64; 10],
    pub total_ask_volume: u64,
    pub total_bid_volume: u64,
}

enum RetryDecision {
    RateLimited,
    Backoff,
    Fatal(CoreError),
}

pub struct RestClient {
    http: reqwest::Client,
    credentials: Credentials,
    tokens: Arc<TokenManager>,
    limiter: Arc<RateLimiter>,
    retryable_business_codes: HashSet<String>,
}

impl RestClient {
    pub fn new(credentials: Credentials, tokens: Arc<TokenManager>, limiter: Arc<RateLimiter>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build reqwest client");

        let mut retryable_business_codes = HashSet::new();
        retryable_business_codes.insert("EGW00201".to_string());

        Self {
            http,
            credentials,
            tokens,
            limiter,
            retryable_business_codes,
        }
    }

    /// Configured admission capacity of the shared rate limiter, so
    /// consumers like `BatchFetcher` can size their chunking off the same N.
    pub fn rate_limit_capacity(&self) -> usize {
        self.limiter.capacity()
    }

    /// Extend the retryable business-code allowlist beyond `EGW00201`
    /// (spec.md §9: live/paper allowlists differ subtly and are treated as
    /// configurable rather than hard-coded).
    pub fn with_extra_retryable_codes(mut self, codes: impl IntoIterator<Item = String>) -> Self {
        self.retryable_business_codes.extend(codes);
        self
    }

    // -------------------------------------------------------------------------
    // Validation (rejected before any network I/O)
    // -------------------------------------------------------------------------

    fn validate_code(code: &str) -> Result<(), CoreError> {
        if code.len() == 6 && code.chars().all(|c| c.is_ascii_digit()) {
            Ok(())
        } else {
            Err(CoreError::Validation {
                message: format!("code must be exactly 6 decimal digits, got {code:?}"),
            })
        }
    }

    fn validate_range(value: i64, min: i64, max: i64, field: &str) -> Result<(), CoreError> {
        if (min..=max).contains(&value) {
            Ok(())
        } else {
            Err(CoreError::Validation {
                message: format!("{field} must be in [{min}, {max}], got {value}"),
            })
        }
    }

    fn validate_order(division: OrderDivision, price: f64) -> Result<(), CoreError> {
        match division {
            OrderDivision::Limit if price <= 0.0 => Err(CoreError::Validation {
                message: "LIMIT orders require price > 0".into(),
            }),
            OrderDivision::Market if price != 0.0 => Err(CoreError::Validation {
                message: "MARKET orders require price == 0".into(),
            }),
            _ => Ok(()),
        }
    }

    // -------------------------------------------------------------------------
    // Core request execution (spec.md §4.4 steps 1-7)
    // -------------------------------------------------------------------------

    async fn execute(
        &self,
        descriptor: &EndpointDescriptor,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<Value, CoreError> {
        if !self.tokens.ensure_valid_token().await? {
            return Err(CoreError::TokenRefresh(
                "no valid access token available".into(),
            ));
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.limiter.acquire().await;

            match self.send_once(descriptor, query, body.clone()).await {
                Ok(value) => return Ok(value),
                Err(RetryDecision::Fatal(e)) => return Err(e),
                Err(RetryDecision::RateLimited) => {
                    if attempt >= MAX_ATTEMPTS {
                        return Err(CoreError::RateLimit {
                            code: "EGW00201".into(),
                            retry_after: RATE_LIMIT_BACKOFF,
                        });
                    }
                    warn!(attempt, endpoint = descriptor.name, "rate limited, backing off 10s");
                    sleep(RATE_LIMIT_BACKOFF).await;
                }
                Err(RetryDecision::Backoff) => {
                    if attempt >= MAX_ATTEMPTS {
                        return Err(CoreError::TransientNetwork(format!(
                            "{} failed after {MAX_ATTEMPTS} attempts",
                            descriptor.name
                        )));
                    }
                    let wait = Duration::from_secs(2 * attempt as u64);
                    warn!(attempt, endpoint = descriptor.name, wait_secs = wait.as_secs(), "retrying after backoff");
                    sleep(wait).await;
                }
            }
        }
    }

    async fn send_once(
        &self,
        descriptor: &EndpointDescriptor,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<Value, RetryDecision> {
        let token = self
            .tokens
            .access_token()
            .await
            .map_err(RetryDecision::Fatal)?;

        let url = format!("{}{}", self.credentials.server.rest_base_url(), descriptor.path);
        let tr_id = descriptor.tr_id(self.credentials.server);

        let mut request = match descriptor.http_method {
            HttpMethod::Get => self.http.get(&url).query(query),
            HttpMethod::Post => self.http.post(&url),
        };

        request = request
            .header("content-type", "application/json; charset=utf-8")
            .header("authorization", format!("Bearer {token}"))
            .header("appkey", &self.credentials.app_key)
            .header("appsecret", &self.credentials.app_secret)
            .header("custtype", "P");

        if !tr_id.is_empty() {
            request = request.header("tr_id", tr_id);
        }

        if descriptor.requires_hashkey {
            if let Some(body) = &body {
                let hashkey = self.hashkey(body).await.map_err(RetryDecision::Fatal)?;
                request = request.header("hashkey", hashkey);
            }
        }

        if let Some(body) = &body {
            request = request.json(body);
        }

        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                RetryDecision::Backoff
            } else {
                RetryDecision::Fatal(CoreError::TransientNetwork(e.to_string()))
            }
        })?;

        let status = resp.status();
        if status.is_server_error() {
            return Err(RetryDecision::Backoff);
        }

        let parsed: Value = resp.json().await.map_err(|e| {
            RetryDecision::Fatal(CoreError::TransientNetwork(format!("failed to parse response body: {e}")))
        })?;

        if status.is_client_error() {
            return Err(RetryDecision::Fatal(CoreError::BrokerLogic {
                error_code: parsed["msg_cd"].as_str().unwrap_or("HTTP_4XX").to_string(),
                message: parsed["msg1"].as_str().unwrap_or("client error").to_string(),
            }));
        }

        self.classify_business(&parsed)
    }

    fn classify_business(&self, parsed: &Value) -> Result<Value, RetryDecision> {
        let rt_cd = parsed["rt_cd"].as_str().unwrap_or("0");
        if rt_cd == "0" {
            return Ok(parsed.clone());
        }

        let msg_cd = parsed["msg_cd"].as_str().unwrap_or_default();
        if msg_cd == "EGW00201" {
            return Err(RetryDecision::RateLimited);
        }
        if self.retryable_business_codes.contains(msg_cd) {
            return Err(RetryDecision::Backoff);
        }

        Err(RetryDecision::Fatal(CoreError::BrokerLogic {
            error_code: msg_cd.to_string(),
            message: parsed["msg1"].as_str().unwrap_or("broker rejected request").to_string(),
        }))
    }

    async fn hashkey(&self, body: &Value) -> Result<String, CoreError> {
        let token = self.tokens.access_token().await?;
        let url = format!("{}{}", self.credentials.server.rest_base_url(), HASHKEY.path);

        let resp = self
            .http
            .post(&url)
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {token}"))
            .header("appkey", &self.credentials.app_key)
            .header("appsecret", &self.credentials.app_secret)
            .json(body)
            .send()
            .await
            .map_err(|e| CoreError::TransientNetwork(format!("hashkey request failed: {e}")))?;

        let parsed: Value = resp
            .json()
            .await
            .map_err(|e| CoreError::TransientNetwork(format!("failed to parse hashkey response: {e}")))?;

        parsed["HASH"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| CoreError::TransientNetwork("hashkey response missing HASH field".into()))
    }

    // -------------------------------------------------------------------------
    // Public endpoint methods
    // -------------------------------------------------------------------------

    #[instrument(skip(self), name = "rest::get_current_price")]
    pub async fn get_current_price(&self, code: &str) -> Result<PriceData, CoreError> {
        Self::validate_code(code)?;

        let query = [
            ("fid_cond_mrkt_div_code", "J".to_string()),
            ("fid_input_iscd", code.to_string()),
        ];
        let body = self.execute(&CURRENT_PRICE, &query, None).await?;
        let output = &body["output"];

        let current_price = parse_f64(&output["stck_prpr"]);
        Ok(PriceData {
            code: code.to_string(),
            current_price,
            change_rate: parse_f64(&output["prdy_ctrt"]),
            volume: parse_u64(&output["acml_vol"]),
            high: parse_f64(&output["stck_hgpr"]),
            low: parse_f64(&output["stck_lwpr"]),
            open: parse_f64(&output["stck_oprc"]),
            prev_close: parse_f64_or(&output["stck_sdpr"], current_price),
            fetched_at: Utc::now(),
        })
    }

    #[instrument(skip(self), name = "rest::get_daily_chart")]
    pub async fn get_daily_chart(&self, code: &str, period_days: i64) -> Result<Vec<OhlcvBar>, CoreError> {
        Self::validate_code(code)?;
        Self::validate_range(period_days, 1, 365, "period_days")?;

        let end = Utc::now().date_naive();
        let start = end - chrono::Duration::days(period_days);
        let query = [
            ("fid_cond_mrkt_div_code", "J".to_string()),
            ("fid_input_iscd", code.to_string()),
            ("fid_input_date_1", start.format("%Y%m%d").to_string()),
            ("fid_input_date_2", end.format("%Y%m%d").to_string()),
            ("fid_period_div_code", "D".to_string()),
            ("fid_org_adj_prc", "0".to_string()),
        ];
        let body = self.execute(&DAILY_CHART, &query, None).await?;
        Ok(parse_bars(&body["output2"]))
    }

    #[instrument(skip(self), name = "rest::get_minute_bars")]
    pub async fn get_minute_bars(&self, code: &str, unit: &str, count: i64) -> Result<Vec<OhlcvBar>, CoreError> {
        Self::validate_code(code)?;
        Self::validate_range(count, 1, 1000, "count")?;

        let query = [
            ("fid_cond_mrkt_div_code", "J".to_string()),
            ("fid_input_iscd", code.to_string()),
            ("fid_input_hour_1", unit.to_string()),
            ("fid_pw_data_incu_yn", "Y".to_string()),
        ];
        let body = self.execute(&MINUTE_BARS, &query, None).await?;
        let mut bars = parse_bars(&body["output2"]);
        bars.truncate(count as usize);
        Ok(bars)
    }

    #[instrument(skip(self), name = "rest::get_tick_conclusions")]
    pub async fn get_tick_conclusions(&self, code: &str, count: i64) -> Result<Value, CoreError> {
        Self::validate_code(code)?;
        Self::validate_range(count, 1, 1000, "count")?;

        let query = [
            ("fid_cond_mrkt_div_code", "J".to_string()),
            ("fid_input_iscd", code.to_string()),
        ];
        let body = self.execute(&TICK_CONCLUSIONS, &query, None).await?;
        Ok(body["output"].clone())
    }

    #[instrument(skip(self), name = "rest::get_orderbook")]
    pub async fn get_orderbook(&self, code: &str) -> Result<Orderbook, CoreError> {
        Self::validate_code(code)?;

        let query = [
            ("fid_cond_mrkt_div_code", "J".to_string()),
            ("fid_input_iscd", code.to_string()),
        ];
        let body = self.execute(&ORDERBOOK, &query, None).await?;
        let output = &body["output1"];

        let mut ask_prices = [0.0; 10];
        let mut bid_prices = [0.0; 10];
        let mut ask_volumes = [0u64; 10];
        let mut bid_volumes = [0u64; 10];

        for i in 0..10 {
            let level = i + 1;
            ask_prices[i] = parse_f64(&output[format!("askp{level}")]);
            bid_prices[i] = parse_f64(&output[format!("bidp{level}")]);
            ask_volumes[i] = parse_u64(&output[format!("askp_rsqn{level}")]);
            bid_volumes[i] = parse_u64(&output[format!("bidp_rsqn{level}")]);
        }

        Ok(Orderbook {
            ask_prices,
            bid_prices,
            ask_volumes,
            bid_volumes,
            total_ask_volume: parse_u64(&output["total_askp_rsqn"]),
            total_bid_volume: parse_u64(&output["total_bidp_rsqn"]),
        })
    }

    #[instrument(skip(self), name = "rest::get_balance")]
    pub async fn get_balance(&self) -> Result<Balance, CoreError> {
        let mut balance = Balance::default();
        let mut ctx_fk = String::new();
        let mut ctx_nk = String::new();
        let mut first_page = true;

        loop {
            let query = [
                ("CANO", self.credentials.account_number.clone()),
                ("ACNT_PRDT_CD", self.credentials.account_product_code.clone()),
                ("AFHR_FLPR_YN", "N".to_string()),
                ("OFL_YN", "".to_string()),
                ("INQR_DVSN", "02".to_string()),
                ("UNPR_DVSN", "01".to_string()),
                ("FUND_STTL_ICLD_YN", "N".to_string()),
                ("FNCG_AMT_AUTO_RDPT_YN", "N".to_string()),
                ("PRCS_DVSN", "00".to_string()),
                ("CTX_AREA_FK100", ctx_fk.clone()),
                ("CTX_AREA_NK100", ctx_nk.clone()),
            ];
            let body = self.execute(&BALANCE, &query, None).await?;

            if first_page {
                if let Some(summary) = body["output2"].as_array().and_then(|a| a.first()) {
                    balance.deposit = parse_f64(&summary["dnca_tot_amt"]) as i64;
                    balance.total_eval_amount = parse_f64(&summary["tot_evlu_amt"]) as i64;
                }
                first_page = false;
            }

            if let Some(positions) = body["output1"].as_array() {
                for p in positions {
                    let code = p["pdno"].as_str().unwrap_or_default().to_string();
                    if code.is_empty() {
                        continue;
                    }
                    balance.positions.insert(
                        code,
                        PositionSummary {
                            name: p["prdt_name"].as_str().unwrap_or_default().to_string(),
                            quantity: parse_u64(&p["hldg_qty"]),
                            orderable_quantity: parse_u64(&p["ord_psbl_qty"]),
                            avg_price: parse_f64(&p["pchs_avg_pric"]),
                            purchase_amount: parse_f64(&p["pchs_amt"]),
                            current_price: parse_f64(&p["prpr"]),
                            eval_amount: parse_f64(&p["evlu_amt"]),
                            eval_profit_loss: parse_f64(&p["evlu_pfls_amt"]),
                        },
                    );
                }
            }

            ctx_fk = body["ctx_area_fk100"].as_str().unwrap_or_default().to_string();
            ctx_nk = body["ctx_area_nk100"].as_str().unwrap_or_default().to_string();

            // spec.md §4.4: continue while tr_cont == "M"; the continuation
            // flag rides the response body's tr_cont field in this wire
            // format rather than a header, unlike the response header form
            // described for the generic case.
            if body["tr_cont"].as_str() == Some("M") {
                continue;
            }
            break;
        }

        Ok(balance)
    }

    #[instrument(skip(self, price), name = "rest::place_order")]
    pub async fn place_order(
        &self,
        code: &str,
        side: Side,
        quantity: u64,
        price: f64,
        division: OrderDivision,
    ) -> Result<OrderResult, CoreError> {
        Self::validate_code(code)?;
        Self::validate_range(quantity as i64, 1, 10_000, "quantity")?;
        Self::validate_order(division, price)?;

        let ord_dvsn = match division {
            OrderDivision::Limit => "00",
            OrderDivision::Market => "01",
        };
        let sll_buy_dvsn = match side {
            Side::Sell => "01",
            Side::Buy => "02",
        };

        let body = json!({
            "CANO": self.credentials.account_number,
            "ACNT_PRDT_CD": self.credentials.account_product_code,
            "PDNO": code,
            "ORD_DVSN": ord_dvsn,
            "ORD_QTY": quantity.to_string(),
            "ORD_UNPR": if price > 0.0 { format!("{price:.0}") } else { "0".to_string() },
            "SLL_BUY_DVSN_CD": sll_buy_dvsn,
        });

        let descriptor = match side {
            Side::Sell => &ORDER_SELL,
            Side::Buy => &ORDER_BUY,
        };

        match self.execute(descriptor, &[], Some(body)).await {
            Ok(resp) => {
                debug!(code, "order placed");
                Ok(OrderResult {
                    success: true,
                    order_number: resp["output"]["ODNO"].as_str().map(str::to_string),
                    error: None,
                })
            }
            Err(CoreError::BrokerLogic { error_code, message }) => Ok(OrderResult {
                success: false,
                order_number: None,
                error: Some(format!("[{error_code}] {message}")),
            }),
            Err(e) => Err(e),
        }
    }
}

fn parse_f64(value: &Value) -> f64 {
    parse_f64_or(value, 0.0)
}

fn parse_f64_or(value: &Value, default: f64) -> f64 {
    match value {
        Value::String(s) if !s.is_empty() => s.parse().unwrap_or(default),
        Value::Number(n) => n.as_f64().unwrap_or(default),
        _ => default,
    }
}

fn parse_u64(value: &Value) -> u64 {
    match value {
        Value::String(s) if !s.is_empty() => s.parse::<f64>().map(|f| f as u64).unwrap_or(0),
        Value::Number(n) => n.as_u64().unwrap_or_else(|| n.as_f64().unwrap_or(0.0) as u64),
        _ => 0,
    }
}

fn parse_bars(output: &Value) -> Vec<OhlcvBar> {
    let Some(rows) = output.as_array() else {
        return Vec::new();
    };

    let mut bars: Vec<OhlcvBar> = rows
        .iter()
        .filter_map(|row| {
            let date = NaiveDate::parse_from_str(row["stck_bsop_date"].as_str()?, "%Y%m%d").ok()?;
            Some(OhlcvBar {
                date,
                open: parse_f64(&row["stck_oprc"]),
                high: parse_f64(&row["stck_hgpr"]),
                low: parse_f64(&row["stck_lwpr"]),
                close: parse_f64(&row["stck_clpr"]),
                volume: parse_u64(&row["acml_vol"]),
            })
        })
        .collect();

    bars.sort_by_key(|b| b.date);
    bars
}
