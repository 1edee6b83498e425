// =============================================================================
// WebSocket frame parsing (C5)
// =============================================================================
//
// Incoming frame bodies are pipe-delimited with a field order fixed by
// TR-ID (spec.md §4.5). Field indices below are 0-based. A frame with
// fewer fields than the TR-ID requires is dropped rather than partially
// parsed — a truncated frame is worse than a missing one.
// =============================================================================

use serde_json::Value;

pub const TRADE_TR_ID: &str = "H0STCNT0";
pub const ORDERBOOK_TR_ID: &str = "H0STASP0";
pub const FILL_TR_ID: &str = "H0STCNI0";

const TRADE_MIN_FIELDS: usize = 20;
const ORDERBOOK_MIN_FIELDS: usize = 60;

#[derive(Debug, Clone, PartialEq)]
pub struct TradeFrame {
    pub code: String,
    pub time: String,
    pub price: f64,
    pub change_abs: f64,
    pub change_rate: f64,
    pub volume: u64,
    pub cum_volume: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderbookFrame {
    pub code: String,
    pub ask_prices: [f64; 10],
    pub bid_prices: [f64; 10],
    pub ask_volumes: [u64; 10],
    pub bid_volumes: [u64; 10],
    pub total_ask_volume: u64,
    pub total_bid_volume: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WsFrame {
    Trade(TradeFrame),
    Orderbook(OrderbookFrame),
    Fill(String),
    Unknown { tr_id: String, raw: String },
}

fn field_f64(fields: &[&str], idx: usize) -> f64 {
    fields.get(idx).filter(|s| !s.is_empty()).and_then(|s| s.parse().ok()).unwrap_or(0.0)
}

fn field_u64(fields: &[&str], idx: usize) -> u64 {
    fields
        .get(idx)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<f64>().ok())
        .map(|f| f as u64)
        .unwrap_or(0)
}

fn field_str(fields: &[&str], idx: usize) -> String {
    fields.get(idx).copied().unwrap_or_default().to_string()
}

fn parse_trade(body: &str) -> Option<WsFrame> {
    let fields: Vec<&str> = body.split('|').collect();
    if fields.len() < TRADE_MIN_FIELDS {
        return None;
    }

    Some(WsFrame::Trade(TradeFrame {
        code: field_str(&fields, 0),
        time: field_str(&fields, 1),
        price: field_f64(&fields, 2),
        change_abs: field_f64(&fields, 4),
        change_rate: field_f64(&fields, 5),
        open: field_f64(&fields, 7),
        high: field_f64(&fields, 8),
        low: field_f64(&fields, 9),
        volume: field_u64(&fields, 12),
        cum_volume: field_u64(&fields, 13),
    }))
}

fn parse_orderbook(body: &str) -> Option<WsFrame> {
    let fields: Vec<&str> = body.split('|').collect();
    if fields.len() < ORDERBOOK_MIN_FIELDS {
        return None;
    }

    let mut ask_prices = [0.0; 10];
    let mut bid_prices = [0.0; 10];
    let mut ask_volumes = [0u64; 10];
    let mut bid_volumes = [0u64; 10];

    for i in 0..10 {
        ask_prices[i] = field_f64(&fields, 4 + i);
        bid_prices[i] = field_f64(&fields, 14 + i);
        ask_volumes[i] = field_u64(&fields, 24 + i);
        bid_volumes[i] = field_u64(&fields, 34 + i);
    }

    Some(WsFrame::Orderbook(OrderbookFrame {
        code: field_str(&fields, 0),
        ask_prices,
        bid_prices,
        ask_volumes,
        bid_volumes,
        total_ask_volume: field_u64(&fields, 44),
        total_bid_volume: field_u64(&fields, 45),
    }))
}

/// Parse one WebSocket data frame given its TR-ID and pipe-delimited body.
/// Unknown TR-IDs are forwarded as [`WsFrame::Unknown`] rather than dropped.
pub fn parse_frame(tr_id: &str, body: &str) -> Option<WsFrame> {
    match tr_id {
        TRADE_TR_ID => parse_trade(body),
        ORDERBOOK_TR_ID => parse_orderbook(body),
        FILL_TR_ID => Some(WsFrame::Fill(body.to_string())),
        other => Some(WsFrame::Unknown {
            tr_id: other.to_string(),
            raw: body.to_string(),
        }),
    }
}

/// `{raw: body}` envelope used for any TR-ID the client doesn't understand.
pub fn unknown_envelope(raw: &str) -> Value {
    serde_json::json!({ "raw": raw })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade_body(fields: usize) -> String {
        (0..fields)
            .map(|i| match i {
                0 => "005930".to_string(),
                1 => "153000".to_string(),
                2 => "70000".to_string(),
                4 => "500".to_string(),
                5 => "0.72".to_string(),
                7 => "69500".to_string(),
                8 => "71000".to_string(),
                9 => "69000".to_string(),
                12 => "100".to_string(),
                13 => "123456".to_string(),
                _ => String::new(),
            })
            .collect::<Vec<_>>()
            .join("|")
    }

    #[test]
    fn parses_trade_frame_with_enough_fields() {
        let body = trade_body(20);
        let frame = parse_frame(TRADE_TR_ID, &body).unwrap();
        match frame {
            WsFrame::Trade(t) => {
                assert_eq!(t.code, "005930");
                assert_eq!(t.price, 70000.0);
                assert_eq!(t.volume, 100);
                assert_eq!(t.cum_volume, 123456);
                assert_eq!(t.high, 71000.0);
            }
            _ => panic!("expected trade frame"),
        }
    }

    #[test]
    fn drops_trade_frame_with_too_few_fields() {
        let body = trade_body(10);
        assert!(parse_frame(TRADE_TR_ID, &body).is_none());
    }

    #[test]
    fn empty_fields_coerce_to_zero() {
        let body = "005930|153000|70000|0||0.72||69500|71000|69000||||123456||||||".to_string();
        let frame = parse_frame(TRADE_TR_ID, &body).unwrap();
        match frame {
            WsFrame::Trade(t) => assert_eq!(t.change_abs, 0.0),
            _ => panic!("expected trade frame"),
        }
    }

    #[test]
    fn parses_orderbook_frame() {
        let mut fields = vec![String::new(); 60];
        fields[0] = "005930".to_string();
        for i in 0..10 {
            fields[4 + i] = (70100 + i as i64 * 100).to_string();
            fields[14 + i] = (69900 - i as i64 * 100).to_string();
            fields[24 + i] = (10 + i as u64).to_string();
            fields[34 + i] = (20 + i as u64).to_string();
        }
        fields[44] = "500".to_string();
        fields[45] = "600".to_string();
        let body = fields.join("|");

        let frame = parse_frame(ORDERBOOK_TR_ID, &body).unwrap();
        match frame {
            WsFrame::Orderbook(ob) => {
                assert_eq!(ob.code, "005930");
                assert_eq!(ob.ask_prices[0], 70100.0);
                assert_eq!(ob.bid_prices[0], 69900.0);
                assert_eq!(ob.total_ask_volume, 500);
                assert_eq!(ob.total_bid_volume, 600);
            }
            _ => panic!("expected orderbook frame"),
        }
    }

    #[test]
    fn unknown_tr_id_is_forwarded() {
        let frame = parse_frame("H0UNKNOWN0", "a|b|c").unwrap();
        assert_eq!(
            frame,
            WsFrame::Unknown {
                tr_id: "H0UNKNOWN0".to_string(),
                raw: "a|b|c".to_string()
            }
        );
    }
}
