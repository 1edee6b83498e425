// =============================================================================
// Endpoint registry — compile-time TR-ID table (C4)
// =============================================================================
//
// One `EndpointDescriptor` per broker operation the core calls. TR-IDs are
// resolved by server at call time (`tr_id_paper`/`tr_id_live`); there is no
// dynamic TR-ID construction anywhere in the client. Mirrors the way the
// teacher hard-codes `"/api/v3/..."` paths in `binance::client` rather than
// building them from parts at the call site.
// =============================================================================

use crate::config::credentials::Server;

#[derive(Debug, Clone, Copy)]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone, Copy)]
pub struct EndpointDescriptor {
    pub name: &'static str,
    pub http_method: HttpMethod,
    pub path: &'static str,
    pub tr_id_paper: &'static str,
    pub tr_id_live: &'static str,
    pub requires_hashkey: bool,
}

impl EndpointDescriptor {
    pub fn tr_id(&self, server: Server) -> &'static str {
        match server {
            Server::Paper => self.tr_id_paper,
            Server::Live => self.tr_id_live,
        }
    }
}

pub const CURRENT_PRICE: EndpointDescriptor = EndpointDescriptor {
    name: "current_price",
    http_method: HttpMethod::Get,
    path: "/uapi/domestic-stock/v1/quotations/inquire-price",
    tr_id_paper: "FHKST01010100",
    tr_id_live: "FHKST01010100",
    requires_hashkey: false,
};

pub const DAILY_CHART: EndpointDescriptor = EndpointDescriptor {
    name: "daily_chart",
    http_method: HttpMethod::Get,
    path: "/uapi/domestic-stock/v1/quotations/inquire-daily-itemchartprice",
    tr_id_paper: "FHKST03010100",
    tr_id_live: "FHKST03010100",
    requires_hashkey: false,
};

pub const MINUTE_BARS: EndpointDescriptor = EndpointDescriptor {
    name: "minute_bars",
    http_method: HttpMethod::Get,
    path: "/uapi/domestic-stock/v1/quotations/inquire-time-itemchartprice",
    tr_id_paper: "FHKST03010200",
    tr_id_live: "FHKST03010200",
    requires_hashkey: false,
};

pub const TICK_CONCLUSIONS: EndpointDescriptor = EndpointDescriptor {
    name: "tick_conclusions",
    http_method: HttpMethod::Get,
    path: "/uapi/domestic-stock/v1/quotations/inquire-time-itemconclusion",
    tr_id_paper: "FHPST01060000",
    tr_id_live: "FHPST01060000",
    requires_hashkey: false,
};

pub const ORDERBOOK: EndpointDescriptor = EndpointDescriptor {
    name: "orderbook",
    http_method: HttpMethod::Get,
    path: "/uapi/domestic-stock/v1/quotations/inquire-asking-price-exp-ccn",
    tr_id_paper: "FHKST01010200",
    tr_id_live: "FHKST01010200",
    requires_hashkey: false,
};

pub const BALANCE: EndpointDescriptor = EndpointDescriptor {
    name: "balance",
    http_method: HttpMethod::Get,
    path: "/uapi/domestic-stock/v1/trading/inquire-balance",
    tr_id_paper: "VTTC8434R",
    tr_id_live: "TTTC8434R",
    requires_hashkey: false,
};

pub const ORDER_SELL: EndpointDescriptor = EndpointDescriptor {
    name: "order_sell",
    http_method: HttpMethod::Post,
    path: "/uapi/domestic-stock/v1/trading/order-cash",
    tr_id_paper: "VTTC0011U",
    tr_id_live: "TTTC0011U",
    requires_hashkey: true,
};

pub const ORDER_BUY: EndpointDescriptor = EndpointDescriptor {
    name: "order_buy",
    http_method: HttpMethod::Post,
    path: "/uapi/domestic-stock/v1/trading/order-cash",
    tr_id_paper: "VTTC0012U",
    tr_id_live: "TTTC0012U",
    requires_hashkey: true,
};

pub const TOKEN: EndpointDescriptor = EndpointDescriptor {
    name: "token",
    http_method: HttpMethod::Post,
    path: "/oauth2/tokenP",
    tr_id_paper: "",
    tr_id_live: "",
    requires_hashkey: false,
};

pub const HASHKEY: EndpointDescriptor = EndpointDescriptor {
    name: "hashkey",
    http_method: HttpMethod::Post,
    path: "/uapi/hashkey",
    tr_id_paper: "",
    tr_id_live: "",
    requires_hashkey: false,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_tr_id_matches_server() {
        assert_eq!(BALANCE.tr_id(Server::Paper), "VTTC8434R");
        assert_eq!(BALANCE.tr_id(Server::Live), "TTTC8434R");
    }

    #[test]
    fn order_tr_ids_have_matching_prefix() {
        assert!(ORDER_SELL.tr_id(Server::Paper).starts_with('V'));
        assert!(ORDER_SELL.tr_id(Server::Live).starts_with('T'));
        assert!(ORDER_BUY.requires_hashkey);
    }
}
