// =============================================================================
// Broker (C4 + C5)
// =============================================================================
//
// Everything that talks to the broker directly: the endpoint registry, the
// REST client (quotes, balance, orders), and the WebSocket client (realtime
// trades/orderbook/fills). `rest` and `ws` share nothing but the wire-format
// knowledge in `endpoints`/`ws_frames` — they're driven by separate
// connections and separate lifecycles.
// =============================================================================

pub mod endpoints;
pub mod rest;
pub mod ws;
pub mod ws_frames;

pub use rest::{Balance, OrderResult, Orderbook, OrderDivision, PositionSummary, RestClient, Side};
pub use ws::{WsClient, REQUIRED_TR_IDS};
pub use ws_frames::{OrderbookFrame, TradeFrame, WsFrame};
