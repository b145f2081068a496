pub mod market_data;
pub mod symbols;
pub mod ws_feed;

pub use market_data::MarketDataClient;
