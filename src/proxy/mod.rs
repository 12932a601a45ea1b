//! Proxy rotation with health scoring
//!
//! Proxies are drawn by weighted random choice over their health scores.
//! Persistently failing proxies are dropped and unavailable ones are
//! re-verified in the background.

mod manager;
mod record;
mod store;

pub use manager::ProxyManager;
pub use record::{parse_proxy_address, ProxyRecord, MAX_CONSECUTIVE_FAILURES, SUPPORTED_SCHEMES};
pub use store::{load_proxy_list, read_state, write_state};
