mod feed;
mod file_cache;
mod kv;
mod price_cache;
pub mod providers;
mod registry;
mod resolver;

pub use feed::{PriceFeed, PriceTable};
pub use file_cache::FileKeyValueCache;
pub use kv::{KeyValueCache, MemoryKeyValueCache};
pub use price_cache::{
    PriceCache, DEFAULT_CACHE_DURATION, DEFAULT_FETCH_TIMEOUT, PRICE_CACHE_KEY,
};
pub use registry::{default_feed_ids, CurrencyRegistry};
pub use resolver::PriceResolver;
