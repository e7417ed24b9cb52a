use std::path::Path;

use crate::config::ResolvedConfig;
use crate::duration::format_duration;

pub fn config_output(config_path: &Path, config: &ResolvedConfig) -> serde_json::Value {
    serde_json::json!({
        "config_file": config_path.display().to_string(),
        "data_directory": config.data_dir.display().to_string(),
        "reference_currency": config.reference_currency,
        "price_feed": {
            "base_url": config.price_feed.base_url,
            "timeout": format_duration(config.price_feed.timeout),
            "cache_duration": format_duration(config.price_feed.cache_duration)
        },
        "currencies": config.currencies
    })
}
