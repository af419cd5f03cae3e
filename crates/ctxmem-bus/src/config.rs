//! Bus-wide dispatch settings, derived from `ctxmem_types::CoreConfig`'s
//! `mq_*` fields (§4.K) but independent of the rest of `CoreConfig` so this
//! crate doesn't depend on fields it has no use for.

use std::time::Duration;

use ctxmem_types::CoreConfig;

#[derive(Debug, Clone)]
pub struct BusConfig {
    pub global_qos: usize,
    pub handler_timeout: Duration,
    pub default_message_ttl: Duration,
    pub default_dlx_ttl: Duration,
    pub default_max_retries: u32,
    pub retry_delay_unit: Duration,
}

impl From<&CoreConfig> for BusConfig {
    fn from(config: &CoreConfig) -> Self {
        Self {
            global_qos: config.mq_global_qos,
            handler_timeout: Duration::from_secs_f64(config.mq_consumer_handler_timeout_sec),
            default_message_ttl: Duration::from_secs(config.mq_default_message_ttl_seconds),
            default_dlx_ttl: Duration::from_secs(config.mq_default_dlx_ttl_days * 24 * 3600),
            default_max_retries: config.mq_default_max_retries,
            retry_delay_unit: Duration::from_secs_f64(config.mq_default_retry_delay_unit_sec),
        }
    }
}

// Mirrors `CoreConfig`'s own `default_mq_*` constants (those functions are
// private to that crate, so the numbers are duplicated here rather than
// imported).
impl Default for BusConfig {
    fn default() -> Self {
        Self {
            global_qos: 100,
            handler_timeout: Duration::from_secs(60),
            default_message_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            default_dlx_ttl: Duration::from_secs(7 * 24 * 3600),
            default_max_retries: 3,
            retry_delay_unit: Duration::from_secs(1),
        }
    }
}
