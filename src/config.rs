//! Stack-wide configuration (§4.10, ambient). The core never reads files or
//! environment variables itself; a consumer constructs this from whatever source it
//! likes and passes it in.

use std::time::Duration;

use crate::uri::Uri;

/// Base timers and the few other values the core needs from its caller.
#[derive(Debug, Clone)]
pub struct StackConfig {
    pub t1: Duration,
    pub t2: Duration,
    pub t4: Duration,
    pub server_transaction_ttl: Duration,
    pub outbound_proxy: Option<Uri>,
}

impl Default for StackConfig {
    fn default() -> Self {
        let t1 = Duration::from_millis(500);
        StackConfig {
            t1,
            t2: Duration::from_secs(4),
            t4: Duration::from_secs(5),
            server_transaction_ttl: t1 * 64,
            outbound_proxy: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ttl_is_64_t1() {
        let config = StackConfig::default();
        assert_eq!(config.server_transaction_ttl, config.t1 * 64);
    }
}
