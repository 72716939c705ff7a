//! Model configuration.

/// What to do with cached data when opening a mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheLoadingMode {
    /// Trust the cache; only reconcile the delta.
    #[default]
    CachedIsOk,
    /// Ignore cached message data and reload everything.
    ForceReload,
}

/// How message parts are fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartFetchingMode {
    /// `BODY.PEEK[...]`: transfer-encoded bytes, decoded locally.
    #[default]
    Imap,
    /// `BINARY.PEEK[...]` (RFC 3516): the server decodes.
    Binary,
}

/// Tunables, all set at model construction or via [`Config::set_property`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Milliseconds to batch part fetches before emitting one FETCH.
    pub delayed_fetch_part_ms: u64,
    /// Milliseconds between keepalives (NOOP, or IDLE re-arm).
    pub noop_period_ms: u64,
    pub cache_loading_mode: CacheLoadingMode,
    pub part_fetching_mode: PartFetchingMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            delayed_fetch_part_ms: 50,
            noop_period_ms: 2 * 60 * 1000,
            cache_loading_mode: CacheLoadingMode::CachedIsOk,
            part_fetching_mode: PartFetchingMode::Imap,
        }
    }
}

impl Config {
    /// Property-style access for embedders that carry settings as strings.
    /// The historical option keys are accepted verbatim.
    pub fn set_property(&mut self, key: &str, value: &str) -> bool {
        match key {
            "trojita-imap-delayed-fetch-part" => match value.parse() {
                Ok(ms) => {
                    self.delayed_fetch_part_ms = ms;
                    true
                }
                Err(_) => false,
            },
            "trojita-imap-noop-period" => match value.parse() {
                Ok(ms) => {
                    self.noop_period_ms = ms;
                    true
                }
                Err(_) => false,
            },
            "cache-loading-mode" => match value {
                "cached-is-ok" => {
                    self.cache_loading_mode = CacheLoadingMode::CachedIsOk;
                    true
                }
                "force-reload" => {
                    self.cache_loading_mode = CacheLoadingMode::ForceReload;
                    true
                }
                _ => false,
            },
            "part-fetching-mode" => match value {
                "IMAP" => {
                    self.part_fetching_mode = PartFetchingMode::Imap;
                    true
                }
                "BINARY" => {
                    self.part_fetching_mode = PartFetchingMode::Binary;
                    true
                }
                _ => false,
            },
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_keys() {
        let mut config = Config::default();
        assert!(config.set_property("trojita-imap-delayed-fetch-part", "120"));
        assert_eq!(config.delayed_fetch_part_ms, 120);

        assert!(config.set_property("part-fetching-mode", "BINARY"));
        assert_eq!(config.part_fetching_mode, PartFetchingMode::Binary);

        assert!(!config.set_property("part-fetching-mode", "CARRIER-PIGEON"));
        assert!(!config.set_property("unknown-key", "1"));
    }
}
