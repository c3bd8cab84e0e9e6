// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Global settings and per-pattern service defaults.

use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use crate::port::UnableToDeliverStrategy;

/// Settings shared by every service of one deployment.
///
/// Two processes only see each other's services when they agree on
/// [`Global::prefix`]; tests use a unique prefix to stay isolated.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Config {
    pub global: Global,
    pub defaults: Defaults,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    /// Directory holding the listener wake-up sockets.
    pub root_path: PathBuf,
    /// Prefix of every shared memory object and socket file.
    pub prefix: String,
    pub service: ServiceSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSettings {
    /// How long an opener waits for a service that is still being created.
    pub creation_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Defaults {
    pub publish_subscribe: PublishSubscribe,
    pub event: Event,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishSubscribe {
    pub max_subscribers: usize,
    pub max_publishers: usize,
    pub max_nodes: usize,
    pub publisher_history_size: usize,
    pub subscriber_max_buffer_size: usize,
    pub subscriber_max_borrowed_samples: usize,
    pub publisher_max_loaned_samples: usize,
    pub enable_safe_overflow: bool,
    pub unable_to_deliver_strategy: UnableToDeliverStrategy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub max_listeners: usize,
    pub max_notifiers: usize,
    pub max_nodes: usize,
    pub event_id_max_value: usize,
    pub notifier_created_event: Option<usize>,
    pub notifier_dropped_event: Option<usize>,
}

impl Default for Global {
    fn default() -> Self {
        Self {
            root_path: std::env::temp_dir().join("zcipc"),
            prefix: "zcipc_".to_string(),
            service: ServiceSettings::default(),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            creation_timeout: Duration::from_millis(500),
        }
    }
}

impl Default for PublishSubscribe {
    fn default() -> Self {
        Self {
            max_subscribers: 8,
            max_publishers: 2,
            max_nodes: 20,
            publisher_history_size: 1,
            subscriber_max_buffer_size: 2,
            subscriber_max_borrowed_samples: 2,
            publisher_max_loaned_samples: 2,
            enable_safe_overflow: true,
            unable_to_deliver_strategy: UnableToDeliverStrategy::Block,
        }
    }
}

impl Default for Event {
    fn default() -> Self {
        Self {
            max_listeners: 16,
            max_notifiers: 16,
            max_nodes: 36,
            event_id_max_value: 255,
            notifier_created_event: None,
            notifier_dropped_event: None,
        }
    }
}

impl Config {
    /// Process-wide default configuration.
    pub fn global_config() -> &'static Config {
        static CONFIG: OnceLock<Config> = OnceLock::new();
        CONFIG.get_or_init(Config::default)
    }

    /// Same defaults, separate namespace.
    pub fn with_prefix(prefix: &str) -> Self {
        let mut config = Self::default();
        config.global.prefix = prefix.to_string();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = Config::default();
        assert_eq!(c.global.prefix, "zcipc_");
        assert_eq!(c.global.service.creation_timeout, Duration::from_millis(500));
        let ps = &c.defaults.publish_subscribe;
        assert_eq!(ps.max_subscribers, 8);
        assert_eq!(ps.max_publishers, 2);
        assert_eq!(ps.publisher_history_size, 1);
        assert_eq!(ps.subscriber_max_buffer_size, 2);
        assert_eq!(ps.subscriber_max_borrowed_samples, 2);
        assert_eq!(ps.publisher_max_loaned_samples, 2);
        assert!(ps.enable_safe_overflow);
        assert_eq!(ps.unable_to_deliver_strategy, UnableToDeliverStrategy::Block);
        assert_eq!(c.defaults.event.max_listeners, 16);
        assert_eq!(c.defaults.event.max_notifiers, 16);
        assert_eq!(c.defaults.event.event_id_max_value, 255);
        assert_eq!(c.defaults.event.notifier_created_event, None);
    }

    #[test]
    fn global_config_is_shared() {
        let a = Config::global_config() as *const Config;
        let b = Config::global_config() as *const Config;
        assert_eq!(a, b);
    }
}
