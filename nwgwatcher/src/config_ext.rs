//! Extension pour intégrer la configuration du watcher dans nwgconfig
//!
//! Ce module fournit le trait `WatcherConfigExt` qui ajoute les accesseurs
//! typés du watcher à `nwgconfig::Config`. Les valeurs invalides retombent
//! sur les défauts avec un warning, jamais sur une erreur.

use crate::model::WatcherSettings;
use nwgconfig::Config;
use nwgnrcs::QueueId;
use nwgplayout::WatchedQueue;
use serde_yaml::Value;
use std::time::Duration;
use tracing::warn;

/// Trait d'extension pour la configuration du watcher
pub trait WatcherConfigExt {
    /// Files NRCS surveillées, dans l'ordre de traitement
    fn watcher_queues(&self) -> Vec<WatchedQueue>;

    /// Intervalle entre la fin d'un cycle de poll et le début du suivant
    fn poll_interval(&self) -> Duration;

    /// Version de gateway attendue sur les rundowns
    fn gateway_version(&self) -> String;

    /// Niveau de log debug demandé
    fn watcher_debug(&self) -> bool;

    /// Espacement minimal entre deux ranks avant recalcul entier
    fn rank_fraction_floor(&self) -> f64;

    /// Délai minimal entre deux recalculs entiers forcés d'un même rundown
    fn rank_rebase_cooldown(&self) -> Duration;

    /// Assemble les réglages complets du watcher
    fn watcher_settings(&self) -> WatcherSettings;
}

impl WatcherConfigExt for Config {
    fn watcher_queues(&self) -> Vec<WatchedQueue> {
        match self.get_value(&["watcher", "queues"]) {
            Ok(Value::Sequence(entries)) => entries
                .iter()
                .filter_map(|entry| match entry {
                    Value::String(queue) => Some(WatchedQueue::new(queue.clone())),
                    Value::Mapping(map) => {
                        let queue = map
                            .get(&Value::String("queue".to_string()))
                            .and_then(Value::as_str)?;
                        let alias = map
                            .get(&Value::String("alias".to_string()))
                            .and_then(Value::as_str)
                            .map(str::to_string);
                        Some(WatchedQueue {
                            queue: QueueId(queue.to_string()),
                            alias,
                        })
                    }
                    _ => None,
                })
                .collect(),
            Ok(_) => {
                warn!("watcher.queues is not a sequence, watching nothing");
                Vec::new()
            }
            Err(_) => Vec::new(),
        }
    }

    fn poll_interval(&self) -> Duration {
        let millis = match self.get_value(&["watcher", "poll_interval_ms"]) {
            Ok(Value::Number(n)) if n.as_u64().is_some() => n.as_u64().unwrap(),
            Ok(_) => {
                warn!("Invalid watcher.poll_interval_ms, using default 2000");
                2000
            }
            Err(_) => 2000,
        };
        Duration::from_millis(millis)
    }

    fn gateway_version(&self) -> String {
        match self.get_value(&["watcher", "gateway_version"]) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            _ => {
                warn!("watcher.gateway_version not configured, using \"v1\"");
                "v1".to_string()
            }
        }
    }

    fn watcher_debug(&self) -> bool {
        matches!(
            self.get_value(&["watcher", "debug"]),
            Ok(Value::Bool(true))
        )
    }

    fn rank_fraction_floor(&self) -> f64 {
        match self.get_value(&["watcher", "rank_fraction_floor"]) {
            Ok(Value::Number(n)) if n.as_f64().is_some() => n.as_f64().unwrap(),
            Ok(_) => {
                warn!("Invalid watcher.rank_fraction_floor, using default 1e-6");
                1e-6
            }
            Err(_) => 1e-6,
        }
    }

    fn rank_rebase_cooldown(&self) -> Duration {
        let secs = match self.get_value(&["watcher", "rank_rebase_cooldown_secs"]) {
            Ok(Value::Number(n)) if n.as_u64().is_some() => n.as_u64().unwrap(),
            Ok(_) => {
                warn!("Invalid watcher.rank_rebase_cooldown_secs, using default 30");
                30
            }
            Err(_) => 30,
        };
        Duration::from_secs(secs)
    }

    fn watcher_settings(&self) -> WatcherSettings {
        WatcherSettings {
            queues: self.watcher_queues(),
            poll_interval: self.poll_interval(),
            gateway_version: self.gateway_version(),
            debug: self.watcher_debug(),
            rank_fraction_floor: self.rank_fraction_floor(),
            rank_rebase_cooldown: self.rank_rebase_cooldown(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(content: &str) -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, content).unwrap();
        let config = Config::load_config(path.to_str().unwrap()).unwrap();
        (dir, config)
    }

    #[test]
    fn test_defaults_without_watcher_section() {
        let (_dir, config) = config_with("host: {}\n");

        assert!(config.watcher_queues().is_empty());
        assert_eq!(config.poll_interval(), Duration::from_millis(2000));
        assert_eq!(config.rank_fraction_floor(), 1e-6);
        assert_eq!(config.rank_rebase_cooldown(), Duration::from_secs(30));
        assert!(!config.watcher_debug());
    }

    #[test]
    fn test_queue_list_with_aliases() {
        let (_dir, config) = config_with(
            "watcher:\n  queues:\n    - queue: \"NYHETER.ON-AIR\"\n      alias: on-air\n    - \"SPORT.ON-AIR\"\n",
        );

        let queues = config.watcher_queues();
        assert_eq!(queues.len(), 2);
        assert_eq!(queues[0].queue.0, "NYHETER.ON-AIR");
        assert_eq!(queues[0].alias.as_deref(), Some("on-air"));
        assert_eq!(queues[1].queue.0, "SPORT.ON-AIR");
        assert!(queues[1].alias.is_none());
    }

    #[test]
    fn test_full_settings_assembly() {
        let (_dir, config) = config_with(
            "watcher:\n  poll_interval_ms: 500\n  gateway_version: tv-2\n  debug: true\n  rank_rebase_cooldown_secs: 5\n",
        );

        let settings = config.watcher_settings();
        assert_eq!(settings.poll_interval, Duration::from_millis(500));
        assert_eq!(settings.gateway_version, "tv-2");
        assert!(settings.debug);
        assert_eq!(settings.rank_rebase_cooldown, Duration::from_secs(5));
    }
}
