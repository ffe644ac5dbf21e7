//! # nwgconfig - Configuration centralisée pour NWGateway
//!
//! La configuration du gateway est un document YAML unique : les défauts
//! embarqués, recouverts par le premier fichier utilisateur trouvé, puis
//! par les variables d'environnement `NWGATEWAY_CONFIG__SECTION__CLEF`.
//! Les crates consommatrices ajoutent leurs accesseurs typés via des
//! traits d'extension (voir `WatcherConfigExt` dans `nwgwatcher`) au lieu
//! de les déclarer ici.

use anyhow::{anyhow, Context, Result};
use dirs::home_dir;
use lazy_static::lazy_static;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::{env, fs};
use tracing::{debug, info, warn};
use uuid::Uuid;

const DEFAULT_CONFIG: &str = include_str!("nwgateway.yaml");
const ENV_CONFIG_FILE: &str = "NWGATEWAY_CONFIG";
const ENV_PREFIX: &str = "NWGATEWAY_CONFIG__";
const USER_FILE: &str = ".nwgateway.yml";

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load_config("").expect("Failed to load NWGateway configuration"));
}

/// Configuration du gateway, adossée à un fichier YAML.
///
/// Le document complet vit en mémoire sous forme d'arbre `serde_yaml` ;
/// chaque écriture est immédiatement persistée dans le fichier retenu au
/// chargement. Les clefs sont insensibles à la casse.
#[derive(Debug)]
pub struct Config {
    path: PathBuf,
    data: Mutex<Value>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            data: Mutex::new(self.data.lock().unwrap().clone()),
        }
    }
}

impl Config {
    /// Charge la configuration.
    ///
    /// Le premier fichier lisible parmi les candidats (chemin explicite,
    /// variable `NWGATEWAY_CONFIG`, `./.nwgateway.yml`, `~/.nwgateway.yml`)
    /// est recouvert sur les défauts embarqués. Sans aucun fichier, les
    /// défauts seuls s'appliquent et le premier emplacement inscriptible
    /// sert de fichier de sauvegarde.
    pub fn load_config(filename: &str) -> Result<Self> {
        let defaults: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;
        let mut data = normalize_keys(defaults);
        let mut source: Option<PathBuf> = None;

        for candidate in Self::candidates(filename) {
            match fs::read(&candidate) {
                Ok(bytes) => {
                    info!(config_file = %candidate.display(), "Loading config");
                    let user: Value = serde_yaml::from_slice(&bytes)
                        .with_context(|| format!("parsing {}", candidate.display()))?;
                    data = overlay(data, normalize_keys(user));
                    source = Some(candidate);
                    break;
                }
                Err(_) => {
                    debug!(config_file = %candidate.display(), "No readable config here");
                }
            }
        }
        if source.is_none() {
            info!("No config file found, using embedded defaults");
        }

        for (key, raw) in env::vars().filter(|(key, _)| key.starts_with(ENV_PREFIX)) {
            let segments: Vec<&str> = key[ENV_PREFIX.len()..].split("__").collect();
            let value =
                serde_yaml::from_str(&raw).unwrap_or_else(|_| Value::String(raw.clone()));
            if write_path(&mut data, &segments, value).is_err() {
                warn!(variable = %key, "Ignoring malformed environment override");
            }
        }

        let path = match source {
            Some(path) => path,
            None => Self::candidates(filename)
                .into_iter()
                .find(|candidate| parent_writable(candidate))
                .ok_or_else(|| anyhow!("Cannot find a place to store config file"))?,
        };
        info!(config_file = %path.display(), "Config file will be stored here");

        let config = Config {
            path,
            data: Mutex::new(data),
        };
        config.save()?;
        Ok(config)
    }

    /// Emplacements de configuration, du plus prioritaire au moins.
    fn candidates(filename: &str) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        if !filename.is_empty() {
            candidates.push(PathBuf::from(filename));
        }
        if let Ok(from_env) = env::var(ENV_CONFIG_FILE) {
            if !from_env.is_empty() {
                candidates.push(PathBuf::from(from_env));
            }
        }
        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        candidates.push(cwd.join(USER_FILE));
        if let Some(home) = home_dir() {
            candidates.push(home.join(USER_FILE));
        }
        candidates
    }

    pub fn save(&self) -> Result<()> {
        let yaml = serde_yaml::to_string(&*self.data.lock().unwrap())?;
        fs::write(&self.path, yaml)
            .with_context(|| format!("writing config to {}", self.path.display()))
    }

    /// Lit la valeur au chemin donné.
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data.lock().unwrap();
        let mut node = &*data;
        for (depth, key) in path.iter().enumerate() {
            let Value::Mapping(map) = node else {
                return Err(anyhow!("Path {} is not a Config", path[..depth].join(".")));
            };
            node = map
                .get(&Value::String(key.to_lowercase()))
                .ok_or_else(|| anyhow!("Path {} does not exist", path[..=depth].join(".")))?;
        }
        Ok(node.clone())
    }

    /// Écrit la valeur au chemin donné et persiste le fichier.
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        {
            let mut data = self.data.lock().unwrap();
            write_path(&mut data, path, value)?;
        }
        self.save()
    }

    /// Identifiant du device auprès du plan de contrôle.
    ///
    /// Généré (UUID v4) et persisté au premier appel si absent.
    pub fn get_device_id(&self) -> Result<String> {
        let path = &["host", "device_id"];
        match self.get_value(path) {
            Ok(Value::String(id)) if !id.is_empty() => Ok(id),
            _ => {
                let new_id = Uuid::new_v4().to_string();
                self.set_value(path, Value::String(new_id.clone()))?;
                Ok(new_id)
            }
        }
    }

    /// Token d'authentification auprès du plan de contrôle.
    ///
    /// Contrairement à l'identifiant, le token n'est jamais généré : son
    /// absence est une erreur fatale au démarrage.
    pub fn get_device_token(&self) -> Result<String> {
        match self.get_value(&["host", "device_token"]) {
            Ok(Value::String(s)) if !s.is_empty() => Ok(s),
            _ => Err(anyhow!("Device token not configured")),
        }
    }

    pub fn set_device_token(&self, token: &str) -> Result<()> {
        self.set_value(&["host", "device_token"], Value::String(token.to_string()))
    }
}

/// Retourne l'instance globale
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

/// Recouvre `base` par `over` : les mappings fusionnent clef par clef,
/// toute autre valeur (scalaires, séquences) est remplacée entière. Un
/// recouvrement nul (fichier vide) laisse `base` intact.
fn overlay(base: Value, over: Value) -> Value {
    match (base, over) {
        (Value::Mapping(mut merged), Value::Mapping(over)) => {
            for (key, value) in over {
                match merged.get_mut(&key) {
                    Some(slot) => {
                        let below = std::mem::take(slot);
                        *slot = overlay(below, value);
                    }
                    None => {
                        merged.insert(key, value);
                    }
                }
            }
            Value::Mapping(merged)
        }
        (base, Value::Null) => base,
        (_, over) => over,
    }
}

/// Écrit `value` sous `path`, en créant les mappings intermédiaires.
fn write_path(root: &mut Value, path: &[&str], value: Value) -> Result<()> {
    let Some((head, rest)) = path.split_first() else {
        *root = value;
        return Ok(());
    };
    let Value::Mapping(map) = root else {
        return Err(anyhow!("Current node is not a map"));
    };
    let slot = map
        .entry(Value::String(head.to_lowercase()))
        .or_insert_with(|| Value::Mapping(Mapping::new()));
    write_path(slot, rest, value)
}

/// Met toutes les clefs en minuscules, récursivement.
fn normalize_keys(value: Value) -> Value {
    match value {
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(key, value)| {
                    let key = match key {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    (key, normalize_keys(value))
                })
                .collect(),
        ),
        Value::Sequence(seq) => {
            Value::Sequence(seq.into_iter().map(normalize_keys).collect())
        }
        other => other,
    }
}

fn parent_writable(path: &Path) -> bool {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::metadata(parent)
        .map(|meta| !meta.permissions().readonly())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &tempfile::TempDir) -> Config {
        let path = dir.path().join("config.yml");
        fs::write(&path, "watcher:\n  gateway_version: test\n").unwrap();
        Config::load_config(path.to_str().unwrap()).unwrap()
    }

    #[test]
    fn test_merge_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);

        // La valeur du fichier remplace le défaut
        assert_eq!(
            config.get_value(&["watcher", "gateway_version"]).unwrap(),
            Value::String("test".to_string())
        );
        // Les défauts non surchargés restent présents
        assert_eq!(
            config.get_value(&["watcher", "poll_interval_ms"]).unwrap(),
            Value::Number(2000.into())
        );
    }

    #[test]
    fn test_set_then_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);

        config
            .set_value(&["watcher", "debug"], Value::Bool(true))
            .unwrap();
        assert_eq!(
            config.get_value(&["watcher", "debug"]).unwrap(),
            Value::Bool(true)
        );

        // Relecture depuis le fichier sauvegardé
        let reloaded =
            Config::load_config(dir.path().join("config.yml").to_str().unwrap()).unwrap();
        assert_eq!(
            reloaded.get_value(&["watcher", "debug"]).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(&path, "Watcher:\n  Gateway_Version: mixed\n").unwrap();
        let config = Config::load_config(path.to_str().unwrap()).unwrap();

        assert_eq!(
            config.get_value(&["watcher", "GATEWAY_VERSION"]).unwrap(),
            Value::String("mixed".to_string())
        );
    }

    #[test]
    fn test_device_id_generated_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);

        let first = config.get_device_id().unwrap();
        assert!(!first.is_empty());
        assert_eq!(config.get_device_id().unwrap(), first);
    }

    #[test]
    fn test_device_token_required() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);

        assert!(config.get_device_token().is_err());
        config.set_device_token("secret").unwrap();
        assert_eq!(config.get_device_token().unwrap(), "secret");
    }
}
