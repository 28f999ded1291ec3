//! Named browser profiles: isolated user-data directories with assigned
//! debugging ports, persisted across restarts.
//!
//! Layout: one directory per profile under `<root>/profiles/<name>/`
//! (the browser's user-data dir), and a small registry at
//! `<root>/config.json` mapping names to ports and recording the default.
//! The root defaults to `~/.webtap`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, WebtapError};

pub const BASE_PORT: u16 = 9222;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Registry {
    #[serde(default)]
    default: Option<String>,
    #[serde(default)]
    profiles: BTreeMap<String, ProfileEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProfileEntry {
    port: u16,
}

/// A resolved profile.
#[derive(Debug, Clone)]
pub struct Profile {
    pub name: String,
    pub port: u16,
    pub path: PathBuf,
    pub is_default: bool,
}

/// The on-disk profile registry.
pub struct ProfileStore {
    root: PathBuf,
}

impl ProfileStore {
    /// Store at the conventional location, `~/.webtap`.
    pub fn open_default() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| WebtapError::Profile("cannot determine home directory".to_string()))?;
        Ok(Self::at(home.join(".webtap")))
    }

    /// Store rooted at an explicit directory (tests use a temp dir).
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn profiles_dir(&self) -> PathBuf {
        self.root.join("profiles")
    }

    fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    fn load(&self) -> Registry {
        std::fs::read_to_string(self.config_file())
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    fn save(&self, registry: &Registry) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        let body = serde_json::to_string_pretty(registry)
            .map_err(|e| WebtapError::Profile(format!("cannot serialize registry: {e}")))?;
        std::fs::write(self.config_file(), body + "\n")?;
        Ok(())
    }

    /// All known profiles, sorted by name.
    pub fn list(&self) -> Vec<Profile> {
        let registry = self.load();
        registry
            .profiles
            .iter()
            .map(|(name, entry)| Profile {
                name: name.clone(),
                port: entry.port,
                path: self.profiles_dir().join(name),
                is_default: registry.default.as_deref() == Some(name),
            })
            .collect()
    }

    /// Resolve a profile by name, or the default profile when `None`.
    pub fn get(&self, name: Option<&str>) -> Result<Profile> {
        let registry = self.load();
        let name = name
            .map(str::to_string)
            .or_else(|| registry.default.clone())
            .unwrap_or_else(|| "default".to_string());

        match registry.profiles.get(&name) {
            Some(entry) => Ok(Profile {
                port: entry.port,
                path: self.profiles_dir().join(&name),
                is_default: registry.default.as_deref() == Some(name.as_str()),
                name,
            }),
            None => Err(WebtapError::Profile(format!(
                "profile '{name}' not found. Available: {}",
                names_or_none(&registry)
            ))),
        }
    }

    /// Resolve a profile, creating it when missing. The convenience path
    /// for `launch <name>`.
    pub fn get_or_create(&self, name: Option<&str>) -> Result<Profile> {
        match self.get(name) {
            Ok(p) => Ok(p),
            Err(_) => self.create(name.unwrap_or("default"), None),
        }
    }

    /// Create a profile. The port is auto-assigned (next free from
    /// [`BASE_PORT`]) unless given.
    pub fn create(&self, name: &str, port: Option<u16>) -> Result<Profile> {
        let name = sanitize_name(name);
        if name.is_empty() {
            return Err(WebtapError::Profile("profile name cannot be empty".to_string()));
        }

        let mut registry = self.load();
        if registry.profiles.contains_key(&name) {
            return Err(WebtapError::Profile(format!(
                "profile '{name}' already exists"
            )));
        }

        let port = port.unwrap_or_else(|| next_port(&registry));
        registry
            .profiles
            .insert(name.clone(), ProfileEntry { port });
        // First profile becomes the default.
        if registry.default.is_none() {
            registry.default = Some(name.clone());
        }
        self.save(&registry)?;

        let path = self.profiles_dir().join(&name);
        std::fs::create_dir_all(&path)?;

        Ok(Profile {
            is_default: registry.default.as_deref() == Some(name.as_str()),
            name,
            port,
            path,
        })
    }

    /// Mark a profile as the default.
    pub fn set_default(&self, name: &str) -> Result<()> {
        let mut registry = self.load();
        if !registry.profiles.contains_key(name) {
            return Err(WebtapError::Profile(format!(
                "profile '{name}' not found. Available: {}",
                names_or_none(&registry)
            )));
        }
        registry.default = Some(name.to_string());
        self.save(&registry)
    }

    /// Delete a profile: registry entry and user-data directory both.
    pub fn delete(&self, name: &str) -> Result<()> {
        let mut registry = self.load();
        if registry.profiles.remove(name).is_none() {
            return Err(WebtapError::Profile(format!("profile '{name}' not found")));
        }
        if registry.default.as_deref() == Some(name) {
            registry.default = registry.profiles.keys().next().cloned();
        }
        self.save(&registry)?;

        let dir = self.profiles_dir().join(name);
        if dir.exists() {
            std::fs::remove_dir_all(dir)?;
        }
        Ok(())
    }
}

fn names_or_none(registry: &Registry) -> String {
    if registry.profiles.is_empty() {
        "(none)".to_string()
    } else {
        registry
            .profiles
            .keys()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Filesystem-safe profile names: lowercase alphanumerics, hyphens and
/// underscores; everything else becomes a hyphen.
fn sanitize_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

fn next_port(registry: &Registry) -> u16 {
    let used: Vec<u16> = registry.profiles.values().map(|e| e.port).collect();
    let mut port = BASE_PORT;
    while used.contains(&port) {
        port += 1;
    }
    port
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> ProfileStore {
        let unique = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock before epoch")
            .as_nanos();
        ProfileStore::at(std::env::temp_dir().join(format!("webtap-profiles-{unique}")))
    }

    #[test]
    fn create_assigns_sequential_ports_and_first_default() {
        let store = temp_store();
        let a = store.create("work", None).unwrap();
        let b = store.create("personal", None).unwrap();
        assert_eq!(a.port, BASE_PORT);
        assert_eq!(b.port, BASE_PORT + 1);
        assert!(a.is_default);
        assert!(!b.is_default);
        assert!(a.path.is_dir());
    }

    #[test]
    fn create_rejects_duplicates() {
        let store = temp_store();
        store.create("work", None).unwrap();
        assert!(store.create("work", None).is_err());
    }

    #[test]
    fn get_default_falls_back_by_name() {
        let store = temp_store();
        store.create("main", None).unwrap();
        let p = store.get(None).unwrap();
        assert_eq!(p.name, "main");
    }

    #[test]
    fn get_unknown_profile_errors() {
        let store = temp_store();
        let err = store.get(Some("missing")).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn delete_reassigns_default() {
        let store = temp_store();
        store.create("a", None).unwrap();
        store.create("b", None).unwrap();
        store.delete("a").unwrap();
        let remaining = store.list();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].is_default);
        assert_eq!(remaining[0].name, "b");
    }

    #[test]
    fn set_default_switches() {
        let store = temp_store();
        store.create("a", None).unwrap();
        store.create("b", None).unwrap();
        store.set_default("b").unwrap();
        assert_eq!(store.get(None).unwrap().name, "b");
    }

    #[test]
    fn names_are_sanitized() {
        assert_eq!(sanitize_name("My Profile!"), "my-profile-");
        assert_eq!(sanitize_name("  Work_2  "), "work_2");
    }

    #[test]
    fn get_or_create_creates_missing() {
        let store = temp_store();
        let p = store.get_or_create(None).unwrap();
        assert_eq!(p.name, "default");
        assert_eq!(p.port, BASE_PORT);
    }
}
