//! Sources of proxy addresses and user agents.

use crate::error::{Error, Result};
use crate::utils;

use parking_lot::Mutex;
use rand::Rng;
use std::path::{Path, PathBuf};

/// Supplies the initial list of proxy addresses.
pub trait AddressSource: Send + Sync {
    /// Load every address. Called once at startup.
    fn load(&self) -> Result<Vec<String>>;
}

/// Supplies user agents assigned to proxies.
pub trait AgentSource: Send + Sync {
    /// All known user agents.
    fn list(&self) -> Result<Vec<String>>;

    /// One user agent picked uniformly at random.
    fn random(&self) -> Result<String> {
        let agents = self.list()?;
        pick(&agents)
    }
}

fn pick(items: &[String]) -> Result<String> {
    if items.is_empty() {
        return Err(Error::NoUserAgents);
    }
    let idx = rand::rng().random_range(0..items.len());
    Ok(items[idx].clone())
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    std::fs::read_to_string(path)
        .map(|content| utils::parse_lines(&content))
        .map_err(|source| Error::Source {
            path: path.to_path_buf(),
            source,
        })
}

/// Reads `host:port` addresses from a file, one per line.
#[derive(Debug, Clone)]
pub struct FileAddressSource {
    path: PathBuf,
}

impl FileAddressSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl AddressSource for FileAddressSource {
    fn load(&self) -> Result<Vec<String>> {
        read_lines(&self.path)
    }
}

/// Reads user agents from a file, one per line. The file is read once and cached.
#[derive(Debug)]
pub struct FileAgentSource {
    path: PathBuf,
    items: Mutex<Option<Vec<String>>>,
}

impl FileAgentSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            items: Mutex::new(None),
        }
    }
}

impl AgentSource for FileAgentSource {
    fn list(&self) -> Result<Vec<String>> {
        let mut items = self.items.lock();
        if let Some(cached) = items.as_ref() {
            return Ok(cached.clone());
        }

        let loaded = read_lines(&self.path)?;
        *items = Some(loaded.clone());
        Ok(loaded)
    }

    fn random(&self) -> Result<String> {
        let mut items = self.items.lock();
        if items.is_none() {
            *items = Some(read_lines(&self.path)?);
        }
        pick(items.as_deref().unwrap_or_default())
    }
}

/// In-memory addresses and user agents.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    items: Vec<String>,
}

impl StaticSource {
    pub fn new(items: Vec<impl Into<String>>) -> Self {
        Self {
            items: items.into_iter().map(Into::into).collect(),
        }
    }
}

impl AddressSource for StaticSource {
    fn load(&self) -> Result<Vec<String>> {
        Ok(self.items.clone())
    }
}

impl AgentSource for StaticSource {
    fn list(&self) -> Result<Vec<String>> {
        Ok(self.items.clone())
    }

    fn random(&self) -> Result<String> {
        pick(&self.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "fingerprint-harvester-{}-{}",
            std::process::id(),
            name
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn file_addresses_are_loaded() {
        let path = temp_file("proxies.txt", "10.0.0.1:8080\n\n10.0.0.2:8080\n");
        let source = FileAddressSource::new(&path);
        assert_eq!(source.load().unwrap(), vec!["10.0.0.1:8080", "10.0.0.2:8080"]);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn missing_file_is_an_error() {
        let source = FileAddressSource::new("/definitely/not/here/proxies.txt");
        assert!(matches!(source.load(), Err(Error::Source { .. })));
    }

    #[test]
    fn agents_are_cached_after_first_read() {
        let path = temp_file("ua.txt", "agent-a\nagent-b\n");
        let source = FileAgentSource::new(&path);
        assert_eq!(source.list().unwrap(), vec!["agent-a", "agent-b"]);

        std::fs::remove_file(&path).unwrap();
        assert_eq!(source.list().unwrap().len(), 2);
        let agent = source.random().unwrap();
        assert!(agent == "agent-a" || agent == "agent-b");
    }

    #[test]
    fn empty_agent_list_cannot_pick() {
        let path = temp_file("empty-ua.txt", "\n# nothing\n");
        let source = FileAgentSource::new(&path);
        assert!(matches!(source.random(), Err(Error::NoUserAgents)));
        std::fs::remove_file(path).unwrap();

        let empty = StaticSource::default();
        assert!(matches!(AgentSource::random(&empty), Err(Error::NoUserAgents)));
    }
}
