//! User-Agent rotation

use crate::config::UserAgentConfig;
use crate::Result;
use rand::seq::SliceRandom;
use reqwest::header::HeaderValue;
use std::path::Path;

/// Pool of User-Agent strings, one drawn at random per request
///
/// An empty pool means every request carries the crawler's own
/// `Name/Version` agent set on the HTTP client.
#[derive(Debug, Clone, Default)]
pub struct UserAgentPool {
    agents: Vec<String>,
}

impl UserAgentPool {
    pub fn new(agents: impl IntoIterator<Item = String>) -> Self {
        let mut pool = Self::default();
        for agent in agents {
            pool.add(agent);
        }
        pool
    }

    /// Builds the pool from the inline `agents` and the optional `agents-file`
    ///
    /// # Errors
    ///
    /// * `LanternError::Io` - the agents file cannot be read
    pub fn from_config(config: &UserAgentConfig) -> Result<Self> {
        let mut pool = Self::new(config.agents.iter().cloned());
        if let Some(file) = &config.agents_file {
            for agent in load_agent_list(Path::new(file))? {
                pool.add(agent);
            }
            tracing::info!("Loaded user agents from {}", file);
        }
        Ok(pool)
    }

    fn add(&mut self, agent: String) {
        let agent = agent.trim().to_string();
        if agent.is_empty() || self.agents.contains(&agent) {
            return;
        }
        if HeaderValue::from_str(&agent).is_err() {
            tracing::warn!("Ignoring user agent that is not a valid header value: {:?}", agent);
            return;
        }
        self.agents.push(agent);
    }

    /// Draws an agent for the next request, `None` when the pool is empty
    pub fn pick(&self) -> Option<&str> {
        self.agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

/// Reads one agent per line, skipping blank lines and `#` comments
fn load_agent_list(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}
