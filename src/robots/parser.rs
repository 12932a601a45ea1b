//! robots.txt parsing
//!
//! Rules are grouped per user-agent. Within a group any matching `Allow`
//! wins over every `Disallow`, independent of rule order or length.

use regex::Regex;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
struct Group {
    /// Lowercased agent tokens
    agents: Vec<String>,
    allows: Vec<Regex>,
    disallows: Vec<Regex>,
    crawl_delay: Option<Duration>,
}

impl Group {
    fn has_rules(&self) -> bool {
        !self.allows.is_empty() || !self.disallows.is_empty() || self.crawl_delay.is_some()
    }
}

/// Parsed robots.txt rules for one domain
#[derive(Debug, Clone, Default)]
pub struct RobotsRuleSet {
    groups: Vec<Group>,
}

impl RobotsRuleSet {
    /// A rule set that allows everything
    ///
    /// Cached when robots.txt is missing or cannot be fetched.
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn from_content(content: &str) -> Self {
        let mut groups: Vec<Group> = Vec::new();
        let mut current = Group::default();
        // True while consecutive User-agent lines are being collected
        let mut collecting_agents = false;

        for line in content.lines() {
            let line = match line.find('#') {
                Some(idx) => &line[..idx],
                None => line,
            };
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if !collecting_agents && (!current.agents.is_empty() || current.has_rules()) {
                        groups.push(std::mem::take(&mut current));
                    }
                    current.agents.push(value.to_ascii_lowercase());
                    collecting_agents = true;
                }
                "allow" | "disallow" => {
                    collecting_agents = false;
                    if value.is_empty() {
                        continue;
                    }
                    let Some(pattern) = compile_pattern(value) else {
                        tracing::debug!("Skipping unparsable robots.txt pattern '{}'", value);
                        continue;
                    };
                    if key == "allow" {
                        current.allows.push(pattern);
                    } else {
                        current.disallows.push(pattern);
                    }
                }
                "crawl-delay" => {
                    collecting_agents = false;
                    if let Some(delay) = value
                        .parse::<f64>()
                        .ok()
                        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                    {
                        current.crawl_delay = Some(delay);
                    }
                }
                _ => {
                    collecting_agents = false;
                }
            }
        }

        if !current.agents.is_empty() {
            groups.push(current);
        }

        // Rules before any User-agent line belong to no group
        groups.retain(|g| !g.agents.is_empty());

        Self { groups }
    }

    /// Checks if `path` (path plus optional query) may be fetched by `user_agent`
    ///
    /// The agent's own group is used when present, otherwise the `*` group.
    pub fn is_allowed(&self, path: &str, user_agent: &str) -> bool {
        let groups = self.groups_for(user_agent);
        if groups.iter().any(|g| g.allows.iter().any(|p| p.is_match(path))) {
            return true;
        }
        !groups
            .iter()
            .any(|g| g.disallows.iter().any(|p| p.is_match(path)))
    }

    /// The Crawl-delay that applies to `user_agent`, if any
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        self.groups_for(user_agent)
            .iter()
            .find_map(|g| g.crawl_delay)
    }

    fn groups_for(&self, user_agent: &str) -> Vec<&Group> {
        let token = agent_token(user_agent);
        let exact: Vec<&Group> = self
            .groups
            .iter()
            .filter(|g| g.agents.iter().any(|a| *a == token))
            .collect();
        if !exact.is_empty() {
            return exact;
        }
        self.groups
            .iter()
            .filter(|g| g.agents.iter().any(|a| a == "*"))
            .collect()
    }
}

/// Product token of a user agent: `LanternCrawl/0.1 (+...)` becomes `lanterncrawl`
fn agent_token(user_agent: &str) -> String {
    user_agent
        .split(|c: char| c == '/' || c.is_whitespace())
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Compiles a robots.txt path pattern into an anchored regex
fn compile_pattern(pattern: &str) -> Option<Regex> {
    let (body, anchored_end) = match pattern.strip_suffix('$') {
        Some(body) => (body, true),
        None => (pattern, false),
    };

    let mut regex = String::with_capacity(body.len() + 8);
    regex.push('^');
    for (i, literal) in body.split('*').enumerate() {
        if i > 0 {
            regex.push_str(".*");
        }
        regex.push_str(&regex::escape(literal));
    }
    if anchored_end {
        regex.push('$');
    }

    Regex::new(&regex).ok()
}
