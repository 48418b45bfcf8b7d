use std::collections::HashSet;

use anyhow::Result;

/// Fixed set of sender identifiers (Telegram usernames) allowed to use the bridge.
#[derive(Debug, Clone)]
pub struct AllowList {
    users: HashSet<String>,
}

impl AllowList {
    /// Build from a comma-separated list. Entries are trimmed and blank
    /// entries dropped; a list with no usable entry is rejected.
    pub fn parse(raw: &str) -> Result<Self> {
        let users: HashSet<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::to_string)
            .collect();

        if users.is_empty() {
            anyhow::bail!("No users in the white list");
        }

        Ok(Self { users })
    }

    /// Exact, case-sensitive membership check.
    pub fn is_authorized(&self, identifier: &str) -> bool {
        self.users.contains(identifier)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Entries in sorted order, for logging.
    pub fn sorted(&self) -> Vec<&str> {
        let mut users: Vec<&str> = self.users.iter().map(String::as_str).collect();
        users.sort_unstable();
        users
    }
}
