// Artifact key scheme for one comparison run

use std::fmt;

/// Which image of a region an artifact holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactRole {
    Live,
    Test,
    Diff,
}

impl ArtifactRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactRole::Live => "live",
            ArtifactRole::Test => "test",
            ArtifactRole::Diff => "diff",
        }
    }
}

impl fmt::Display for ArtifactRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key factory sharing one timestamp across a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunKeys {
    timestamp: String,
}

impl RunKeys {
    /// Keys stamped with the current time in epoch milliseconds
    pub fn now() -> Self {
        Self::with_timestamp(chrono::Utc::now().timestamp_millis().to_string())
    }

    pub fn with_timestamp(timestamp: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
        }
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// `regions/{ts}-{name}-{live|test}.png` or `diffs/{ts}-{name}-diff.png`
    pub fn region(&self, name: &str, role: ArtifactRole) -> String {
        let category = match role {
            ArtifactRole::Diff => "diffs",
            ArtifactRole::Live | ArtifactRole::Test => "regions",
        };
        format!(
            "{}/{}-{}-{}.png",
            category,
            self.timestamp,
            sanitize_name(name),
            role
        )
    }

    /// `screenshots/{ts}-{label}.png`
    pub fn page(&self, label: &str) -> String {
        format!("screenshots/{}-{}.png", self.timestamp, sanitize_name(label))
    }
}

/// Sanitize a name for use in keys and filenames
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_keys() {
        let keys = RunKeys::with_timestamp("1700000000000");
        assert_eq!(
            keys.region("footer", ArtifactRole::Live),
            "regions/1700000000000-footer-live.png"
        );
        assert_eq!(
            keys.region("footer", ArtifactRole::Test),
            "regions/1700000000000-footer-test.png"
        );
        assert_eq!(
            keys.region("footer", ArtifactRole::Diff),
            "diffs/1700000000000-footer-diff.png"
        );
        assert_eq!(keys.page("live"), "screenshots/1700000000000-live.png");
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("hello world"), "hello_world");
        assert_eq!(sanitize_name("../etc"), "___etc");
        assert_eq!(sanitize_name("quick-links_2"), "quick-links_2");
    }

    #[test]
    fn test_now_is_numeric() {
        let keys = RunKeys::now();
        assert!(keys.timestamp().chars().all(|c| c.is_ascii_digit()));
    }
}
