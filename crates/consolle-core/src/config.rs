//! Immutable session configuration (spec.md section 3).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Selects which supervisor backend drives evaluation.
///
/// `embedded` and `auto` are legacy aliases accepted in the on-disk config
/// file and normalized to their canonical form at load time (spec.md
/// section 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    Pty,
    EmbedIrb,
    EmbedRails,
}

impl BackendKind {
    /// Parse a `mode` string from the config file, normalizing legacy
    /// aliases (`embedded` -> `embed-rails`, `auto` -> `pty`).
    pub fn parse_normalized(raw: &str) -> Option<Self> {
        match raw {
            "pty" | "auto" => Some(BackendKind::Pty),
            "embed-irb" => Some(BackendKind::EmbedIrb),
            "embed-rails" | "embedded" => Some(BackendKind::EmbedRails),
            _ => None,
        }
    }
}

impl Default for BackendKind {
    fn default() -> Self {
        BackendKind::Pty
    }
}

/// Session configuration, immutable after construction.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Root of the project the console runs inside.
    pub project_root: PathBuf,
    /// Environment name forwarded to the child as `RAILS_ENV`.
    pub environment: String,
    /// Shell command that launches the child runtime, e.g.
    /// `"bundle exec rails console"`.
    pub launch_command: String,
    /// Budget for observing the first prompt after spawn.
    pub initial_wait_secs: u64,
    /// Optional override for the Prompt Matcher's regular expression.
    pub custom_prompt_pattern: Option<String>,
    /// Which backend to use.
    pub backend: BackendKind,
    /// Whether the pre-exec health check (Ctrl-C probe) runs before eval.
    pub pre_sigint_enabled: bool,
}

impl SessionConfig {
    /// True when the launch command appears to reach a remote host (spec.md
    /// section 4.4.1's "Remote children" treatment).
    pub fn is_remote(&self) -> bool {
        const REMOTE_MARKERS: &[&str] = &["ssh", "docker", "kubectl", "cap ", "kamal"];
        let lower = self.launch_command.to_ascii_lowercase();
        REMOTE_MARKERS.iter().any(|marker| lower.contains(marker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_legacy_mode_aliases() {
        assert_eq!(BackendKind::parse_normalized("auto"), Some(BackendKind::Pty));
        assert_eq!(
            BackendKind::parse_normalized("embedded"),
            Some(BackendKind::EmbedRails)
        );
        assert_eq!(BackendKind::parse_normalized("bogus"), None);
    }

    fn base_config(cmd: &str) -> SessionConfig {
        SessionConfig {
            project_root: PathBuf::from("/tmp/project"),
            environment: "development".to_string(),
            launch_command: cmd.to_string(),
            initial_wait_secs: 15,
            custom_prompt_pattern: None,
            backend: BackendKind::Pty,
            pre_sigint_enabled: true,
        }
    }

    #[test]
    fn detects_remote_launch_commands() {
        assert!(base_config("ssh prod 'bin/rails console'").is_remote());
        assert!(base_config("docker exec -it web bin/rails console").is_remote());
        assert!(!base_config("bin/rails console").is_remote());
    }
}
