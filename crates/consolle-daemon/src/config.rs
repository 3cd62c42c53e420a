//! Resolves the fully-merged [`DaemonConfig`] a daemon process runs with:
//! CLI overrides, the optional project YAML file (spec.md section 6), and
//! built-in defaults, in that order of precedence.

use consolle_core::{BackendKind, DEFAULT_INITIAL_WAIT_SECS, SessionConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Recognized keys of the optional project-root YAML config file (spec.md
/// section 6). Unknown keys are ignored rather than rejected, so older
/// daemons keep working against newer config files.
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    prompt_pattern: Option<String>,
    mode: Option<String>,
    command: Option<String>,
}

impl ConfigFile {
    /// Loads `<project_root>/.consolle.yml` if present. A missing file is
    /// not an error — the daemon falls back to CLI args and defaults.
    fn load(project_root: &Path) -> anyhow::Result<Self> {
        let path = project_root.join(".consolle.yml");
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                serde_norway::from_str(&contents).map_err(|e| {
                    anyhow::anyhow!("failed to parse {}: {e}", path.display())
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(anyhow::anyhow!("failed to read {}: {e}", path.display())),
        }
    }
}

/// Fully-resolved configuration a daemon process runs with (SPEC_FULL.md
/// section 3 addition): the `SessionConfig` the Supervisor needs, plus the
/// target name and socket path that only the daemon process itself cares
/// about.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub target: String,
    pub socket_path: PathBuf,
    pub session: SessionConfig,
}

/// CLI-supplied overrides, all optional; `None` defers to the config file
/// or built-in default.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub target: Option<String>,
    pub environment: Option<String>,
    pub command: Option<String>,
    pub socket_path: Option<PathBuf>,
    pub backend: Option<BackendKind>,
    pub prompt_pattern: Option<String>,
    pub initial_wait_secs: Option<u64>,
    pub pre_sigint_enabled: Option<bool>,
}

impl DaemonConfig {
    pub fn resolve(project_root: &Path, overrides: ConfigOverrides) -> anyhow::Result<Self> {
        let file = ConfigFile::load(project_root)?;

        let target = overrides.target.unwrap_or_else(|| "default".to_string());
        let environment = overrides.environment.unwrap_or_else(|| "development".to_string());
        let launch_command = overrides
            .command
            .or(file.command)
            .unwrap_or_else(|| "bundle exec rails console".to_string());

        let backend = overrides
            .backend
            .or_else(|| file.mode.as_deref().and_then(BackendKind::parse_normalized))
            .unwrap_or_default();

        let custom_prompt_pattern = overrides.prompt_pattern.or(file.prompt_pattern);

        let socket_path = overrides
            .socket_path
            .unwrap_or_else(|| default_socket_path(project_root, &target));

        let session = SessionConfig {
            project_root: project_root.to_path_buf(),
            environment,
            launch_command,
            initial_wait_secs: overrides
                .initial_wait_secs
                .unwrap_or(DEFAULT_INITIAL_WAIT_SECS),
            custom_prompt_pattern,
            backend,
            pre_sigint_enabled: overrides.pre_sigint_enabled.unwrap_or(true),
        };

        Ok(Self {
            target,
            socket_path,
            session,
        })
    }
}

/// Default socket location, `<project_root>/tmp/cone/<target>.socket`
/// (spec.md section 6, "Filesystem layout").
pub fn default_socket_path(project_root: &Path, target: &str) -> PathBuf {
    project_root
        .join("tmp")
        .join("cone")
        .join(format!("{target}.socket"))
}

pub fn default_pid_path(project_root: &Path, target: &str) -> PathBuf {
    project_root
        .join("tmp")
        .join("cone")
        .join(format!("{target}.pid"))
}

pub fn default_log_path(project_root: &Path, target: &str) -> PathBuf {
    project_root
        .join("tmp")
        .join("cone")
        .join(format!("{target}.log"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_apply_when_no_config_file_or_overrides() {
        let dir = tempdir().unwrap();
        let config = DaemonConfig::resolve(dir.path(), ConfigOverrides::default()).unwrap();
        assert_eq!(config.target, "default");
        assert_eq!(config.session.environment, "development");
        assert_eq!(config.session.backend, BackendKind::Pty);
        assert_eq!(
            config.socket_path,
            dir.path().join("tmp").join("cone").join("default.socket")
        );
    }

    #[test]
    fn yaml_config_file_supplies_command_and_mode() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(".consolle.yml"),
            "command: \"bin/rails console\"\nmode: embed-irb\nprompt_pattern: \"^CUSTOM>\\\\s*$\"\n",
        )
        .unwrap();

        let config = DaemonConfig::resolve(dir.path(), ConfigOverrides::default()).unwrap();
        assert_eq!(config.session.launch_command, "bin/rails console");
        assert_eq!(config.session.backend, BackendKind::EmbedIrb);
        assert_eq!(
            config.session.custom_prompt_pattern.as_deref(),
            Some("^CUSTOM>\\s*$")
        );
    }

    #[test]
    fn legacy_mode_alias_normalizes_via_config_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(".consolle.yml"), "mode: embedded\n").unwrap();
        let config = DaemonConfig::resolve(dir.path(), ConfigOverrides::default()).unwrap();
        assert_eq!(config.session.backend, BackendKind::EmbedRails);
    }

    #[test]
    fn cli_overrides_take_precedence_over_config_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(".consolle.yml"), "command: \"from-file\"\n").unwrap();

        let overrides = ConfigOverrides {
            command: Some("from-cli".to_string()),
            ..Default::default()
        };
        let config = DaemonConfig::resolve(dir.path(), overrides).unwrap();
        assert_eq!(config.session.launch_command, "from-cli");
    }

    #[test]
    fn missing_config_file_is_not_an_error() {
        let dir = tempdir().unwrap();
        let result = DaemonConfig::resolve(dir.path(), ConfigOverrides::default());
        assert!(result.is_ok());
    }
}
