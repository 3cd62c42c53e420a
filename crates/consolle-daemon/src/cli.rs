use clap::Parser;
use consolle_core::BackendKind;
use std::path::PathBuf;

use crate::config::ConfigOverrides;

/// Starts one consolle daemon for a single target. Daemonization
/// (fork/detach, PID-file management, log redirection) and the
/// multi-target session registry/discovery CLI are explicit Non-goals
/// (spec.md section 1); this binary runs the supervisor/broker/socket
/// core in the foreground for exactly one target.
#[derive(Debug, Parser)]
#[command(name = "consolle-daemon", version, about)]
pub struct Args {
    /// Project root the console runs inside. Defaults to the current
    /// working directory.
    #[arg(long)]
    pub project_root: Option<PathBuf>,

    /// Short name identifying this daemon's session within the project
    /// (spec.md Glossary, "Target").
    #[arg(long)]
    pub target: Option<String>,

    /// Environment name forwarded to the child as `RAILS_ENV`.
    #[arg(long)]
    pub environment: Option<String>,

    /// Shell command that launches the child runtime. Overrides both the
    /// default and the project's `.consolle.yml` `command` key.
    #[arg(long)]
    pub command: Option<String>,

    /// Override the Unix-socket path. Defaults to
    /// `<project_root>/tmp/cone/<target>.socket`.
    #[arg(long)]
    pub socket: Option<PathBuf>,

    /// Override the supervisor backend.
    #[arg(long, value_enum)]
    pub backend: Option<CliBackendKind>,

    /// Override the Prompt Matcher's regular expression.
    #[arg(long)]
    pub prompt_pattern: Option<String>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CliBackendKind {
    Pty,
    EmbedIrb,
    EmbedRails,
}

impl From<CliBackendKind> for BackendKind {
    fn from(value: CliBackendKind) -> Self {
        match value {
            CliBackendKind::Pty => BackendKind::Pty,
            CliBackendKind::EmbedIrb => BackendKind::EmbedIrb,
            CliBackendKind::EmbedRails => BackendKind::EmbedRails,
        }
    }
}

impl Args {
    pub fn project_root(&self) -> std::io::Result<PathBuf> {
        match &self.project_root {
            Some(path) => Ok(path.clone()),
            None => std::env::current_dir(),
        }
    }

    pub fn into_overrides(self) -> ConfigOverrides {
        ConfigOverrides {
            target: self.target,
            environment: self.environment,
            command: self.command,
            socket_path: self.socket,
            backend: self.backend.map(BackendKind::from),
            prompt_pattern: self.prompt_pattern,
            initial_wait_secs: None,
            pre_sigint_enabled: None,
        }
    }
}
