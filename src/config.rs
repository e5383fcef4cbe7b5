use crate::writer::CasePolicy;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_STATE_DIR: &str = ".ggen";
const HISTORY_DIR: &str = "history";
const SEQUENCER_STATE_FILE: &str = "sequencer.json";
const AGGREGATE_STATE_FILE: &str = "aggregates.json";

#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub workspace_root: PathBuf,
    /// Directory holding sequencer state, aggregate state and run history
    pub state_dir: PathBuf,
    pub history_dir: Option<PathBuf>,
    pub history_enabled: bool,
    pub case_policy: CasePolicy,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("."),
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            history_dir: None,
            history_enabled: true,
            case_policy: CasePolicy::default(),
        }
    }
}

impl ReconcileConfig {
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let GlobalOptions {
            config,
            workspace_root: cli_workspace_root,
            state_dir: cli_state_dir,
            history_dir: cli_history_dir,
            no_history,
            case_policy: cli_case_policy,
        } = args.global.clone();

        let file_config = if let Some(path) = config.as_ref() {
            load_config_file(path)?
        } else {
            PartialConfig::default()
        };

        let PartialConfig {
            workspace_root: file_workspace_root,
            state_dir: file_state_dir,
            history_dir: file_history_dir,
            history_enabled: file_history_enabled,
            case_policy: file_case_policy,
        } = file_config;

        let workspace_root = cli_workspace_root
            .or(file_workspace_root)
            .unwrap_or_else(|| PathBuf::from("."));

        let state_dir = cli_state_dir
            .or(file_state_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR));

        let history_enabled = if no_history {
            false
        } else {
            file_history_enabled.unwrap_or(true)
        };

        Ok(Self {
            workspace_root,
            state_dir,
            history_dir: cli_history_dir.or(file_history_dir),
            history_enabled,
            case_policy: cli_case_policy.or(file_case_policy).unwrap_or_default(),
        })
    }

    /// Fail fast on a workspace that cannot be generated into
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.workspace_root.exists(),
            "workspace root {:?} does not exist",
            self.workspace_root
        );
        anyhow::ensure!(
            self.workspace_root.is_dir(),
            "workspace root {:?} is not a directory",
            self.workspace_root
        );
        let state_dir = self.state_path();
        anyhow::ensure!(
            !state_dir.exists() || state_dir.is_dir(),
            "state directory {:?} is not a directory",
            state_dir
        );
        Ok(())
    }

    pub fn resolve_path<P: AsRef<Path>>(&self, relative: P) -> PathBuf {
        let relative = relative.as_ref();
        if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.workspace_root.join(relative)
        }
    }

    pub fn state_path(&self) -> PathBuf {
        self.resolve_path(&self.state_dir)
    }

    pub fn history_path(&self) -> PathBuf {
        match &self.history_dir {
            Some(dir) => self.resolve_path(dir),
            None => self.state_path().join(HISTORY_DIR),
        }
    }

    pub fn sequencer_state_path(&self) -> PathBuf {
        self.state_path().join(SEQUENCER_STATE_FILE)
    }

    pub fn aggregate_state_path(&self) -> PathBuf {
        self.state_path().join(AGGREGATE_STATE_FILE)
    }
}

// =============================================================================
// Command line
// =============================================================================

#[derive(Parser, Debug, Clone)]
#[command(
    name = "ggen-reconcile",
    about = "Write generated artifacts into a hand-maintained tree, with history and rollback",
    version
)]
pub struct CliArgs {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Default, Clone)]
pub struct GlobalOptions {
    #[arg(
        long,
        value_name = "FILE",
        help = "Path to a configuration file (YAML or JSON)",
        global = true
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "GGEN_RECONCILE_WORKSPACE",
        value_name = "DIR",
        help = "Root of the tree artifacts are written into",
        global = true
    )]
    pub workspace_root: Option<PathBuf>,

    #[arg(
        long,
        env = "GGEN_RECONCILE_STATE_DIR",
        value_name = "DIR",
        help = "State directory, relative to the workspace root",
        global = true
    )]
    pub state_dir: Option<PathBuf>,

    #[arg(
        long,
        env = "GGEN_RECONCILE_HISTORY_DIR",
        value_name = "DIR",
        help = "Run history directory (defaults to <state-dir>/history)",
        global = true
    )]
    pub history_dir: Option<PathBuf>,

    #[arg(
        long,
        env = "GGEN_RECONCILE_NO_HISTORY",
        help = "Do not record generation runs",
        global = true
    )]
    pub no_history: bool,

    #[arg(
        long,
        env = "GGEN_RECONCILE_CASE_POLICY",
        value_enum,
        value_name = "POLICY",
        help = "How to treat directories that differ only by case (rename or adopt)",
        global = true
    )]
    pub case_policy: Option<CasePolicy>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Apply a generation plan (JSON) to the workspace
    Apply {
        #[arg(value_name = "PLAN")]
        plan: PathBuf,
        #[arg(long, help = "Report what would be written without touching the tree")]
        dry_run: bool,
        #[arg(long, help = "Overwrite files that already exist")]
        force: bool,
        #[arg(long, value_name = "ID", help = "Group this run with others for rollback")]
        execution_id: Option<String>,
        #[arg(long, help = "Print the report as JSON")]
        json: bool,
    },
    /// Inspect recorded runs
    History {
        #[command(subcommand)]
        command: HistoryCommand,
    },
    /// Revert recorded runs (defaults to the latest execution group)
    Rollback {
        #[arg(long = "run", value_name = "RUN_ID")]
        runs: Vec<String>,
        #[arg(long, value_name = "ID", conflicts_with = "runs")]
        execution: Option<String>,
        #[arg(long)]
        dry_run: bool,
        #[arg(long, help = "Print the report as JSON")]
        json: bool,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum HistoryCommand {
    /// List runs, newest first
    List {
        #[arg(long)]
        json: bool,
    },
    /// Print one run's manifest
    Show {
        #[arg(value_name = "RUN_ID")]
        run_id: String,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PartialConfig {
    workspace_root: Option<PathBuf>,
    state_dir: Option<PathBuf>,
    history_dir: Option<PathBuf>,
    history_enabled: Option<bool>,
    case_policy: Option<CasePolicy>,
}

fn load_config_file(path: &Path) -> Result<PartialConfig> {
    if !path.exists() {
        anyhow::bail!("config file {:?} does not exist", path);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {:?}", path))?;
    let ext = path
        .extension()
        .and_then(|os| os.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let parsed = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse YAML config {:?}", path))?,
        "json" => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse JSON config {:?}", path))?,
        other => anyhow::bail!("unsupported config extension: {other}"),
    };
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["ggen-reconcile"];
        argv.extend_from_slice(extra);
        argv.extend_from_slice(&["history", "list"]);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults_derive_state_paths() {
        let config = ReconcileConfig::from_args(&args(&["--workspace-root", "/srv/app"])).unwrap();

        assert_eq!(config.state_path(), PathBuf::from("/srv/app/.ggen"));
        assert_eq!(config.history_path(), PathBuf::from("/srv/app/.ggen/history"));
        assert_eq!(
            config.sequencer_state_path(),
            PathBuf::from("/srv/app/.ggen/sequencer.json")
        );
        assert!(config.history_enabled);
        assert_eq!(config.case_policy, CasePolicy::Rename);
    }

    #[test]
    fn test_file_values_yield_to_cli() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("reconcile.yaml");
        fs::write(
            &path,
            "workspace_root: /from/file\nhistory_enabled: false\ncase_policy: adopt\nstate_dir: .state\n",
        )
        .unwrap();
        let path_arg = path.to_string_lossy().to_string();

        let config = ReconcileConfig::from_args(&args(&[
            "--config",
            &path_arg,
            "--workspace-root",
            "/from/cli",
        ]))
        .unwrap();

        assert_eq!(config.workspace_root, PathBuf::from("/from/cli"));
        assert_eq!(config.state_path(), PathBuf::from("/from/cli/.state"));
        assert!(!config.history_enabled);
        assert_eq!(config.case_policy, CasePolicy::Adopt);
    }

    #[test]
    fn test_unknown_config_extension_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("reconcile.toml");
        fs::write(&path, "x = 1").unwrap();
        assert!(load_config_file(&path).is_err());
    }

    #[test]
    fn test_validate_rejects_missing_workspace() {
        let config = ReconcileConfig {
            workspace_root: PathBuf::from("/definitely/not/here"),
            ..ReconcileConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
