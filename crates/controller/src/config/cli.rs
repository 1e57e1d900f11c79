use std::path::PathBuf;

use clap::Parser;
use utils::version;

/// Reconciles TrackPod, PipelineRun and TaskRun resources against the pods they own.
#[derive(Parser, Debug, Clone)]
#[command(about, long_about, version = &**version::VERSION)]
pub struct Cli {
    #[arg(
        long,
        env = "KUBECONFIG",
        value_hint = clap::ValueHint::FilePath,
        help = "Path to kubeconfig file (defaults to ~/.kube/config, then in-cluster config)"
    )]
    pub kubeconfig: Option<PathBuf>,

    #[arg(
        long,
        help = "Kubernetes namespace to watch (empty for all namespaces)"
    )]
    pub namespace: Option<String>,

    #[arg(
        long,
        default_value_t = 1,
        value_parser = clap::value_parser!(u16).range(1..),
        help = "Concurrent reconcile workers per controller"
    )]
    pub workers: u16,

    #[arg(long, help = "Do not run the TrackPod controller")]
    pub disable_trackpod: bool,

    #[arg(long, help = "Do not run the PipelineRun controller")]
    pub disable_pipelinerun: bool,

    #[arg(
        long,
        env = utils::logging::LOG_PATH_ENV_VAR,
        value_hint = clap::ValueHint::DirPath,
        help = "Directory for rotated log files (stderr only when unset)"
    )]
    pub log_path: Option<PathBuf>,

    #[arg(long, help = "Print the custom resource definitions as YAML and exit")]
    pub crd: bool,
}

impl Cli {
    /// Explicit kubeconfig, or `~/.kube/config` when a home directory is known.
    pub fn kubeconfig_path(&self) -> Option<PathBuf> {
        self.kubeconfig.clone().or_else(|| {
            std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".kube").join("config"))
        })
    }
}
