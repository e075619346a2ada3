use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(about, long_about = None)]
pub struct ScenarioCli {
    /// Base URL of the service under test. Request paths are joined onto this.
    #[clap(long, env = "BASE_URL", default_value = "http://localhost:8000")]
    pub base_url: String,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by
    /// anyone and is just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,

    /// Append a JSON summary of the run to this file, one line per run.
    #[clap(long)]
    pub summary_file: Option<PathBuf>,

    /// Identifier for this run in the summary. A random one is chosen if not set.
    #[clap(long)]
    pub run_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_defaults_to_localhost() {
        // Only valid while BASE_URL is not exported in the test environment.
        if std::env::var("BASE_URL").is_ok() {
            return;
        }

        let cli = ScenarioCli::parse_from(["scenario"]);
        assert_eq!("http://localhost:8000", cli.base_url);
        assert!(!cli.no_progress);
        assert!(cli.summary_file.is_none());
    }

    #[test]
    fn flags_are_parsed() {
        let cli = ScenarioCli::parse_from([
            "scenario",
            "--base-url",
            "http://10.0.0.5:8080",
            "--no-progress",
            "--summary-file",
            "runs.jsonl",
            "--run-id",
            "nightly",
        ]);

        assert_eq!("http://10.0.0.5:8080", cli.base_url);
        assert!(cli.no_progress);
        assert_eq!(Some(PathBuf::from("runs.jsonl")), cli.summary_file);
        assert_eq!(Some("nightly".to_string()), cli.run_id);
    }
}
