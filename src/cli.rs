use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

mod terminal;

use anyhow::Context;
use clap::ArgAction;
use taintalyzing::{
    Config,
    report::{Format, Report},
    scan::{Scan, ScanOptions, analyze_files},
};
use terminal::Colorize;
use tracing::instrument;

/// Exit code of `--check` when taints were found.
const TAINTS_FOUND: u8 = 2;

/// Find user controlled data reaching dangerous calls in C, PHP and Python
/// code.
#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct Cli {
    /// File or directory to analyse
    path: PathBuf,

    /// Sanitizers nested deeper than this are not trusted
    #[arg(short, long, value_name = "N")]
    indirection: Option<usize>,

    /// Report methods with at least this cyclomatic complexity
    #[arg(short, long, value_name = "N")]
    complexity: Option<usize>,

    /// Module used when the filetype cannot be detected
    #[arg(short, long, value_name = "MODULE")]
    fallback: Option<String>,

    /// Analyse every method as a single execution path
    #[arg(short, long)]
    lazy: bool,

    /// Write the report to FILE; the extension picks the format
    /// (.txt, .md, .html or .json)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Skip paths matching these regular expressions
    #[arg(short = 'x', long, value_name = "REGEX", num_args = 1..)]
    exclude: Vec<String>,

    /// Only log errors and skip the summary
    #[arg(short, long, conflicts_with = "verbose")]
    silent: bool,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Load rules from DIR/<module>/{sources,sinks} instead of the built-in
    /// rules
    #[arg(long, value_name = "DIR")]
    rules: Option<PathBuf>,

    /// Configuration file [default: taintalyzing.toml, if present]
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Save the effective configuration to FILE and exit
    #[arg(long, value_name = "FILE")]
    write_config: Option<PathBuf>,

    /// Exit with status 2 when taints are found
    #[arg(long)]
    check: bool,
}

impl Cli {
    /// Scans the path, writes the report and returns the exit status.
    pub fn run(self) -> anyhow::Result<ExitCode> {
        Self::setup_logging(self.silent, self.verbose);

        let config = self.config()?;
        if let Some(path) = &self.write_config {
            config
                .save(path)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("{}", format!("Configuration written to {}.", path.display()).success());
            return Ok(ExitCode::SUCCESS);
        }
        if let Some(output) = &self.output {
            Format::from_path(output)?;
        }

        let mut options = ScanOptions::from(&config);
        options.rules.clone_from(&self.rules);
        let scan = self.scan(&options)?;

        let report = Report::new(&scan.analyses, config.complexity(), config.indirection());
        match &self.output {
            Some(path) => {
                report.write_to(path)?;
            }
            None => print!("{}", report.render(Format::Plaintext)?),
        }

        if !self.silent {
            eprintln!("{}", summary(&scan, &report, self.output.as_deref()));
        }

        if self.check && report.taint_count() > 0 {
            return Ok(ExitCode::from(TAINTS_FOUND));
        }
        Ok(ExitCode::SUCCESS)
    }

    /// The configuration file with the command line applied on top.
    fn config(&self) -> anyhow::Result<Config> {
        let mut config = Config::discover(self.config.as_deref())?;
        if let Some(indirection) = self.indirection {
            config.set_indirection(indirection)?;
        }
        if let Some(complexity) = self.complexity {
            config.set_complexity(complexity)?;
        }
        if self.fallback.is_some() {
            config.fallback.clone_from(&self.fallback);
        }
        config.lazy |= self.lazy;
        config.exclude.extend(self.exclude.iter().cloned());
        Ok(config)
    }

    #[instrument(skip(self, options), fields(path = %self.path.display()))]
    fn scan(&self, options: &ScanOptions) -> anyhow::Result<Scan> {
        let scan = analyze_files(&self.path, options)
            .with_context(|| format!("failed to analyse {}", self.path.display()))?;
        if scan.analyses.is_empty() {
            tracing::warn!("Nothing to analyse in {}.", self.path.display());
        }
        Ok(scan)
    }

    fn setup_logging(silent: bool, verbosity: u8) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let level = match (silent, verbosity) {
            (true, _) => tracing::Level::ERROR,
            (false, 0) => tracing::Level::WARN,
            (false, 1) => tracing::Level::INFO,
            (false, 2) => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        };

        let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_names(false)
            .with_line_number(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

fn summary(scan: &Scan, report: &Report, output: Option<&Path>) -> String {
    let taints = report.taint_count();
    let mut line = format!("Analysed {} files: ", scan.analyses.len());
    line.push_str(&if taints == 0 {
        "no taints".success()
    } else {
        format!("{taints} taints").error()
    });
    line.push_str(", ");
    let sinks = format!("{} sinks without user input", report.sink_count());
    line.push_str(&if report.sink_count() == 0 {
        sinks.success()
    } else {
        sinks.warning()
    });
    line.push('.');
    if !scan.skipped.is_empty() {
        line.push_str(&format!(" {} files skipped.", scan.skipped.len()).dim());
    }
    if let Some(output) = output {
        line.push_str(&format!(" Report written to {}.", output.display()).dim());
    }
    line
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn flags_override_the_config_file() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("taintalyzing.toml");
        std::fs::write(&file, "_version = \"1\"\ncomplexity = 3\nexclude = [\"vendor\"]\n").unwrap();

        let cli = Cli::try_parse_from([
            "taintalyzing",
            "src",
            "--config",
            file.to_str().unwrap(),
            "-i",
            "2",
            "-l",
            "-x",
            "tests",
            "build",
        ])
        .unwrap();
        let config = cli.config().unwrap();

        assert_eq!(config.indirection(), 2);
        assert_eq!(config.complexity(), 3);
        assert!(config.lazy);
        assert_eq!(config.exclude, ["vendor", "tests", "build"]);
    }

    #[test]
    fn zero_limits_are_rejected() {
        let cli = Cli::try_parse_from(["taintalyzing", ".", "-c", "0"]).unwrap();
        assert!(cli.config().is_err());
    }

    #[test]
    fn silent_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["taintalyzing", ".", "-s", "-v"]).is_err());
        let cli = Cli::try_parse_from(["taintalyzing", ".", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }
}
