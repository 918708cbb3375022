use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell as CompShell};
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::process::ExitCode;

use stampede::commands::run::{self, Overrides, RunOptions};
use stampede::commands::validate;
use stampede::config::DropPolicy;
use stampede::logging;

#[derive(Parser)]
#[command(name = "stampede")]
#[command(version)]
#[command(about = "Arrival-rate HTTP load generation with thresholds")]
#[command(long_about = None)]
struct Cli {
    /// Log filter for diagnostics on stderr (overrides RUST_LOG)
    #[arg(long = "log-level", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate registration load against {baseURL}/auth/register
    Run {
        /// YAML config file (defaults apply when omitted)
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,
        /// Base URL of the service under test
        #[arg(long = "base-url")]
        base_url: Option<String>,
        /// Iterations started per time unit
        #[arg(long = "rate")]
        rate: Option<u32>,
        /// Time unit the rate is expressed in (e.g. "1s", "1m")
        #[arg(long = "time-unit")]
        time_unit: Option<String>,
        /// Test duration (e.g. "30s", "5m")
        #[arg(long = "duration")]
        duration: Option<String>,
        /// Pre-allocated VUs
        #[arg(long = "vus")]
        vus: Option<u32>,
        /// Maximum VUs
        #[arg(long = "max-vus")]
        max_vus: Option<u32>,
        /// What to do with a tick when no VU is free (drop, queue)
        #[arg(long = "drop-policy")]
        drop_policy: Option<DropPolicy>,
        /// How long in-flight iterations may run after the last tick
        #[arg(long = "graceful-stop")]
        graceful_stop: Option<String>,
        /// Skip TLS certificate verification
        #[arg(long = "insecure")]
        insecure: bool,
        /// Write a k6-style JSON summary to this file
        #[arg(long = "summary-export")]
        summary_export: Option<PathBuf>,
        /// Stream one CSV row per request to this file
        #[arg(long = "out-csv")]
        out_csv: Option<PathBuf>,
        /// Report formats (comma-separated: json, html)
        #[arg(long = "report")]
        report: Option<String>,
        /// Directory for generated reports
        #[arg(long = "report-dir", default_value = "reports")]
        report_dir: PathBuf,
        /// No banner, header or progress bar
        #[arg(short = 'q', long = "quiet")]
        quiet: bool,
    },
    /// Validate a config file and print the run plan without sending traffic
    Validate {
        /// YAML config file
        #[arg(short = 'c', long = "config")]
        config: PathBuf,
    },
    /// Generate shell completions (internal)
    #[command(hide = true)]
    Completions {
        /// Shell: bash, zsh, fish
        shell: String,
    },
    /// Generate man page (internal)
    #[command(hide = true)]
    Man,
}

pub fn print_banner() {
    let banner = concat!(
        r#"
   ┌─┐┌┬┐┌─┐┌┬┐┌─┐┌─┐┌┬┐┌─┐
   └─┐ │ ├─┤│││├─┘├┤  ││├┤    stampede v"#,
        env!("CARGO_PKG_VERSION"),
        r#"
   └─┘ ┴ ┴ ┴┴ ┴┴  └─┘─┴┘└─┘   arrival-rate load generation
"#
    );

    if atty::is(atty::Stream::Stdout) {
        println!("{}", banner.cyan());
    } else {
        println!("stampede v{}", env!("CARGO_PKG_VERSION"));
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<u8> {
    match cli.command {
        Commands::Run {
            config,
            base_url,
            rate,
            time_unit,
            duration,
            vus,
            max_vus,
            drop_policy,
            graceful_stop,
            insecure,
            summary_export,
            out_csv,
            report,
            report_dir,
            quiet,
        } => {
            if !quiet {
                print_banner();
            }
            run::handle_run(RunOptions {
                config,
                overrides: Overrides {
                    base_url,
                    rate,
                    time_unit,
                    duration,
                    vus,
                    max_vus,
                    drop_policy,
                    graceful_stop,
                    insecure,
                },
                summary_export,
                out_csv,
                report,
                report_dir,
                quiet,
            })
            .await
        }
        Commands::Validate { config } => {
            validate::handle_validate(&config)?;
            Ok(0)
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            let sh = match shell.as_str() {
                "bash" => CompShell::Bash,
                "zsh" => CompShell::Zsh,
                "fish" => CompShell::Fish,
                "powershell" | "pwsh" => CompShell::PowerShell,
                "elvish" => CompShell::Elvish,
                other => anyhow::bail!(
                    "Unsupported shell: {} (use bash|zsh|fish|powershell|elvish)",
                    other
                ),
            };
            generate(sh, &mut cmd, name, &mut std::io::stdout());
            Ok(0)
        }
        Commands::Man => {
            let man = clap_mangen::Man::new(Cli::command());
            man.render(&mut std::io::stdout())?;
            Ok(0)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = logging::init(cli.log_level.as_deref()) {
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        return ExitCode::from(1);
    }

    match dispatch(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("{} {:#}", "Error:".red().bold(), err);
            ExitCode::from(1)
        }
    }
}
