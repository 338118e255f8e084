use std::path::PathBuf;

use clap::{Parser, Subcommand};

use leafsuite::cli::commands::{self, ExitStatus, RunOptions};

#[derive(Parser)]
#[command(name = "leafsuite", about = "Resolve, run and report nested test suites", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every test under the root declaration
    Run {
        /// Manifest declaring classes and suites
        manifest: PathBuf,

        /// Root declaration name (default: manifest root, then <package>.AllTests)
        #[arg(short = 't', long)]
        test_class: Option<String>,

        /// Directory the JUnit report is written to
        #[arg(short, long, default_value = "test-reports")]
        report_dir: PathBuf,

        /// Summary format: text, json, yaml
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Cancel the run after the first failing test
        #[arg(long)]
        fail_fast: bool,

        /// Shell used to run case commands
        #[arg(long)]
        shell: Option<String>,

        /// Write the report even if the run was cancelled
        #[arg(long)]
        report_cancelled: bool,
    },

    /// Count the tests under the root declaration without running them
    Count {
        manifest: PathBuf,

        #[arg(short = 't', long)]
        test_class: Option<String>,
    },

    /// List the tests under the root declaration in run order
    List {
        manifest: PathBuf,

        #[arg(short = 't', long)]
        test_class: Option<String>,
    },
}

fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            manifest,
            test_class,
            report_dir,
            format,
            fail_fast,
            shell,
            report_cancelled,
        } => {
            let text = format == "text";
            let options = RunOptions {
                manifest,
                test_class,
                report_dir: Some(report_dir),
                format,
                fail_fast,
                shell,
                report_cancelled,
            };
            let output = match commands::run_run(&options, |line| {
                if text {
                    println!("{line}");
                } else {
                    eprintln!("{line}");
                }
            }) {
                Ok(output) => output,
                Err(e) => {
                    eprintln!("error: {e}");
                    std::process::exit(ExitStatus::Error.code());
                }
            };

            println!("{}", output.summary);
            if let Some(path) = &output.report_path {
                eprintln!("report written to {}", path.display());
            }
            if let Some(e) = &output.report_error {
                eprintln!("error: {e}");
            }
            std::process::exit(output.exit_status().code());
        }
        Commands::Count {
            manifest,
            test_class,
        } => match commands::run_count(&manifest, test_class.as_deref()) {
            Ok(result) => println!("{result}"),
            Err(e) => {
                eprintln!("error: {e}");
                std::process::exit(ExitStatus::Error.code());
            }
        },
        Commands::List {
            manifest,
            test_class,
        } => match commands::run_list(&manifest, test_class.as_deref()) {
            Ok(result) => print!("{result}"),
            Err(e) => {
                eprintln!("error: {e}");
                std::process::exit(ExitStatus::Error.code());
            }
        },
    }
}
