//! Command-line interface of the `qsqd` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::io::format::qsqd_output;

const VERSION: Option<&str> = option_env!("CARGO_PKG_VERSION");

/// Logs a nicely formatted QSQD heading to the `qsqd-output` logger.
pub fn log_heading() {
    let version = if let Some(ver) = VERSION {
        format!("v{ver}")
    } else {
        "v unknown".to_string()
    };
    qsqd_output!("╭─────────────────────────────────────────────────────────────────────────────────────────────────────╮");
    qsqd_output!("│                                                                                                     │");
    qsqd_output!("│      QQQQQQQQQ        SSSSSSSSSSSSSSS      QQQQQQQQQ     DDDDDDDDDDDDD                              │");
    qsqd_output!("│    QQ:::::::::QQ    SS:::::::::::::::S   QQ:::::::::QQ   D::::::::::::DDD                           │");
    qsqd_output!("│  QQ:::::::::::::QQ S:::::SSSSSS::::::S QQ:::::::::::::QQ D:::::::::::::::DD                         │");
    qsqd_output!("│ Q:::::::QQQ:::::::QS:::::S     SSSSSSSQ:::::::QQQ:::::::QDDD:::::DDDDD:::::D                        │");
    qsqd_output!("│ Q::::::O   Q::::::QS:::::S            Q::::::O   Q::::::Q  D:::::D    D:::::D                       │");
    qsqd_output!("│ Q:::::O     Q:::::QS:::::S            Q:::::O     Q:::::Q  D:::::D     D:::::D                      │");
    qsqd_output!("│ Q:::::O     Q:::::Q S::::SSSS         Q:::::O     Q:::::Q  D:::::D     D:::::D                      │");
    qsqd_output!("│ Q:::::O     Q:::::Q  SS::::::SSSSS    Q:::::O     Q:::::Q  D:::::D     D:::::D                      │");
    qsqd_output!("│ Q:::::O     Q:::::Q    SSS::::::::SS  Q:::::O     Q:::::Q  D:::::D     D:::::D                      │");
    qsqd_output!("│ Q:::::O     Q:::::Q       SSSSSS::::S Q:::::O     Q:::::Q  D:::::D     D:::::D                      │");
    qsqd_output!("│ Q:::::O  QQQQ:::::Q            S:::::SQ:::::O  QQQQ:::::Q  D:::::D     D:::::D                      │");
    qsqd_output!("│ Q::::::O Q::::::::Q            S:::::SQ::::::O Q::::::::Q  D:::::D    D:::::D                       │");
    qsqd_output!("│ Q:::::::QQ::::::::QSSSSSSS     S:::::SQ:::::::QQ::::::::QDDD:::::DDDDD:::::D                        │");
    qsqd_output!("│  QQ::::::::::::::Q S::::::SSSSSS:::::S QQ::::::::::::::Q D:::::::::::::::DD                         │");
    qsqd_output!("│    QQ:::::::::::Q  S:::::::::::::::SS    QQ:::::::::::Q  D::::::::::::DDD                           │");
    qsqd_output!("│      QQQQQQQQ::::QQ SSSSSSSSSSSSSSS        QQQQQQQQ::::QQDDDDDDDDDDDDD                              │");
    qsqd_output!("│              Q:::::Q                               Q:::::Q                                          │");
    qsqd_output!("│               QQQQQQ                                QQQQQQ                            {version:>13} │");
    qsqd_output!("│                                                                                                     │");
    qsqd_output!("╰─────────────────────────────────────────────────────────────────────────────────────────────────────╯");
    qsqd_output!("");
}

/// Sample-based quantum diagonalisation with configuration recovery and orbital optimisation.
#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Runs a calculation described by a YAML input file.
    Run {
        /// The YAML input file.
        #[arg(short, long)]
        config: PathBuf,

        /// Optional output file. If not given, the main output is written to the console.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Optional log4rs YAML configuration file replacing the built-in logging configuration.
        #[arg(short, long)]
        log_config: Option<PathBuf>,
    },

    /// Writes a YAML input file with default parameters.
    Template {
        /// The name of the template file, without its `.yml` extension.
        #[arg(short, long, default_value = "qsqd_input")]
        name: PathBuf,
    },
}
