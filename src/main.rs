use std::path::Path;
use std::process;

use anyhow::{self, format_err};
use clap::Parser;
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;

use qsqd::interfaces::cli::{log_heading, Cli, Commands};
use qsqd::interfaces::input::Input;
use qsqd::interfaces::InputHandle;
use qsqd::io::{read_qsqd_yaml, write_qsqd_yaml};

/// Sets up logging for a calculation.
///
/// The `qsqd-output` target carries the main output and goes to `output` if given, or to the
/// console otherwise. All other records at the warning level and above go to the console.
fn init_logging(output: Option<&Path>, log_config: Option<&Path>) -> Result<(), anyhow::Error> {
    if let Some(log_config) = log_config {
        return log4rs::init_file(log_config, Default::default())
            .map_err(|err| format_err!("Unable to read logging configuration: {err}"));
    }

    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{m}{n}")))
        .build();
    let stderr = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d(%Y-%m-%d %H:%M:%S)} {h({l})} {t} - {m}{n}")))
        .target(log4rs::append::console::Target::Stderr)
        .build();
    let builder = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .appender(Appender::builder().build("stderr", Box::new(stderr)));
    let (builder, output_appender) = if let Some(output) = output {
        let file = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new("{m}{n}")))
            .append(false)
            .build(output)
            .map_err(|err| format_err!("Unable to create output file: {err}"))?;
        (
            builder.appender(Appender::builder().build("qsqd-output", Box::new(file))),
            "qsqd-output",
        )
    } else {
        (builder, "stdout")
    };
    let config = builder
        .logger(
            Logger::builder()
                .appender(output_appender)
                .additive(false)
                .build("qsqd-output", LevelFilter::Info),
        )
        .build(Root::builder().appender("stderr").build(LevelFilter::Warn))
        .map_err(|err| format_err!("Invalid logging configuration: {err}"))?;
    log4rs::init_config(config)
        .map(|_| ())
        .map_err(|err| format_err!("Unable to initialise logging: {err}"))
}

fn run() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            output,
            log_config,
        } => {
            init_logging(output.as_deref(), log_config.as_deref())?;
            log_heading();
            let input: Input = read_qsqd_yaml(&config)?;
            input.handle()
        }
        Commands::Template { name } => {
            write_qsqd_yaml(&name, &Input::default())?;
            let mut path = name;
            path.set_extension("yml");
            println!("Template input written to {}.", path.display());
            Ok(())
        }
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err:#}");
        process::exit(1);
    }
}
