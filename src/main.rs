use clap::Parser;
use tracing_subscriber::EnvFilter;

use screenrec::cli::{self, Args, Command};
use screenrec::config::Config;

/// Install the fmt subscriber. `RUST_LOG` wins over `-v`.
fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "screenrec=debug"
    } else {
        "screenrec=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = match Config::load(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(backend) = args.backend {
        config.capture.backend = backend;
    }

    let result = match args.command {
        Command::Monitors { json } => cli::list_monitors(config.capture.backend, json),
        Command::Record(record_args) => {
            if let Err(e) = cli::setup_ctrlc_handler() {
                eprintln!("Warning: Could not set up Ctrl+C handler: {}", e);
            }
            cli::record(&config, record_args).map(|_| ())
        }
        Command::Screenshot { output, monitor } => {
            cli::screenshot(&config, output, monitor).map(|_| ())
        }
        Command::Config { action } => {
            cli::handle_config_action(action, &config, args.config.as_deref())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
