use clap::Parser;
use tracing_subscriber::EnvFilter;

use proxystore::cli;

fn main() {
    let cli = cli::Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.with_ansi(!cli.no_color).init();
    }

    if let Err(e) = cli::run(cli.command) {
        eprintln!("Error: {}", e);
        std::process::exit(cli::exit_code(&e));
    }
}
