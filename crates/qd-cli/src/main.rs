use clap::Parser;
use qd_cli::{run, verbosity_to_filter, Cli};

fn main() {
    let cli = Cli::parse();
    env_logger::Builder::new().filter_level(verbosity_to_filter(cli.verbose)).init();

    if let Err(err) = run(&cli) {
        log::error!("{err}");
        std::process::exit(err.exit_code());
    }
}
