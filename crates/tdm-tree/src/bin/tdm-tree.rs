//! CLI entrypoint for the device tree model.

#[path = "tdm-tree/cli.rs"]
mod cli;
#[path = "tdm-tree/run.rs"]
mod run;
#[path = "tdm-tree/style.rs"]
mod style;

use clap::Parser;

use cli::{Cli, Command};

fn main() {
    if let Err(err) = dispatch(Cli::parse()) {
        eprintln!("{}", style::error(format!("Error: {err:#}")));
        std::process::exit(1);
    }
}

fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let config = run::load_config(cli.config.as_deref())?;
    run::init_logging(&config, cli.verbose)?;
    match cli.command {
        Command::Show => run::show(&config),
        Command::Replay { events, strict } => run::replay(&config, &events, strict),
        Command::Capabilities => {
            run::capabilities();
            Ok(())
        }
    }
}
