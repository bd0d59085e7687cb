use crate::prelude::*;
use clap::Parser;

mod error;
mod prelude;
mod run;
mod spans;

#[derive(Debug, clap::Parser)]
#[command(
    author,
    version,
    about,
    long_about = "Rebuild PDF documents with restyled text, restored images and table outlines"
)]
pub struct App {
    #[command(subcommand)]
    pub command: SubCommands,

    #[clap(flatten)]
    global: Global,
}

#[derive(Debug, Clone, clap::Args)]
pub struct Global {
    /// Whether to display additional information.
    #[clap(long, env = "DOCRECAST_VERBOSE", global = true, default_value = "false")]
    verbose: bool,
}

#[derive(Debug, clap::Parser)]
pub enum SubCommands {
    /// Convert every matching document of a directory
    Run(crate::run::App),

    /// Print the span record of one PDF as JSON
    Spans(crate::spans::App),
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let app = App::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if app.global.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    match app.command {
        SubCommands::Run(sub_app) => crate::run::run(sub_app, app.global),
        SubCommands::Spans(sub_app) => crate::spans::run(sub_app, app.global),
    }
    .map_err(|err: color_eyre::eyre::Report| eyre!(err))
}
