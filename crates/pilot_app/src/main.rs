mod cli;
mod commands;
mod config;
mod offline;

use clap::Parser;
use pilot_logging::{parse_level, LogDestination};

use crate::cli::{Cli, Commands};
use crate::commands::{FillArgs, GenerateArgs};
use crate::config::AppConfig;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;

    let level = parse_level(cli.log_level.as_deref().unwrap_or(&config.log_level));
    let destination = match cli.log_file {
        Some(path) => LogDestination::Both(path),
        None => LogDestination::Terminal,
    };
    pilot_logging::initialize(&destination, level);

    match cli.command {
        Commands::ServeDebug { bind } => commands::serve_debug(&config, bind),
        Commands::Fill {
            page,
            url,
            platform,
            out,
            debug,
        } => commands::fill(
            &config,
            FillArgs {
                page,
                url,
                platform,
                out,
                debug,
            },
        ),
        Commands::Generate {
            platform,
            title,
            source_url,
            messages,
            refine,
        } => commands::generate(
            &config,
            GenerateArgs {
                platform,
                title,
                source_url,
                messages,
                refine,
            },
        ),
        Commands::Status => commands::status(&config),
        Commands::Platforms => {
            commands::platforms();
            Ok(())
        }
        Commands::InitConfig => commands::init_config(&cli.config),
    }
}
