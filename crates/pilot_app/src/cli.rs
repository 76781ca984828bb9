use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Publish pilot: fills article editors, watches them for a publish and
/// relays live debugging commands into pages.
#[derive(Parser)]
#[command(name = "pilot")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "pilot.ron", global = true)]
    pub config: PathBuf,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Log level, overriding the config file
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the debug relay server
    ServeDebug {
        /// Address to listen on, overriding `debug_bind`
        #[arg(long)]
        bind: Option<String>,
    },

    /// Load a saved editor page, fill it from the stored payload and watch
    /// it for a publish
    Fill {
        /// HTML file holding the editor page
        page: PathBuf,

        /// Address the page was loaded from
        #[arg(long)]
        url: String,

        /// Platform id; detected from the URL when omitted
        #[arg(long)]
        platform: Option<String>,

        /// Write the page as it looks when the session ends
        #[arg(long)]
        out: Option<PathBuf>,

        /// Attach a debug agent to the page while the session runs
        #[arg(long)]
        debug: bool,
    },

    /// Run the generation pipeline and hand the result to an editor
    Generate {
        /// Destination platform id
        #[arg(long, default_value = "zhihu")]
        platform: String,

        /// Article title; taken from the source or the draft when omitted
        #[arg(long, default_value = "")]
        title: String,

        /// Page to extract the source material from
        #[arg(long)]
        source_url: Option<String>,

        /// User message to start the conversation with (repeatable)
        #[arg(short, long = "message")]
        messages: Vec<String>,

        /// Instruction for a second refining pass
        #[arg(long)]
        refine: Option<String>,
    },

    /// Show the current task record
    Status,

    /// List the supported platforms
    Platforms,

    /// Write a config file with every default spelled out
    InitConfig,
}
