//! assetline CLI - front-end asset pipeline with live reload.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "assetline")]
#[command(about = "Build HTML, SCSS, scripts, images and fonts with live reload")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to assetline.toml config file
    #[arg(short, long, default_value = "assetline.toml", global = true)]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build, then watch the sources and serve the output with live reload (default)
    Dev,

    /// Clean the output directory and build every asset once
    Build,

    /// Combine the icons in iconsprite/ into a stack sprite
    SvgSprite,

    /// Convert OpenType fonts in fonts/ to TrueType
    Otf2ttf,

    /// Regenerate scss/fonts.scss from the built fonts
    FontsStyle,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt().with_env_filter(filter).with_target(false).init();

    // Execute command
    match cli.command.unwrap_or(Commands::Dev) {
        Commands::Dev => {
            commands::dev::run(&cli.config).await?;
        }
        Commands::Build => {
            commands::build::run(&cli.config).await?;
        }
        Commands::SvgSprite => {
            commands::tools::svg_sprite(&cli.config).await?;
        }
        Commands::Otf2ttf => {
            commands::tools::otf2ttf(&cli.config).await?;
        }
        Commands::FontsStyle => {
            commands::tools::fonts_style(&cli.config).await?;
        }
    }

    Ok(())
}
