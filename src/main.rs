use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "verbabridge",
    version,
    about = "Explain Malaysian and Singaporean slang, rewrite text in a persona, and remix signboard photos"
)]
struct Cli {
    /// API key (overrides GEMINI_API_KEY / GOOGLE_API_KEY)
    #[arg(short = 'k', long = "key", global = true)]
    key: Option<String>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings", global = true)]
    read_settings: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Serve the HTTP API
    Serve {
        /// Listen address (default: settings [server] addr)
        #[arg(long = "addr")]
        addr: Option<String>,
    },
    /// Look up every meaning of a word or phrase (reads stdin when omitted)
    Text { text: Option<String> },
    /// Rewrite text in a persona such as "Gen Alpha" or "Ah Beng (Penang)"
    Style {
        #[arg(short = 's', long = "style")]
        style: String,
        text: Option<String>,
    },
    /// Read and translate the text in an image
    Read {
        #[arg(short = 'i', long = "image")]
        image: PathBuf,
    },
    /// Paint translations over the text in an image
    Remix {
        #[arg(short = 'i', long = "image")]
        image: PathBuf,
        /// JSON list of items to draw instead of asking the model
        #[arg(long = "items")]
        items: Option<PathBuf>,
        /// Write the remixed PNG here instead of printing a data URI
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    verbabridge::logging::init(cli.verbose)?;

    let command = match cli.command {
        CliCommand::Serve { addr } => verbabridge::Command::Serve { addr },
        CliCommand::Text { text } => verbabridge::Command::Text {
            text: text_or_stdin(text)?,
        },
        CliCommand::Style { style, text } => verbabridge::Command::Style {
            text: text_or_stdin(text)?,
            style,
        },
        CliCommand::Read { image } => verbabridge::Command::Read { image },
        CliCommand::Remix {
            image,
            items,
            output,
        } => verbabridge::Command::Remix {
            image,
            items,
            output,
        },
    };

    let output = verbabridge::run(verbabridge::Config {
        command,
        key: cli.key,
        settings_path: cli.read_settings,
    })
    .await?;

    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}

fn text_or_stdin(text: Option<String>) -> Result<String> {
    if let Some(text) = text {
        return Ok(text);
    }
    if io::stdin().is_terminal() {
        return Err(anyhow!("no input text (pass it as an argument or pipe it on stdin)"));
    }
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;
    if buffer.trim().is_empty() {
        return Err(anyhow!("stdin is empty"));
    }
    Ok(buffer)
}
