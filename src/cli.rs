use clap::Parser;
use std::path::PathBuf;

/// Streaming chat CLI
#[derive(Debug, Parser)]
#[command(name = "chatstream")]
#[command(version)]
#[command(about = "Streaming chat-completion client", long_about = None)]
pub struct Args {
    /// Model name
    #[arg(short = 'm', long = "model")]
    pub model: Option<String>,

    /// Files whose contents are attached to the message as context
    #[arg(long = "attach", value_name = "FILE")]
    pub attach: Vec<PathBuf>,

    /// JPEG images attached to the message (needs vision = true in config)
    #[arg(long = "image", value_name = "FILE")]
    pub image: Vec<PathBuf>,

    /// Prompt text (positional)
    #[arg(value_name = "PROMPT")]
    pub prompt: Vec<String>,
}
