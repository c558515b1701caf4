mod app;
mod cli;

use anyhow::Context;
use clap::Parser;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_stream::StreamExt;

use chatstream::attachment::Attachment;
use chatstream::client::{FunctionCallAccumulator, HubMessage, StreamEnd, StreamEvent};
use chatstream::config::Config;
use chatstream::conversation::{Conversation, Message};
use chatstream::paths;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = cli::Args::parse();

    let config_dir = paths::config_dir()?;
    let cfg = Config::load_optional(config_dir.join("config.toml"))?;
    tracing::debug!(?config_dir, ?cfg, "resolved config");

    let prompt = args.prompt.join(" ");
    if prompt.trim().is_empty() {
        anyhow::bail!("No prompt provided. Try: chatstream \"Hello\"");
    }

    let mut client = app::build_client(cfg.as_ref(), args.model.clone())?;
    tracing::debug!(model = %client.descriptor().model, "client ready");

    // Ctrl-C flips the flag; the run notices before its next line read.
    let cancelled = Arc::new(AtomicBool::new(false));
    {
        let cancelled = Arc::clone(&cancelled);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancelled.store(true, Ordering::SeqCst);
            }
        });
    }
    let flag = Arc::clone(&cancelled);
    client.set_cancel_provider(Arc::new(move || flag.load(Ordering::SeqCst)));

    let mut message = Message::user("1").with_text(prompt);
    for path in &args.attach {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read attachment: {}", path.display()))?;
        message = message.with_attachment(Attachment::text(text));
    }
    for path in &args.image {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read image: {}", path.display()))?;
        message = message.with_attachment(Attachment::image(bytes));
    }

    let mut conversation = Conversation::new();
    conversation.add(message);

    let mut events = client.subscribe();
    tokio::spawn(client.run(&conversation));

    let mut call = FunctionCallAccumulator::new();
    while let Some(msg) = events.next().await {
        match msg {
            HubMessage::Event(StreamEvent::Content(text)) => {
                print!("{text}");
                std::io::stdout().flush().ok();
            }
            HubMessage::Event(StreamEvent::FunctionCall(fragment)) => call.push(&fragment),
            HubMessage::End(StreamEnd::Done) => break,
            HubMessage::End(StreamEnd::Cancelled) => {
                println!();
                eprintln!("(cancelled)");
                return Ok(());
            }
            HubMessage::End(StreamEnd::Failed(e)) => {
                println!();
                return Err(anyhow::Error::new(e).context("stream failed"));
            }
        }
    }
    println!();

    if !call.is_empty() {
        let reconstructed = call.finish().context("could not reconstruct function call")?;
        if let Some(call) = reconstructed {
            println!(
                "function call requested: {}({})",
                call.name,
                serde_json::Value::Object(call.arguments)
            );
        }
    }

    Ok(())
}
