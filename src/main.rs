use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod annotate;
mod cli;
mod config;
mod dispatch;
mod error;
mod graph;
mod matching;
mod search;
mod semantic;
mod store;
#[cfg(test)]
mod tests;
mod vocab;

use cli::Command;
use config::Config;
use dispatch::Dispatcher;

fn main() -> anyhow::Result<()> {
    // stdout carries responses, logs go to stderr
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "vn=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = cli::Args::parse();

    if let Command::Tokens { text } = &args.command {
        return cli::handle_tokens(text);
    }

    let data_dir = config::data_dir(args.data_dir)?;
    let config = Config::load_with(&data_dir)?;
    let dispatcher = Dispatcher::open(config)?;

    match args.command {
        Command::Serve {} => cli::handle_serve(&dispatcher),
        Command::Exec { cmd, payload } => cli::handle_exec(&dispatcher, &cmd, payload),
        Command::Add {
            word,
            lang,
            translation,
            notes,
        } => cli::handle_add(&dispatcher, word, lang, translation, notes),
        Command::Resolve {
            query,
            lang,
            top_k,
        } => cli::handle_resolve(&dispatcher, query, lang, top_k),
        Command::AnnApply { model } => cli::handle_ann_apply(&dispatcher, model),
        Command::Tokens { text } => cli::handle_tokens(&text),
    }
}
