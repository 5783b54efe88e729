use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod handlers;

pub use handlers::*;

use crate::vocab::Language;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Data directory holding config.yaml, the database and ANN artifacts.
    /// Defaults to $VN_HOME, then ~/.local/share/vocab-notebook
    #[clap(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Answer JSON requests read line by line from stdin.
    Serve {},

    /// Run a single dispatcher command and print its response.
    Exec {
        /// Command name, e.g. add_entry
        cmd: String,

        /// JSON payload
        #[clap(allow_hyphen_values = true)]
        payload: Option<String>,
    },

    /// Add an entry
    Add {
        word: String,

        #[clap(short, long, default_value = "en")]
        lang: Language,

        #[clap(short, long)]
        translation: Option<String>,

        #[clap(short, long)]
        notes: Option<String>,
    },

    /// Show the best entries for a word or phrase
    Resolve {
        query: String,

        /// Language hint
        #[clap(short, long)]
        lang: Option<Language>,

        #[clap(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Print the tokens of a text
    Tokens { text: String },

    /// Drain the ANN update queue and rebuild the index.
    AnnApply {
        #[clap(short, long)]
        model: Option<String>,
    },
}
