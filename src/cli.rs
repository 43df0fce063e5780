use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct QueryArgs {
    /// Free text query
    pub query: String,

    /// Maximum number of results
    #[clap(short, long, default_value = "5")]
    pub limit: usize,

    /// Only return this category (film, dizi, kitap)
    #[clap(short, long)]
    pub category: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the search service.
    Daemon {},

    /// Build the index from a catalog file, replacing the current one.
    ///
    /// The file is a JSON array of items or an object with a `contents` array.
    Index {
        /// Path to the catalog JSON file
        file: PathBuf,
    },

    /// Semantic search over the indexed catalog
    Search {
        #[clap(flatten)]
        args: QueryArgs,
    },

    /// Recommendations similar to a query
    Recommend {
        #[clap(flatten)]
        args: QueryArgs,
    },

    /// Print the raw embedding of a text
    Embed {
        text: String,
    },

    /// Show index status
    Status {},
}
