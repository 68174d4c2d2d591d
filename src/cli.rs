use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "食材驱动的菜谱推荐与详情生成", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the corpus index JSON (overrides CORPUS_INDEX_PATH)
    #[arg(long)]
    pub corpus_index: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract a canonical ingredient list from free-form text
    Extract {
        /// Conversational input, e.g. "我买了番茄和鸡蛋"
        input: String,
    },
    /// Recommend dishes for the given input and pantry
    Recommend {
        input: String,
        /// Owned ingredients; extracted from the input when omitted
        #[arg(short, long, value_delimiter = ',')]
        owned: Vec<String>,
    },
    /// Generate a full recipe detail for one dish
    Recipe {
        dish: String,
        #[arg(short, long, value_delimiter = ',')]
        owned: Vec<String>,
        /// Corpus path hint from a previous recommendation
        #[arg(long)]
        source_path: Option<String>,
    },
}

pub fn parse_args() -> Cli {
    Cli::parse()
}
