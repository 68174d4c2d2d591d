use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use eatwhat::api_connection::HttpTransport;
use eatwhat::cli::{parse_args, Command};
use eatwhat::config::AppConfig;
use eatwhat::generation::GenerationClient;
use eatwhat::recipe::RecipeRequest;
use eatwhat::service::RecipeService;
use eatwhat::store::MemoryStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = parse_args();
    let mut config = AppConfig::from_env().context("loading configuration")?;
    if let Some(path) = cli.corpus_index {
        config.corpus_index_path = PathBuf::from(path);
    }

    let transport = Arc::new(HttpTransport::new(&config));
    let client = Arc::new(GenerationClient::new(transport));
    let store = Arc::new(MemoryStore::new());
    let service = RecipeService::new(config, client, store);

    match cli.command {
        Command::Extract { input } => {
            let extraction = service.extract_ingredients(&input, &[]).await?;
            println!("{}", serde_json::to_string_pretty(&extraction)?);
        }
        Command::Recommend { input, owned } => {
            let outcome = service.recommend(&input, &owned).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Recipe {
            dish,
            owned,
            source_path,
        } => {
            let request = RecipeRequest {
                dish_name: dish,
                owned_ingredients: owned,
                hint_path: source_path,
                hint_source: None,
            };
            let detail = service.recipe_detail(&request).await?;
            println!("{}", serde_json::to_string_pretty(&detail)?);
        }
    }

    Ok(())
}
