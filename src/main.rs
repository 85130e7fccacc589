//! Eventload CLI - stage, validate and publish event data
//!
//! # Main Commands
//!
//! ```bash
//! eventload serve                             # Start HTTP server (port 3000)
//! eventload import items.json -l en,cs -d en  # Run a full import from a file
//! eventload validate items.json               # Validate items against schemas
//! ```

use clap::{Parser, Subcommand};
use eventload::{
    create_importer, run_items_import, HttpDocumentStore, Item, MemoryDocumentStore, MemoryStore,
    Settings, Validator,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "eventload")]
#[command(about = "Stage, validate and publish event data to a document store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full import from a JSON file of staged items
    Import {
        /// Input JSON file (array of items)
        input: PathBuf,

        /// Comma-separated language codes to publish
        #[arg(short, long, default_value = "en")]
        languages: String,

        /// Default language (fallback for missing translations)
        #[arg(short, long, default_value = "en")]
        default_language: String,

        /// Document store base URL (EVENTLOAD_DOCSTORE_URL; in-memory dry run if not set)
        #[arg(long)]
        docstore_url: Option<String>,

        /// Use the first performer name as session name
        #[arg(long)]
        performer_session_names: bool,

        /// Write only data documents, no progress/log documents
        #[arg(long)]
        track_only_data: bool,
    },

    /// Validate JSON items against the embedded entity schemas
    Validate {
        /// Input JSON file (array of items)
        input: PathBuf,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Document store base URL (EVENTLOAD_DOCSTORE_URL; in-memory if not set)
        #[arg(long)]
        docstore_url: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Import {
            input,
            languages,
            default_language,
            docstore_url,
            performer_session_names,
            track_only_data,
        } => {
            cmd_import(
                &input,
                &languages,
                &default_language,
                docstore_url.as_deref(),
                performer_session_names,
                track_only_data,
            )
            .await
        }

        Commands::Validate { input } => cmd_validate(&input).await,

        Commands::Serve { port, docstore_url } => cmd_serve(port, docstore_url.as_deref()).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn make_docstore(url: Option<&str>) -> Arc<dyn eventload::DocumentStore> {
    let from_env = std::env::var("EVENTLOAD_DOCSTORE_URL").ok();
    match url.or(from_env.as_deref()) {
        Some(url) => {
            let store = match std::env::var("EVENTLOAD_DOCSTORE_TOKEN") {
                Ok(token) => HttpDocumentStore::new(url).with_auth_token(token),
                Err(_) => HttpDocumentStore::new(url),
            };
            Arc::new(store)
        }
        None => Arc::new(MemoryDocumentStore::new()),
    }
}

async fn read_items(input: &Path) -> Result<Vec<Item>, Box<dyn std::error::Error>> {
    let content = tokio::fs::read_to_string(input).await?;
    let items: Vec<Item> = serde_json::from_str(&content)?;
    Ok(items)
}

async fn cmd_import(
    input: &Path,
    languages: &str,
    default_language: &str,
    docstore_url: Option<&str>,
    performer_session_names: bool,
    track_only_data: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Reading items: {}", input.display());
    let items = read_items(input).await?;
    eprintln!("   {} items staged for import", items.len());
    if docstore_url.is_none() {
        eprintln!("   (no document store configured, dry run against memory)");
    }

    let mut settings = Settings::new(
        languages.split(',').map(|x| x.trim().to_string()).collect(),
        default_language,
    );
    settings.use_performer_name_as_session_name = performer_session_names;
    settings.track_only_data_in_docstore = track_only_data;

    let importer = create_importer(
        settings,
        Arc::new(MemoryStore::new()),
        make_docstore(docstore_url),
    )
    .await?;

    let state = run_items_import(&importer, items).await?;

    eprintln!("\n📊 Import {}", state.import_id);
    eprintln!("   Progress: {:.0}%", state.progress * 100.0);
    eprintln!("   Errors:   {}", state.error_summary);
    eprintln!("   Warnings: {}", state.warning_summary);

    if state.error_summary != "No errors" {
        std::process::exit(1);
    }
    eprintln!("\n✨ Done!");
    Ok(())
}

async fn cmd_validate(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("✔️  Validating: {}", input.display());

    let items = read_items(input).await?;
    let validator = Validator::new();

    let mut valid = 0;
    let mut invalid = 0;

    for (i, item) in items.iter().enumerate() {
        match validator.validate(item) {
            Ok(()) => valid += 1,
            Err(error) => {
                invalid += 1;
                if invalid <= 5 {
                    eprintln!("\n❌ Item {} ({} {}) invalid:", i, item.item_type, item.id);
                    if let eventload::ErrorDetail::Violations(violations) = &error.detail {
                        for violation in violations.iter().take(3) {
                            eprintln!("   - {}", violation);
                        }
                    }
                }
            }
        }
    }

    eprintln!("\n📊 Results: {} valid, {} invalid", valid, invalid);

    if invalid > 0 {
        std::process::exit(1);
    }

    Ok(())
}

async fn cmd_serve(port: u16, docstore_url: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    eventload::server::start_server(port, make_docstore(docstore_url)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_read_items_parses_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{ "id": "v1", "type": "venue", "language": "en", "data": {{ "id": "v1" }} }}]"#
        )
        .unwrap();
        let items = read_items(file.path()).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "v1");
    }

    #[tokio::test]
    async fn test_read_items_rejects_invalid_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(read_items(file.path()).await.is_err());
    }
}
