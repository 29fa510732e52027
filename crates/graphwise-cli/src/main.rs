//! Graphwise CLI - grounded question answering over per-tenant knowledge graphs

use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use tracing::info;

use graphwise_core::config::Config;
use graphwise_core::graph::{GraphGateway, Neo4jGateway, QueryParams};
use graphwise_core::llm::LlmClient;
use graphwise_core::pipeline::{Pipeline, QueryRequest, QueryResponse};
use graphwise_core::tenant::{RegisterRequest, SqliteTenantStore, TenantConfigStore};

#[derive(Parser)]
#[command(name = "graphwise")]
#[command(author, version, about = "Grounded question answering over per-tenant knowledge graphs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question against an application's knowledge graph
    Ask {
        /// The natural-language question
        question: String,
        /// Requesting user identifier
        #[arg(short, long)]
        user_id: String,
        /// Application identifier
        #[arg(short, long)]
        app_id: String,
    },

    /// Answer a request read from a JSON envelope file
    AskJson {
        /// Path to a JSON file with {content, user_id, app_id}
        path: String,
    },

    /// Register a tenant configuration from a JSON file
    Register {
        /// Path to a JSON file with {id, app_name, description, entities_allowed, relations_allowed, relation_rules}
        path: String,
    },

    /// Ingest graph data: run a batch of Cypher statements in one transaction
    Ingest {
        /// Path to a JSON file with an array of Cypher statements
        path: String,
        /// Owning user identifier
        #[arg(short, long)]
        user_id: String,
        /// Application identifier
        #[arg(short, long)]
        app_id: String,
    },

    /// Show a registered tenant schema
    Show {
        /// Application identifier
        app_id: String,
    },

    /// List registered tenants
    Tenants,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run health check
    Doctor,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("graphwise=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ask {
            question,
            user_id,
            app_id,
        } => {
            let request = QueryRequest {
                content: question,
                user_id,
                app_id,
            };
            cmd_ask(request, cli.quiet).await
        }

        Commands::AskJson { path } => {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read request file: {}", path))?;
            let request: QueryRequest = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse request file: {}", path))?;
            cmd_ask(request, cli.quiet).await
        }

        Commands::Register { path } => cmd_register(&path, cli.quiet).await,

        Commands::Ingest {
            path,
            user_id,
            app_id,
        } => cmd_ingest(&path, QueryParams::new(user_id, app_id), cli.quiet).await,

        Commands::Show { app_id } => cmd_show(&app_id).await,

        Commands::Tenants => cmd_tenants().await,

        Commands::Config { action } => cmd_config(action),

        Commands::Doctor => cmd_doctor().await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_ask(request: QueryRequest, quiet: bool) -> anyhow::Result<()> {
    let config = Config::load()?;

    let api_key = config
        .llm
        .resolved_api_key()?
        .ok_or_else(|| anyhow!("No API key. Set GRAPHWISE_API_KEY or OPENROUTER_API_KEY."))?;

    let generator = Arc::new(LlmClient::new(config.llm.clone(), api_key)?);
    let gateway = Arc::new(Neo4jGateway::connect(&config.graph).await?);
    let store = Arc::new(SqliteTenantStore::open(&config.store).await?);

    let pipeline = Pipeline::new(store, generator, gateway, &config.pipeline);

    if !quiet {
        info!(app_id = %request.app_id, "Running query pipeline");
    }

    let response = match pipeline.answer(&request).await {
        Ok(outcome) => QueryResponse::from_outcome(outcome),
        Err(e) => QueryResponse::from_error(&e),
    };

    println!("{}", serde_json::to_string_pretty(&response)?);

    if matches!(response, QueryResponse::Error { .. }) {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_register(path: &str, quiet: bool) -> anyhow::Result<()> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read registration file: {}", path))?;
    let request: RegisterRequest = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse registration file: {}", path))?;

    let config = Config::load()?;
    let store = SqliteTenantStore::open(&config.store).await?;

    let record = request.into_record();
    store.put(&record).await?;

    if !quiet {
        println!(
            "{}",
            serde_json::json!({"id": record.id, "message": "Inserted successfully"})
        );
    }
    Ok(())
}

async fn cmd_ingest(path: &str, params: QueryParams, quiet: bool) -> anyhow::Result<()> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read ingest file: {}", path))?;
    let statements: Vec<String> = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse ingest file: {}", path))?;
    if statements.is_empty() {
        return Err(anyhow!("Ingest file contains no statements"));
    }

    let config = Config::load()?;
    let gateway = Neo4jGateway::connect(&config.graph).await?;

    gateway.ensure_user_and_app(&params).await?;
    gateway.run_all_in_tx(&statements, &params).await?;

    if !quiet {
        println!(
            "{}",
            serde_json::json!({"statements": statements.len(), "message": "Ingested successfully"})
        );
    }
    Ok(())
}

async fn cmd_show(app_id: &str) -> anyhow::Result<()> {
    let config = Config::load()?;
    let store = SqliteTenantStore::open(&config.store).await?;

    match store.get(app_id).await? {
        Some(schema) => {
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(())
        }
        None => Err(anyhow!("No tenant configuration found for '{}'", app_id)),
    }
}

async fn cmd_tenants() -> anyhow::Result<()> {
    let config = Config::load()?;
    let store = SqliteTenantStore::open(&config.store).await?;

    let records = store.list().await?;
    if records.is_empty() {
        println!("No tenants registered.");
        return Ok(());
    }

    for record in records {
        println!(
            "{}  {}  ({} entities, {} relations)",
            record.id,
            record.app_name,
            record.schema.entities_allowed.len(),
            record.schema.relations_allowed.len()
        );
    }
    Ok(())
}

fn cmd_config(action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            println!("{}", config.get(&key)?);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            println!("Set {} = {}", key, value);
        }
        ConfigAction::List => {
            let config = Config::load()?;
            for (key, value) in config.list()? {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            println!("Configuration reset to defaults.");
        }
    }
    Ok(())
}

async fn cmd_doctor() -> anyhow::Result<()> {
    let config = Config::load()?;

    println!("Graphwise health check");
    println!("======================");

    match config.llm.redacted_api_key()? {
        Some(redacted) => println!("[ok] LLM API key: {}", redacted),
        None => println!("[!!] LLM API key: not set (GRAPHWISE_API_KEY or OPENROUTER_API_KEY)"),
    }

    let graph = config.graph.resolved();
    println!("[ok] Neo4j URI: {}", graph.uri);
    if graph.password.is_none() {
        println!("[!!] Neo4j password: not set (NEO4J_PASSWORD)");
    } else {
        match Neo4jGateway::connect(&config.graph).await {
            Ok(_) => println!("[ok] Neo4j: connected"),
            Err(e) => println!("[!!] Neo4j: connection failed - {}", e),
        }
    }

    match SqliteTenantStore::open(&config.store).await {
        Ok(store) => match store.list().await {
            Ok(records) => println!("[ok] Tenant store: {} tenants registered", records.len()),
            Err(e) => println!("[!!] Tenant store: query failed - {}", e),
        },
        Err(e) => println!("[!!] Tenant store: failed to open - {}", e),
    }

    Ok(())
}
