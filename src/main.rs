use clap::Parser;
use colored::*;
use eyre::{Context, Result, bail};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

mod cli;

use cli::Cli;
use cli::commands::Commands;
use nexus::config::Config;
use nexus::domain::RoadmapRequest;
use nexus::llm::{LlmClient, OpenAiClient};
use nexus::session::{ChatRequest, ChatService, RoadmapService, SessionFinalizer};
use nexus::store::{ConversationStore, JsonlStore, MemoryStore, RoadmapStore, TopicStore, TurnStore};

fn setup_logging(level: Option<&str>) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nexus")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("nexus.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level.unwrap_or("info")))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// The four collaborator stores, backed by one implementation
struct Stores {
    turns: Arc<dyn TurnStore>,
    conversations: Arc<dyn ConversationStore>,
    topics: Arc<dyn TopicStore>,
    roadmaps: Arc<dyn RoadmapStore>,
}

impl Stores {
    fn shared<S>(store: Arc<S>) -> Self
    where
        S: TurnStore + ConversationStore + TopicStore + RoadmapStore + 'static,
    {
        Self {
            turns: store.clone(),
            conversations: store.clone(),
            topics: store.clone(),
            roadmaps: store,
        }
    }

    fn open(config: &Config, ephemeral: bool) -> Result<Self> {
        if ephemeral {
            info!("Using in-memory storage");
            return Ok(Self::shared(Arc::new(MemoryStore::new())));
        }
        let store = JsonlStore::new(&config.storage.data_dir)
            .context(format!("Failed to open data directory {}", config.storage.data_dir.display()))?;
        info!("Using storage at {}", store.base_path().display());
        Ok(Self::shared(Arc::new(store)))
    }

    fn finalizer(&self) -> Arc<SessionFinalizer> {
        Arc::new(SessionFinalizer::new(
            self.turns.clone(),
            self.conversations.clone(),
            self.roadmaps.clone(),
        ))
    }
}

fn create_client(config: &Config) -> Result<Arc<dyn LlmClient>> {
    let settings = config.provider.settings(&config.models.default_model);
    let client = OpenAiClient::new(settings).context("Failed to create provider client")?;
    Ok(Arc::new(client))
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Chat {
            message,
            conversation,
            model,
            thinking,
        } => {
            let request = ChatRequest {
                message: message.clone(),
                conversation_id: conversation.clone(),
                model: model.clone(),
                thinking: *thinking,
            };
            handle_chat_command(request, cli, config).await
        }
        Commands::Roadmap {
            goal,
            title,
            description,
            level,
            difficulty,
            hours,
            style,
            model,
        } => {
            let request = RoadmapRequest {
                title: title.clone().unwrap_or_default(),
                description: description.clone().unwrap_or_default(),
                goal: goal.clone(),
                current_level: level.clone().unwrap_or_default(),
                difficulty: difficulty.clone().unwrap_or_default(),
                hours_per_week: *hours,
                learning_style: style.clone().unwrap_or_default(),
                model: model.clone().unwrap_or_default(),
            };
            handle_roadmap_command(request, cli, config).await
        }
        Commands::History { conversation } => handle_history_command(conversation.as_deref(), cli, config),
        Commands::Models => handle_models_command(config),
    }
}

async fn handle_chat_command(request: ChatRequest, cli: &Cli, config: &Config) -> Result<()> {
    info!("Sending chat message ({} chars)", request.message.len());
    let stores = Stores::open(config, cli.ephemeral)?;
    let service = ChatService::new(
        create_client(config)?,
        stores.turns.clone(),
        stores.conversations.clone(),
        stores.finalizer(),
        config.models.clone(),
        config.chat.clone(),
    );

    let handle = service.send_message(request).await.context("Failed to start chat")?;
    if !cli::render::render(handle, cli.raw).await? {
        bail!("Chat ended with an error");
    }
    Ok(())
}

async fn handle_roadmap_command(request: RoadmapRequest, cli: &Cli, config: &Config) -> Result<()> {
    info!("Generating roadmap for: {}", request.goal);
    let stores = Stores::open(config, cli.ephemeral)?;
    let service = RoadmapService::new(
        create_client(config)?,
        stores.topics.clone(),
        stores.roadmaps.clone(),
        stores.finalizer(),
        config.models.clone(),
        config.roadmap.clone(),
    );

    let handle = service.generate(request).await.context("Failed to start roadmap")?;
    if !cli::render::render(handle, cli.raw).await? {
        bail!("Roadmap generation ended with an error");
    }
    Ok(())
}

fn handle_history_command(conversation: Option<&str>, cli: &Cli, config: &Config) -> Result<()> {
    let stores = Stores::open(config, cli.ephemeral)?;

    let Some(id) = conversation else {
        let conversations = stores.conversations.list()?;
        if conversations.is_empty() {
            println!("{}", "No conversations yet".dimmed());
        }
        for conversation in conversations {
            println!(
                "{} {} {}",
                conversation.id.cyan(),
                conversation.title.bold(),
                format!("({} messages)", conversation.message_count).dimmed()
            );
        }
        return Ok(());
    };

    let conversation = stores
        .conversations
        .get(id)?
        .ok_or_else(|| eyre::eyre!("Conversation not found: {}", id))?;
    println!("{} {}\n", conversation.title.bold(), format!("[{}]", conversation.model).dimmed());

    for turn in stores.turns.find_history(id)? {
        let role = format!("{:?}", turn.role).to_lowercase();
        let marker = if turn.truncated { " (truncated)".red().to_string() } else { String::new() };
        println!("{}{}", format!("{}:", role).green(), marker);
        if let Some(thinking) = &turn.thinking {
            println!("{}", thinking.dimmed());
        }
        println!("{}\n", turn.content);
    }
    Ok(())
}

fn handle_models_command(config: &Config) -> Result<()> {
    for model in &config.models.models {
        let default = if model.id == config.models.default_model { " (default)".green().to_string() } else { String::new() };
        let thinking = if model.supports_thinking { " thinking".cyan().to_string() } else { String::new() };
        println!(
            "{}{} {}{}",
            model.id.bold(),
            default,
            format!("{} / {} / {} tokens", model.name, model.category, model.max_tokens).dimmed(),
            thinking
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    // Setup logging with the configured default level
    setup_logging(config.log_level.as_deref()).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
