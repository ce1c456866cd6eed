//! Wiring: config → provider, capabilities, session and stores.

use anyhow::{Context, bail};
use rivet_agent::{Session, TurnOutcome};
use rivet_config::{AgentMode, AppConfig};
use rivet_core::message::Role;
use rivet_memory::{ConversationRecord, HistoryStore, PersonaStore};
use rivet_providers::OpenAiCompatProvider;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Per-run identity taken from the command line.
pub struct Options {
    pub user_id: String,
    pub session_id: String,
    /// Persona override; the stored one is used when absent.
    pub persona: Option<String>,
}

pub struct App {
    pub config: AppConfig,
    pub user_id: String,
    pub session: Session,
    pub record: ConversationRecord,
    pub history: HistoryStore,
    pub personas: PersonaStore,
}

impl App {
    pub async fn build(config: AppConfig, options: Options) -> anyhow::Result<Self> {
        let Some(api_key) = config.api.api_key.clone().filter(|k| !k.trim().is_empty()) else {
            eprintln!();
            eprintln!("  ERROR: No API key configured!");
            eprintln!();
            eprintln!("  Set the environment variable:");
            eprintln!("    export OPENAI_API_KEY='sk-...'");
            eprintln!();
            eprintln!("  Or add it to your config file:");
            eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
            eprintln!();
            bail!("No API key found. See above for setup instructions.");
        };

        let provider = OpenAiCompatProvider::new("openai", config.api.base_url.clone(), api_key)?
            .with_timeout(Duration::from_secs(config.api.timeout_secs));
        let tools = rivet_tools::build_registry(&config.tools);
        let mut session = Session::from_config(&config, Arc::new(provider), tools);

        let history = HistoryStore::new(config.storage.history_dir.clone());
        history
            .init()
            .await
            .context("failed to prepare the history directory")?;
        let personas = PersonaStore::new(config.storage.memory_dir.clone());

        let persona = match options.persona {
            Some(persona) => Some(persona),
            None => personas.load(&options.user_id).await.unwrap_or_else(|e| {
                warn!(user = %options.user_id, error = %e, "Could not load stored persona");
                None
            }),
        };
        session.set_persona(persona);

        let mut record = ConversationRecord::new(&options.user_id, session.model());
        record.id = options.session_id;

        Ok(Self {
            config,
            user_id: options.user_id,
            session,
            record,
            history,
            personas,
        })
    }

    /// Run one turn, streaming output to stdout, then save the conversation.
    ///
    /// Ctrl-C during the turn cancels it.
    pub async fn turn(&mut self, input: &str, mode: AgentMode) -> anyhow::Result<TurnOutcome> {
        let history = self.record.to_messages();
        let cancel = CancellationToken::new();
        let watcher = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            }
        });

        self.session.set_mode(mode);
        let mut stdout = std::io::stdout();
        let mut sink = |chunk: &str| -> std::io::Result<()> {
            stdout.write_all(chunk.as_bytes())?;
            stdout.flush()
        };
        let result = self.session.handle(input, &history, &mut sink, &cancel).await;
        watcher.abort();
        self.session.set_mode(self.config.agent.mode);
        let outcome = result?;

        info!(
            iterations = outcome.iterations,
            tool_calls = outcome.tool_calls_made,
            "Turn complete"
        );

        self.record.push(Role::User, input);
        self.record.push(Role::Assistant, outcome.answer.clone());
        self.save().await;
        Ok(outcome)
    }

    /// Persist the current conversation; failures are reported, not fatal.
    pub async fn save(&mut self) {
        if self.record.is_empty() {
            return;
        }
        self.record.model = self.session.model().to_string();
        if let Err(e) = self.history.save(&mut self.record).await {
            warn!(id = %self.record.id, error = %e, "Failed to save conversation");
            eprintln!("  [Warning] could not save conversation: {e}");
        }
    }

    /// Save the current conversation and start an empty one.
    pub async fn start_new(&mut self) {
        self.save().await;
        self.record = ConversationRecord::new(&self.user_id, self.session.model());
        self.session.reset();
    }
}

/// User id: the flag, else `USER` / `USERNAME` without any `DOMAIN\`
/// prefix, else `default`.
pub fn resolve_user_id(flag: Option<&str>, env: impl Fn(&str) -> Option<String>) -> String {
    let non_empty = |s: &str| {
        let s = s.trim();
        (!s.is_empty()).then(|| s.to_string())
    };

    flag.and_then(non_empty)
        .or_else(|| {
            ["USER", "USERNAME"].iter().find_map(|key| {
                let value = env(key)?;
                non_empty(value.rsplit('\\').next().unwrap_or_default())
            })
        })
        .unwrap_or_else(|| "default".to_string())
}

pub fn default_session_id(user_id: &str) -> String {
    format!("{user_id}_{}", chrono::Utc::now().timestamp())
}
