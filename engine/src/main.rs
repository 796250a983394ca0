use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::info;
use zeroize::Zeroizing;

use orkeys_core::{
    ActionOutcome, ApiSettingsService, ConfigStore, HostServices, KeyWidget, SettingsService,
    WidgetConfig, WidgetSnapshot,
};
use orkeys_observability::{
    canonical_logs_dir_from_root, default_state_root, emit_event, init_process_logging,
    ObservabilityEvent, ProcessKind,
};
use orkeys_providers::{FileCacheStorage, HostApi, HttpHostApi, SystemClock};
use orkeys_types::{ModelRecord, ModelTestResult, SettingsDefinition};

#[derive(Parser, Debug)]
#[command(name = "orkeys")]
#[command(about = "Manage the OpenRouter API key stored in a host application's settings")]
struct Cli {
    /// Project config file layered over the global one.
    #[arg(long, global = true)]
    config: Option<String>,
    /// Host base URL, e.g. http://localhost:8005
    #[arg(long, global = true)]
    host: Option<String>,
    #[arg(long, global = true)]
    user: Option<String>,
    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the saved key (masked) and widget state.
    Status,
    /// Check a key's format locally without saving it.
    Validate { key: String },
    /// Save a new key. Reads it from stdin with --stdin.
    SetKey {
        key: Option<String>,
        #[arg(long, default_value_t = false)]
        stdin: bool,
    },
    RemoveKey,
    /// List models reachable with the saved key.
    Models {
        #[arg(long, default_value_t = false)]
        refresh: bool,
        #[arg(long)]
        search: Option<String>,
    },
    /// Check whether one model is available to the saved key.
    Test { model: String },
    /// Register the settings definition with the host.
    Register,
    /// Save the --host and --user flags into the config file.
    Configure,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logs_dir = canonical_logs_dir_from_root(&default_state_root());
    let (_log_guard, log_info) = init_process_logging(ProcessKind::Cli, &logs_dir, 14)?;
    emit_event(
        tracing::Level::INFO,
        ProcessKind::Cli,
        ObservabilityEvent {
            event: "logging.initialized",
            component: "cli.main",
            status: Some("ok"),
            detail: Some("cli jsonl logging initialized"),
            ..ObservabilityEvent::default()
        },
    );
    info!("cli logging initialized: {:?}", log_info);

    let overrides = build_cli_overrides(cli.host, cli.user);
    let config_path = cli.config.map(PathBuf::from);
    let store = ConfigStore::new(config_path.as_deref(), overrides.clone()).await?;
    let config = store.load().await?;

    match cli.command {
        Command::Validate { key } => {
            let outcome = config.validator().validate(&key, false);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else if outcome.valid {
                println!("valid");
            } else {
                println!("invalid: {}", outcome.error.as_deref().unwrap_or("unknown error"));
            }
            if !outcome.valid {
                std::process::exit(1);
            }
        }
        Command::Register => {
            let api = connect(&config)?;
            let definition = SettingsDefinition {
                id: config.settings.definition_id.clone(),
                name: config.settings.instance_name.clone(),
                ..SettingsDefinition::default()
            };
            ApiSettingsService::new(api)
                .register_definition(&definition)
                .await
                .context("registering settings definition")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&definition)?);
            } else {
                println!("registered {}", definition.id);
            }
        }
        Command::Configure => {
            let Some(patch) = overrides else {
                anyhow::bail!("nothing to save; pass --host and/or --user");
            };
            let saved = store.patch_file(patch).await?;
            let path = store.writable_path().display().to_string();
            if cli.json {
                let output = json!({
                    "path": path,
                    "base_url": saved.host.base_url,
                    "user_id": saved.host.user_id,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("saved {path}");
            }
        }
        command => {
            let widget = open_widget(config).await?;
            run_widget_command(&widget, command, cli.json).await?;
        }
    }

    Ok(())
}

fn connect(config: &WidgetConfig) -> anyhow::Result<Arc<dyn HostApi>> {
    let api = HttpHostApi::new(
        &config.host.base_url,
        config.host.api_token.clone(),
        config.request_timeout(),
    )?;
    Ok(Arc::new(api))
}

async fn open_widget(config: WidgetConfig) -> anyhow::Result<KeyWidget> {
    let api = connect(&config)?;
    let user_id = resolve_user_id(&config, api.as_ref()).await?;
    let cache_dir = config
        .cache
        .dir
        .clone()
        .unwrap_or_else(FileCacheStorage::default_dir);
    let services = HostServices::new(user_id)
        .with_api(api.clone())
        .with_settings(Arc::new(ApiSettingsService::new(api)));

    let widget = KeyWidget::new(
        config,
        services,
        Arc::new(FileCacheStorage::new(cache_dir)),
        Arc::new(SystemClock),
    )
    .with_process(ProcessKind::Cli);
    widget.initialize().await;
    Ok(widget)
}

async fn resolve_user_id(config: &WidgetConfig, api: &dyn HostApi) -> anyhow::Result<String> {
    if let Some(user) = config
        .host
        .user_id
        .as_deref()
        .filter(|u| !u.trim().is_empty())
    {
        return Ok(user.trim().to_string());
    }
    api.current_user_id()
        .await
        .context("could not determine the current user; pass --user or set ORKEYS_USER_ID")
}

async fn run_widget_command(
    widget: &KeyWidget,
    command: Command,
    json: bool,
) -> anyhow::Result<()> {
    let outcome = match command {
        Command::Status => ActionOutcome::Completed,
        Command::SetKey { key, stdin } => {
            let key = read_key(key, stdin, std::io::stdin())?;
            widget.set_pending_key(&key).await;
            widget.save().await
        }
        Command::RemoveKey => widget.remove().await,
        Command::Models { refresh, search } => {
            if let Some(search) = search {
                widget.set_model_search(&search).await;
            }
            if refresh {
                widget.refresh_models().await
            } else {
                widget.load_models(false).await
            }
        }
        Command::Test { model } => {
            widget.select_model(&model).await;
            widget.test_selected_model().await
        }
        Command::Validate { .. } | Command::Register | Command::Configure => {
            ActionOutcome::Completed
        }
    };

    let snapshot = widget.snapshot().await;
    if json {
        let output = json!({ "result": outcome, "state": snapshot });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        for line in render_text(&snapshot) {
            println!("{line}");
        }
    }

    match outcome {
        ActionOutcome::Completed | ActionOutcome::Skipped => Ok(()),
        ActionOutcome::Rejected(message) | ActionOutcome::Failed(message) => {
            anyhow::bail!(message)
        }
    }
}

/// Key from the argument, or the first line of `input` with `--stdin`.
fn read_key(
    arg: Option<String>,
    from_stdin: bool,
    mut input: impl Read,
) -> anyhow::Result<Zeroizing<String>> {
    if from_stdin {
        let mut buf = Zeroizing::new(String::new());
        input.read_to_string(&mut buf)?;
        let line = buf.lines().next().unwrap_or("").trim_end_matches('\r');
        return Ok(Zeroizing::new(line.to_string()));
    }
    match arg {
        Some(key) => Ok(Zeroizing::new(key)),
        None => anyhow::bail!("a key is required; pass it as an argument or use --stdin"),
    }
}

fn build_cli_overrides(host: Option<String>, user: Option<String>) -> Option<Value> {
    if host.is_none() && user.is_none() {
        return None;
    }
    let mut section = serde_json::Map::new();
    if let Some(host) = host {
        section.insert("base_url".to_string(), Value::String(host));
    }
    if let Some(user) = user {
        section.insert("user_id".to_string(), Value::String(user));
    }
    Some(json!({ "host": Value::Object(section) }))
}

fn render_text(snapshot: &WidgetSnapshot) -> Vec<String> {
    let mut lines = Vec::new();
    match &snapshot.credential.masked_key {
        Some(masked) => lines.push(format!("API key: {masked}")),
        None => lines.push("API key: not set".to_string()),
    }
    if let Some(updated) = &snapshot.credential.last_updated {
        lines.push(format!("Last updated: {updated}"));
    }
    for message in [
        &snapshot.notice,
        &snapshot.validation_error,
        &snapshot.save_error,
        &snapshot.tab_error,
    ]
    .into_iter()
    .flatten()
    {
        lines.push(message.clone());
    }
    if !snapshot.models.is_empty() {
        lines.push(format!(
            "Models ({} of {}):",
            snapshot.models.len(),
            snapshot.total_models
        ));
        lines.extend(snapshot.models.iter().map(render_model));
    }
    if let Some(latest) = snapshot.test_results.first() {
        lines.push(render_test_result(latest));
    }
    lines
}

fn render_model(model: &ModelRecord) -> String {
    let mut line = format!("  {}  {}  [{}]", model.id, model.name, model.provider);
    if let Some(context) = model.format_context_length() {
        line.push_str(&format!("  {context}"));
    }
    if let Some(pricing) = &model.pricing {
        if let Some(prompt) = pricing.format_prompt() {
            line.push_str(&format!("  in {prompt}"));
        }
        if let Some(completion) = pricing.format_completion() {
            line.push_str(&format!("  out {completion}"));
        }
    }
    line
}

fn render_test_result(result: &ModelTestResult) -> String {
    let mut line = format!("{}: {}", result.status.as_str(), result.message);
    if let Some(details) = &result.details {
        line.push_str(&format!(" ({details})"));
    }
    line
}
