use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Target every structured event is logged under.
pub const OBS_TARGET: &str = "orkeys.obs";

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessKind {
    Cli,
    Host,
}

impl ProcessKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessKind::Cli => "cli",
            ProcessKind::Host => "host",
        }
    }

    fn log_prefix(self) -> String {
        format!("orkeys.{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggingInitInfo {
    pub process: String,
    pub logs_dir: String,
    pub prefix: String,
    pub retention_days: u64,
    pub initialized_at: DateTime<Utc>,
}

/// One credential or model lifecycle event. `detail` goes through
/// [`redact_text`] before it is logged.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ObservabilityEvent<'a> {
    pub event: &'a str,
    pub component: &'a str,
    pub user_id: Option<&'a str>,
    pub instance_id: Option<&'a str>,
    pub provider_id: Option<&'a str>,
    pub model_id: Option<&'a str>,
    pub status: Option<&'a str>,
    pub detail: Option<&'a str>,
}

/// Replaces API keys (`sk-…` words) and bearer tokens in `input` with a
/// length and hash marker. The surrounding text is kept.
pub fn redact_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut after_bearer = false;
    for segment in segments(input) {
        let is_word = segment.starts_with(is_token_char);
        if is_word && (after_bearer || looks_like_key(segment)) {
            out.push_str(&format!(
                "[redacted len={} hash={}]",
                segment.chars().count(),
                short_hash(segment)
            ));
        } else {
            out.push_str(segment);
        }
        if is_word {
            after_bearer = segment.eq_ignore_ascii_case("bearer");
        }
    }
    out
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

fn looks_like_key(word: &str) -> bool {
    word.starts_with("sk-") && word.len() >= 12
}

/// Alternating runs of token and non-token characters.
fn segments(input: &str) -> impl Iterator<Item = &str> {
    let mut rest = input;
    std::iter::from_fn(move || {
        let first = rest.chars().next()?;
        let word = is_token_char(first);
        let end = rest
            .find(|c: char| is_token_char(c) != word)
            .unwrap_or(rest.len());
        let (head, tail) = rest.split_at(end);
        rest = tail;
        Some(head)
    })
}

/// Stable within a process; used for change detection, never persisted.
pub fn short_hash(input: &str) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    input.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Display form of a secret: the first 8 and last 4 characters around an
/// ellipsis. Short secrets are fully hidden.
pub fn mask_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    let chars: Vec<char> = trimmed.chars().collect();
    if chars.is_empty() {
        return String::new();
    }
    if chars.len() <= 12 {
        return "•".repeat(8);
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}

/// Whether a server-provided value already hides the secret.
pub fn looks_masked(value: &str) -> bool {
    value.contains('*') || value.contains('•') || value.contains('…') || value.contains("...")
}

macro_rules! obs_event {
    ($macro:ident, $process:expr, $event:expr, $detail:expr) => {
        tracing::$macro!(
            target: OBS_TARGET,
            process = $process.as_str(),
            component = $event.component,
            event = $event.event,
            user_id = $event.user_id.unwrap_or(""),
            instance_id = $event.instance_id.unwrap_or(""),
            provider_id = $event.provider_id.unwrap_or(""),
            model_id = $event.model_id.unwrap_or(""),
            status = $event.status.unwrap_or(""),
            detail = $detail.as_str(),
            "observability_event"
        )
    };
}

pub fn emit_event(level: Level, process: ProcessKind, event: ObservabilityEvent<'_>) {
    let detail = redact_text(event.detail.unwrap_or(""));
    match level {
        Level::ERROR => obs_event!(error, process, event, detail),
        Level::WARN => obs_event!(warn, process, event, detail),
        Level::INFO => obs_event!(info, process, event, detail),
        _ => obs_event!(debug, process, event, detail),
    }
}

/// Daily JSONL file under `logs_dir` plus a compact stderr console.
/// `RUST_LOG` overrides the default `warn` filter.
pub fn init_process_logging(
    process: ProcessKind,
    logs_dir: &Path,
    retention_days: u64,
) -> anyhow::Result<(WorkerGuard, LoggingInitInfo)> {
    fs::create_dir_all(logs_dir)?;
    cleanup_old_jsonl(logs_dir, process, retention_days)?;

    let prefix = process.log_prefix();
    let file_appender = tracing_appender::rolling::Builder::new()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix(&prefix)
        .filename_suffix("jsonl")
        .build(logs_dir)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // stdout carries command output
    let console_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(true)
        .with_writer(std::io::stderr);
    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_current_span(false)
        .with_span_list(false);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    // A subscriber may already be installed by an embedding host.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    Ok((
        guard,
        LoggingInitInfo {
            process: process.as_str().to_string(),
            logs_dir: logs_dir.display().to_string(),
            prefix,
            retention_days,
            initialized_at: Utc::now(),
        },
    ))
}

/// Date of a rotated log file named `<prefix>.YYYY-MM-DD.jsonl`.
fn log_file_date(name: &str, prefix: &str) -> Option<NaiveDate> {
    let date = name
        .strip_prefix(prefix)?
        .strip_prefix('.')?
        .strip_suffix(".jsonl")?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

fn cleanup_old_jsonl(
    logs_dir: &Path,
    process: ProcessKind,
    retention_days: u64,
) -> anyhow::Result<()> {
    let days = retention_days.min(36_500) as i64;
    let cutoff = Utc::now().date_naive() - chrono::Duration::days(days);
    let prefix = process.log_prefix();

    let expired = fs::read_dir(logs_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .and_then(|name| log_file_date(name, &prefix))
                .is_some_and(|date| date < cutoff)
        });
    for path in expired {
        if let Err(err) = fs::remove_file(&path) {
            tracing::debug!("could not remove old log {}: {err}", path.display());
        }
    }
    Ok(())
}

pub fn canonical_logs_dir_from_root(root: &Path) -> PathBuf {
    root.join("logs")
}

/// `$ORKEYS_STATE_DIR`, else `<data_dir>/orkeys`, else a relative `.orkeys`.
pub fn default_state_root() -> PathBuf {
    if let Some(dir) = std::env::var_os("ORKEYS_STATE_DIR") {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .map(|p| p.join("orkeys"))
        .unwrap_or_else(|| PathBuf::from(".orkeys"))
}
