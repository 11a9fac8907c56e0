//! Subcommand handlers. Each one runs store operations and prints the result.

use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use tracing::warn;

use clawdeck_gateway::ConnectionStatus;
use clawdeck_state::settings::settings_path;
use clawdeck_state::{GatewayStore, Settings, SettingsPatch};

use crate::{Command, ConfigCommand, CronCommand, SettingsCommand, chat, format};

/// How long to wait for the first handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings file, then environment, then flags.
pub fn resolve_settings(url: Option<String>, token: Option<String>) -> Settings {
    let mut settings = match Settings::load() {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "failed to load settings, using defaults");
            Settings::default()
        }
    };
    settings.apply_env();
    settings.merge(SettingsPatch {
        gateway_url: url,
        token,
        theme: None,
    });
    settings
}

/// Connects and waits for the hello. The first error aborts.
pub async fn connect(store: &GatewayStore) -> anyhow::Result<()> {
    let url = store.settings().await.gateway_url;
    let mut changes = store.subscribe();
    store.connect().await;

    let outcome = tokio::time::timeout(CONNECT_TIMEOUT, async {
        loop {
            let (status, error) = store.read(|s| (s.status, s.error.clone())).await;
            match status {
                ConnectionStatus::Connected => return Ok(()),
                ConnectionStatus::Error => {
                    return Err(anyhow!(error.unwrap_or_else(|| "connection failed".into())));
                }
                _ => {}
            }
            if changes.changed().await.is_err() {
                return Err(anyhow!("store closed"));
            }
        }
    })
    .await;

    match outcome {
        Ok(result) => result.with_context(|| format!("cannot connect to {url}")),
        Err(_) => bail!("timed out connecting to {url}"),
    }
}

pub async fn run(store: &GatewayStore, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Status => status(store).await,
        Command::Cron { action } => cron(store, action).await,
        Command::Config {
            action: ConfigCommand::Get { raw },
        } => config(store, raw).await,
        Command::Agents => agents(store).await,
        Command::Channels => channels(store).await,
        Command::Sessions => sessions(store).await,
        Command::Skills => skills(store).await,
        Command::Chat { session } => chat::run(store, session).await,
        Command::Settings { .. } => Ok(()),
    }
}

async fn status(store: &GatewayStore) -> anyhow::Result<()> {
    let state = store.snapshot().await;
    println!("gateway:   {}", state.settings.gateway_url);
    println!("status:    {}", state.status);
    let Some(hello) = &state.hello else {
        return Ok(());
    };
    println!("protocol:  {}", hello.protocol);
    if let Some(snapshot) = &hello.snapshot {
        println!("uptime:    {}", format::duration_ms(snapshot.uptime_ms));
        if let Some(mode) = snapshot.auth_mode {
            println!("auth:      {}", mode.as_str());
        }
        if let Some(tick) = snapshot.policy.as_ref().and_then(|p| p.tick_interval_ms) {
            println!("tick:      {}", format::duration_ms(Some(tick)));
        }
        if let Some(agent) = snapshot
            .session_defaults
            .as_ref()
            .and_then(|d| d.default_agent_id.as_deref())
        {
            println!("agent:     {agent}");
        }
    }
    println!("session:   {}", hello.main_session_key());
    if let Some(auth) = &hello.auth {
        if let Some(role) = &auth.role {
            println!("role:      {role}");
        }
        if !auth.scopes.is_empty() {
            println!("scopes:    {}", auth.scopes.join(", "));
        }
    }
    Ok(())
}

async fn cron(store: &GatewayStore, action: CronCommand) -> anyhow::Result<()> {
    let now = chrono::Utc::now().timestamp_millis();
    match action {
        CronCommand::List => {
            store.load_cron_jobs().await?;
            let jobs = store.read(|s| s.cron_jobs.clone()).await;
            if jobs.is_empty() {
                println!("no jobs");
            }
            for job in jobs {
                let state = job.state.unwrap_or_default();
                let last = state
                    .last_status
                    .map(|s| s.as_str())
                    .unwrap_or("-");
                println!(
                    "{:<14} {:<3} {:<28} {:<20} next {:<10} last {}",
                    job.id,
                    if job.enabled { "on" } else { "off" },
                    job.name,
                    format::schedule(&job.schedule),
                    format::relative_ms(state.next_run_at_ms, now),
                    last,
                );
            }
        }
        CronCommand::Status => {
            store.load_cron_status().await?;
            let status = store.read(|s| s.cron_status.clone()).await.unwrap_or_default();
            println!("enabled:   {}", status.enabled);
            println!("jobs:      {}", status.jobs);
            println!(
                "next wake: {} ({})",
                format::timestamp_ms(status.next_wake_at_ms),
                format::relative_ms(status.next_wake_at_ms, now)
            );
        }
        CronCommand::Runs { id } => {
            store.load_cron_runs(&id).await?;
            let runs = store.read(|s| s.cron_runs.clone()).await;
            if runs.is_empty() {
                println!("no runs for {id}");
            }
            for entry in runs {
                let detail = entry.error.or(entry.summary).unwrap_or_default();
                println!(
                    "{}  {:<7} {:>10}  {}",
                    format::timestamp_ms(Some(entry.ts)),
                    entry.status.as_str(),
                    format::duration_ms(entry.duration_ms),
                    detail
                );
            }
        }
        CronCommand::Run { id } => {
            store.run_cron_job(&id).await?;
            println!("triggered {id}");
        }
        CronCommand::Enable { id } => {
            store.toggle_cron_job(&id, true).await?;
            println!("enabled {id}");
        }
        CronCommand::Disable { id } => {
            store.toggle_cron_job(&id, false).await?;
            println!("disabled {id}");
        }
        CronCommand::Remove { id } => {
            store.remove_cron_job(&id).await?;
            println!("removed {id}");
        }
    }
    Ok(())
}

async fn config(store: &GatewayStore, raw: bool) -> anyhow::Result<()> {
    store.load_config().await?;
    let Some(snapshot) = store.read(|s| s.config.clone()).await else {
        bail!("gateway returned no configuration");
    };

    if let Some(path) = &snapshot.path {
        eprintln!("# {path}");
    }
    match (raw, &snapshot.raw) {
        (true, Some(text)) => println!("{text}"),
        _ => {
            let value = snapshot
                .config
                .clone()
                .map(serde_json::Value::Object)
                .or_else(|| snapshot.parsed.clone())
                .unwrap_or_default();
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }
    for issue in snapshot.issues.unwrap_or_default() {
        eprintln!("issue: {}: {}", issue.path, issue.message);
    }
    Ok(())
}

async fn agents(store: &GatewayStore) -> anyhow::Result<()> {
    store.load_agents().await?;
    let Some(list) = store.read(|s| s.agents.clone()).await else {
        return Ok(());
    };
    for agent in &list.agents {
        let marker = if agent.id == list.default_id { "*" } else { " " };
        let emoji = agent
            .identity
            .as_ref()
            .and_then(|i| i.emoji.as_deref())
            .unwrap_or("");
        println!("{marker} {:<16} {} {emoji}", agent.id, agent.display_name());
    }
    Ok(())
}

async fn channels(store: &GatewayStore) -> anyhow::Result<()> {
    store.load_channels().await?;
    let Some(snapshot) = store.read(|s| s.channels.clone()).await else {
        return Ok(());
    };
    for id in &snapshot.channel_order {
        println!("{}", snapshot.label(id));
        let accounts = snapshot
            .channel_accounts
            .get(id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for account in accounts {
            let state = match (account.connected, account.running, account.enabled) {
                (Some(true), _, _) => "connected",
                (_, Some(true), _) => "running",
                (_, _, Some(false)) => "disabled",
                _ => "offline",
            };
            let name = account.name.as_deref().unwrap_or(&account.account_id);
            match &account.last_error {
                Some(err) => println!("  {name:<20} {state:<10} {err}"),
                None => println!("  {name:<20} {state}"),
            }
        }
    }
    Ok(())
}

async fn sessions(store: &GatewayStore) -> anyhow::Result<()> {
    store.load_sessions().await?;
    let Some(list) = store.read(|s| s.sessions.clone()).await else {
        return Ok(());
    };
    let now = chrono::Utc::now().timestamp_millis();
    for session in &list.sessions {
        let name = session
            .display_name
            .as_deref()
            .or(session.label.as_deref())
            .unwrap_or("");
        println!(
            "{:<32} {:<7} {:<10} {:<20} {}",
            session.key,
            session.kind.as_str(),
            format::relative_ms(session.updated_at, now),
            session.model.as_deref().unwrap_or("-"),
            name
        );
    }
    println!("{} session(s)", list.count);
    Ok(())
}

async fn skills(store: &GatewayStore) -> anyhow::Result<()> {
    store.load_skills().await?;
    let Some(report) = store.read(|s| s.skills.clone()).await else {
        return Ok(());
    };
    for skill in &report.skills {
        let state = if skill.disabled {
            "disabled"
        } else if skill.blocked_by_allowlist {
            "blocked"
        } else if skill.eligible {
            "ready"
        } else {
            "missing"
        };
        let emoji = skill.emoji.as_deref().unwrap_or(" ");
        println!("{emoji} {:<24} {state}", skill.name);
        if !skill.missing.is_empty() {
            let missing: Vec<String> = skill
                .missing
                .bins
                .iter()
                .map(|b| format!("bin:{b}"))
                .chain(skill.missing.env.iter().map(|e| format!("env:{e}")))
                .chain(skill.missing.config.iter().map(|c| format!("config:{c}")))
                .chain(skill.missing.os.iter().map(|o| format!("os:{o}")))
                .collect();
            println!("    needs {}", missing.join(", "));
        }
    }
    Ok(())
}

/// `settings show` prints the effective settings; `settings set` saves the
/// global `--url`/`--token` flags and `--theme`.
pub fn settings(
    action: SettingsCommand,
    url: Option<String>,
    token: Option<String>,
) -> anyhow::Result<()> {
    let path = settings_path()?;
    match action {
        SettingsCommand::Show => {
            let settings = resolve_settings(url, token);
            println!("file:        {}", path.display());
            println!("gateway_url: {}", settings.gateway_url);
            println!("token:       {}", format::mask(&settings.token));
            println!("theme:       {}", settings.theme.as_str());
        }
        SettingsCommand::Set { theme } => {
            let mut settings = Settings::load_from(&path)?;
            settings.merge(SettingsPatch {
                gateway_url: url,
                token,
                theme,
            });
            settings.save_to(&path)?;
            println!("saved {}", path.display());
        }
    }
    Ok(())
}
