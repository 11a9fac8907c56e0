//! Interactive chat: reads lines from stdin, sends them to the selected
//! session, and streams the reply as the store folds push events in.

use std::collections::HashMap;
use std::io::{self, Write};

use tokio::io::{AsyncBufReadExt, BufReader};

use clawdeck_protocol::ChatRole;
use clawdeck_state::{DashboardState, GatewayStore, ToolStatus};

const HELP: &str = "commands: /clear, /session KEY, /exit";

pub async fn run(store: &GatewayStore, session: Option<String>) -> anyhow::Result<()> {
    let key = match session {
        Some(key) => key,
        None => store.read(|s| s.session_key().to_string()).await,
    };
    switch_session(store, &key).await;
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        let input = line.trim();

        match input {
            "" => continue,
            "/exit" | "/quit" => break,
            "/help" => {
                println!("{HELP}");
                continue;
            }
            "/clear" => {
                store.clear_chat().await;
                continue;
            }
            _ => {}
        }
        if let Some(key) = input.strip_prefix("/session ") {
            switch_session(store, key.trim()).await;
            continue;
        }

        let first = store.read(|s| s.chat.messages.len()).await;
        if let Err(e) = store.send_chat_message(input, None).await {
            eprintln!("send failed: {e}");
            continue;
        }
        stream_reply(store, first).await?;
    }

    println!();
    Ok(())
}

async fn switch_session(store: &GatewayStore, key: &str) {
    if let Err(e) = store.set_chat_session(key).await {
        eprintln!("history unavailable: {e}");
    }
    let messages = store.read(|s| s.chat.messages.clone()).await;
    for message in &messages {
        let prefix = if message.role == ChatRole::User { ">" } else { "<" };
        println!("{prefix} {}", message.content);
    }
    println!("-- session {key} ({} messages)", messages.len());
}

/// Prints the reply until the run finishes, the connection drops, or Ctrl-C.
async fn stream_reply(store: &GatewayStore, first: usize) -> anyhow::Result<()> {
    let mut changes = store.subscribe();
    let mut printer = ReplyPrinter::new(first);
    let mut stdout = io::stdout();

    loop {
        let done = store
            .read(|state| -> io::Result<bool> {
                printer.render(state, &mut stdout)?;
                Ok(!state.chat.loading || !state.is_connected())
            })
            .await?;
        stdout.flush()?;
        if done {
            break;
        }

        tokio::select! {
            changed = changes.changed() => if changed.is_err() { break },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    printer.finish(&mut stdout)?;
    if store.status().await != clawdeck_gateway::ConnectionStatus::Connected {
        eprintln!("connection lost");
    }
    Ok(())
}

/// Incremental renderer for one reply.
struct ReplyPrinter {
    /// Index of the user's message; the reply follows it.
    first: usize,
    /// Text already printed, per message index.
    printed: HashMap<usize, String>,
    tools: HashMap<String, ToolStatus>,
    thinking_shown: bool,
    mid_line: bool,
}

impl ReplyPrinter {
    fn new(first: usize) -> Self {
        Self {
            first,
            printed: HashMap::new(),
            tools: HashMap::new(),
            thinking_shown: false,
            mid_line: false,
        }
    }

    fn render(&mut self, state: &DashboardState, out: &mut impl Write) -> io::Result<()> {
        if !state.chat.thinking.is_empty() && !self.thinking_shown {
            self.line(out, "  (thinking)")?;
            self.thinking_shown = true;
        }

        for tool in &state.chat.tools {
            if self.tools.get(&tool.id) == Some(&tool.status) {
                continue;
            }
            self.tools.insert(tool.id.clone(), tool.status);
            let detail = match tool.status {
                ToolStatus::Running => tool.args.as_deref().unwrap_or(""),
                ToolStatus::Done | ToolStatus::Error => tool.output.as_deref().unwrap_or(""),
            };
            let text = format!("  [{}] {} {}", tool.status.as_str(), tool.name, one_line(detail));
            self.line(out, text.trim_end())?;
        }

        for (index, message) in state.chat.messages.iter().enumerate().skip(self.first) {
            if message.role == ChatRole::User {
                continue;
            }
            match self.printed.get(&index) {
                Some(done) if done == &message.content => {}
                Some(done) if message.content.starts_with(done.as_str()) => {
                    write!(out, "{}", &message.content[done.len()..])?;
                    self.mid_line = !message.content.ends_with('\n');
                }
                Some(_) => {
                    // Final text differs from the streamed deltas: reprint.
                    self.line(out, "")?;
                    write!(out, "< {}", message.content)?;
                    self.mid_line = true;
                }
                None => {
                    if self.mid_line {
                        writeln!(out)?;
                    }
                    write!(out, "< {}", message.content)?;
                    self.mid_line = true;
                }
            }
            self.printed.insert(index, message.content.clone());
        }
        Ok(())
    }

    fn finish(&mut self, out: &mut impl Write) -> io::Result<()> {
        if self.mid_line {
            writeln!(out)?;
            self.mid_line = false;
        }
        Ok(())
    }

    fn line(&mut self, out: &mut impl Write, text: &str) -> io::Result<()> {
        if self.mid_line {
            writeln!(out)?;
            self.mid_line = false;
        }
        if !text.is_empty() {
            writeln!(out, "{text}")?;
        }
        Ok(())
    }
}

/// First line of `text`, marked when truncated.
fn one_line(text: &str) -> String {
    let mut lines = text.lines();
    let first = lines.next().unwrap_or("");
    if lines.next().is_some() {
        format!("{first} ...")
    } else {
        first.to_string()
    }
}
