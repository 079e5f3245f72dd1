use std::str::FromStr;

use anyhow::{anyhow, bail, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use super::{format_elapsed, Timer, TimerColor, TimerStore};

pub const USAGE: &str = "\
commands:
  create [--color COLOR] NAME   add a stopped timer
  start ID | pause ID | stop ID | delete ID
  rename ID NAME                 change the display name
  color ID COLOR                 blue, green, purple, pink, amber or teal
  link ID TASK_ID [URL]          attach a Jira task
  unlink ID                      drop the Jira task
  archive ID | unarchive ID
  list | archived | help | quit
ID may be any unique prefix of a timer id.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerCommand {
    Create { name: String, color: Option<String> },
    Start(String),
    Pause(String),
    Stop(String),
    Delete(String),
    Rename { id: String, name: String },
    Color { id: String, color: String },
    Link { id: String, task_id: String, task_url: String },
    Unlink(String),
    Archive(String),
    Unarchive(String),
    List,
    Archived,
    Help,
    Quit,
}

fn take_id<'a>(words: &mut impl Iterator<Item = &'a str>, verb: &str) -> Result<String> {
    words
        .next()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("`{verb}` needs a timer id"))
}

fn rest(words: impl Iterator<Item = String>) -> String {
    words.collect::<Vec<_>>().join(" ")
}

impl FromStr for TimerCommand {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            bail!("empty command");
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "create" | "new" => {
                let mut color = None;
                let mut name_words = Vec::new();
                while let Some(word) = words.next() {
                    if word == "--color" || word == "-c" {
                        color = Some(
                            words
                                .next()
                                .ok_or_else(|| anyhow!("`--color` needs a value"))?
                                .to_string(),
                        );
                    } else {
                        name_words.push(word.to_string());
                    }
                }
                TimerCommand::Create {
                    name: rest(name_words.into_iter()),
                    color,
                }
            }
            "start" | "resume" => TimerCommand::Start(take_id(&mut words, verb)?),
            "pause" => TimerCommand::Pause(take_id(&mut words, verb)?),
            "stop" => TimerCommand::Stop(take_id(&mut words, verb)?),
            "delete" | "rm" => TimerCommand::Delete(take_id(&mut words, verb)?),
            "rename" => {
                let id = take_id(&mut words, verb)?;
                TimerCommand::Rename {
                    id,
                    name: rest(words.map(str::to_string)),
                }
            }
            "color" => {
                let id = take_id(&mut words, verb)?;
                let color = words
                    .next()
                    .ok_or_else(|| anyhow!("`color` needs a color"))?
                    .to_string();
                TimerCommand::Color { id, color }
            }
            "link" => {
                let id = take_id(&mut words, verb)?;
                let task_id = words
                    .next()
                    .ok_or_else(|| anyhow!("`link` needs a task id"))?
                    .to_string();
                TimerCommand::Link {
                    id,
                    task_id,
                    task_url: words.next().unwrap_or_default().to_string(),
                }
            }
            "unlink" => TimerCommand::Unlink(take_id(&mut words, verb)?),
            "archive" => TimerCommand::Archive(take_id(&mut words, verb)?),
            "unarchive" => TimerCommand::Unarchive(take_id(&mut words, verb)?),
            "list" | "ls" => TimerCommand::List,
            "archived" => TimerCommand::Archived,
            "help" | "?" => TimerCommand::Help,
            "quit" | "exit" => TimerCommand::Quit,
            other => bail!("unknown command `{other}`"),
        };

        Ok(command)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandReply {
    Render(String),
    Quit,
}

/// Maps an id prefix onto a full timer id. Ambiguous or unknown prefixes are
/// passed through unchanged, which the store then treats as unknown.
pub fn resolve_id(timers: &[Timer], prefix: &str) -> String {
    if timers.iter().any(|timer| timer.id == prefix) {
        return prefix.to_string();
    }

    let mut matches = timers.iter().filter(|timer| timer.id.starts_with(prefix));
    match (matches.next(), matches.next()) {
        (Some(timer), None) => timer.id.clone(),
        _ => prefix.to_string(),
    }
}

pub fn render_timers<'a>(timers: impl IntoIterator<Item = &'a Timer>, empty: &str) -> String {
    let lines: Vec<String> = timers
        .into_iter()
        .map(|timer| {
            let short_id: String = timer.id.chars().take(8).collect();
            let mut line = format!(
                "{short_id}  {:<8}{}  {} ({})",
                timer.status.as_str(),
                format_elapsed(timer.time_elapsed),
                timer.name,
                timer.color
            );
            if let Some(task_id) = &timer.jira_task_id {
                line.push_str(&format!(" [{task_id}"));
                if let Some(url) = &timer.jira_task_url {
                    line.push_str(&format!(" {url}"));
                }
                line.push(']');
            }
            line
        })
        .collect();

    if lines.is_empty() {
        empty.to_string()
    } else {
        lines.join("\n")
    }
}

const NO_ACTIVE_TIMERS: &str = "No timers yet. Create one with `create NAME`.";
const NO_ARCHIVED_TIMERS: &str = "No archived timers.";

pub async fn dispatch(store: &TimerStore, command: TimerCommand) -> CommandReply {
    let timers = store.timers().await;
    let resolve = |prefix: &str| resolve_id(&timers, prefix);

    match command {
        TimerCommand::Create { name, color } => {
            let color = match color.map(|raw| raw.parse::<TimerColor>()).transpose() {
                Ok(color) => color,
                Err(err) => {
                    log::debug!("Ignoring create command: {err}");
                    return render_active(store).await;
                }
            };
            store.create_timer(&name, color).await;
        }
        TimerCommand::Start(id) => {
            store.start_timer(&resolve(&id)).await;
        }
        TimerCommand::Pause(id) => {
            store.pause_timer(&resolve(&id)).await;
        }
        TimerCommand::Stop(id) => {
            store.stop_timer(&resolve(&id)).await;
        }
        TimerCommand::Delete(id) => {
            store.delete_timer(&resolve(&id)).await;
        }
        TimerCommand::Rename { id, name } => {
            store.rename_timer(&resolve(&id), &name).await;
        }
        TimerCommand::Color { id, color } => {
            if let Ok(color) = color.parse::<TimerColor>() {
                store.set_timer_color(&resolve(&id), color).await;
            }
        }
        TimerCommand::Link {
            id,
            task_id,
            task_url,
        } => {
            store.link_task(&resolve(&id), &task_id, &task_url).await;
        }
        TimerCommand::Unlink(id) => {
            store.unlink_task(&resolve(&id)).await;
        }
        TimerCommand::Archive(id) => {
            store.set_archived(&resolve(&id), true).await;
        }
        TimerCommand::Unarchive(id) => {
            store.set_archived(&resolve(&id), false).await;
        }
        TimerCommand::List => {}
        TimerCommand::Archived => {
            let snapshot = store.snapshot().await;
            return CommandReply::Render(render_timers(snapshot.archived(), NO_ARCHIVED_TIMERS));
        }
        TimerCommand::Help => return CommandReply::Render(USAGE.to_string()),
        TimerCommand::Quit => return CommandReply::Quit,
    }

    render_active(store).await
}

async fn render_active(store: &TimerStore) -> CommandReply {
    let snapshot = store.snapshot().await;
    CommandReply::Render(render_timers(snapshot.active(), NO_ACTIVE_TIMERS))
}

/// Reads commands line by line until EOF or `quit`, writing each reply.
pub async fn run_console<R, W>(store: &TimerStore, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let reply = match line.parse::<TimerCommand>() {
            Ok(command) => dispatch(store, command).await,
            Err(err) => CommandReply::Render(format!("{err}; try `help`")),
        };

        match reply {
            CommandReply::Render(text) => {
                writer.write_all(text.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
            CommandReply::Quit => break,
        }
    }
    Ok(())
}
