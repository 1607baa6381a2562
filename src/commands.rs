// Terminal front end: commands typed by the user and the surface they print to

use crate::history::{Confirmer, DeleteOutcome};
use crate::models::NotificationKind;
use crate::notifications::{NotificationEvent, NotificationQueue};
use crate::presentation::{ResultsView, Surface, SynthesisPanel};
use crate::state::AppState;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{BufReader, Lines, Stdin};
use tokio::sync::{broadcast, Mutex};

pub type InputLines = Arc<Mutex<Lines<BufReader<Stdin>>>>;

pub const HELP: &str = "\
Type a prompt and press enter to ask every model.
  /history            refresh and list past conversations
  /open <n>           show conversation n
  /delete <n>         delete conversation n (asks first)
  /move <from> <to>   reorder the list locally
  /notifications      list live notifications
  /dismiss <n>        dismiss notification n
  /help               this text
  /quit               exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Submit(String),
    History,
    Open(usize),
    Delete(usize),
    Move(usize, usize),
    Notifications,
    Dismiss(usize),
    Help,
    Quit,
}

// 1-based on screen, 0-based internally
fn parse_position(arg: Option<&str>, usage: &str) -> Result<usize, String> {
    match arg.map(str::parse::<usize>) {
        Some(Ok(n)) if n >= 1 => Ok(n - 1),
        _ => Err(format!("Usage: {}", usage)),
    }
}

pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    if !line.starts_with('/') {
        // Blank input is still a submission; the controller rejects it.
        return Ok(Command::Submit(line.to_string()));
    }

    let mut parts = line.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let command = match name {
        "/history" | "/h" => Command::History,
        "/open" | "/o" => Command::Open(parse_position(parts.next(), "/open <n>")?),
        "/delete" | "/d" => Command::Delete(parse_position(parts.next(), "/delete <n>")?),
        "/move" | "/m" => {
            let usage = "/move <from> <to>";
            let from = parse_position(parts.next(), usage)?;
            let to = parse_position(parts.next(), usage)?;
            Command::Move(from, to)
        }
        "/notifications" | "/n" => Command::Notifications,
        "/dismiss" => Command::Dismiss(parse_position(parts.next(), "/dismiss <n>")?),
        "/help" | "/?" => Command::Help,
        "/quit" | "/q" | "/exit" => Command::Quit,
        other => return Err(format!("Unknown command '{}'. Type /help for a list.", other)),
    };
    if parts.next().is_some() {
        return Err(format!("Too many arguments for {}", name));
    }
    Ok(command)
}

// --- Surface ---

pub struct TerminalSurface;

impl TerminalSurface {
    fn print_prompt_marker() {
        print!("> ");
        let _ = std::io::stdout().flush();
    }

    pub fn write_results(view: &ResultsView) -> Result<()> {
        let mut out = std::io::stdout().lock();
        if let Some(prompt) = &view.prompt {
            writeln!(out, "\n>>> {}", prompt)?;
        }
        for card in &view.cards {
            let status = if card.succeeded { "ok" } else { "failed" };
            writeln!(out, "\n== {} [{}, {}] ==", card.provider, status, card.latency_label)?;
            writeln!(out, "{}", card.body)?;
        }
        match &view.synthesis {
            Some(SynthesisPanel::Ready { body, provider }) => {
                match provider {
                    Some(provider) => writeln!(out, "\n###### Synthesis (via {}) ######", provider)?,
                    None => writeln!(out, "\n###### Synthesis ######")?,
                }
                writeln!(out, "{}", body)?;
            }
            Some(SynthesisPanel::Unavailable { reason }) => {
                writeln!(out, "\n###### Synthesis unavailable: {} ######", reason)?;
            }
            None => {}
        }
        out.flush().context("Failed to flush results")
    }
}

impl Surface for TerminalSurface {
    fn set_loading(&self, visible: bool) {
        if visible {
            println!("Waiting for responses...");
        }
    }

    fn clear_results(&self) {
        log::debug!("Clearing previous results");
    }

    fn show_results(&self, view: &ResultsView) -> Result<()> {
        Self::write_results(view)
    }

    fn clear_prompt(&self) {
        Self::print_prompt_marker();
    }

    fn show_remaining(&self, remaining: usize, capacity: usize) {
        println!("({} of {} requests left in this window)", remaining, capacity);
    }
}

// --- Confirmation ---

pub struct StdinConfirmer {
    input: InputLines,
}

impl StdinConfirmer {
    pub fn new(input: InputLines) -> Self {
        Self { input }
    }
}

#[async_trait]
impl Confirmer for StdinConfirmer {
    async fn confirm(&self, question: &str) -> bool {
        print!("{} [y/N] ", question);
        let _ = std::io::stdout().flush();
        match self.input.lock().await.next_line().await {
            Ok(Some(answer)) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
            Ok(None) => false,
            Err(e) => {
                log::error!("Failed to read confirmation: {:?}", e);
                false
            }
        }
    }
}

// --- Notifications ---

/// Prints notifications as they appear, until the queue is gone.
pub fn spawn_notification_printer(queue: &NotificationQueue) -> tokio::task::JoinHandle<()> {
    let mut events = queue.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(NotificationEvent::Shown(notification)) => {
                    let marker = match notification.kind {
                        NotificationKind::Error => "[error]",
                        NotificationKind::Success => "[ok]",
                    };
                    println!("{} {}", marker, notification.message);
                }
                Ok(other) => log::debug!("Notification event: {:?}", other),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("Notification printer skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

// --- Dispatch ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

async fn print_history(state: &AppState) {
    let (entries, active) = state.history.snapshot().await;
    if entries.is_empty() {
        println!("No conversations yet.");
        return;
    }
    for entry in state.presenter.history_view(&entries, active.as_ref()) {
        let marker = if entry.active { '*' } else { ' ' };
        let tag = entry
            .context_tag
            .map(|tag| format!(" [{}]", tag))
            .unwrap_or_default();
        println!(
            "{}{:>3}. {}  {}{}",
            marker, entry.position, entry.created_label, entry.preview, tag
        );
    }
}

pub async fn execute(state: &AppState, command: Command, confirmer: &dyn Confirmer) -> Result<Flow> {
    match command {
        Command::Submit(prompt) => {
            // Runs in the background so the user can keep typing; a second
            // prompt meanwhile is turned away by the single-flight guard.
            let controller = state.controller.clone();
            tokio::spawn(async move {
                if let Err(e) = controller.submit(&prompt).await {
                    log::debug!("Submission ended with: {}", e);
                }
            });
        }
        Command::History => {
            if state.history.refresh(state.config.user_id).await.is_ok() {
                print_history(state).await;
            }
        }
        Command::Open(index) => match state.history.id_at(index).await {
            Some(id) => {
                if let Ok(detail) = state.history.select(&id).await {
                    let view = state.presenter.detail_view(&detail);
                    match TerminalSurface::write_results(&view) {
                        Ok(()) if view.has_math => {
                            let _ = state.presenter.typeset("conversation");
                        }
                        Ok(()) => {}
                        Err(e) => {
                            state
                                .notifications
                                .error(format!("Failed to display conversation: {}", e));
                        }
                    }
                }
            }
            None => println!("No conversation at position {}", index + 1),
        },
        Command::Delete(index) => match state.history.id_at(index).await {
            Some(id) => {
                if let Ok(DeleteOutcome::Deleted) = state.history.delete(&id, confirmer).await {
                    print_history(state).await;
                }
            }
            None => println!("No conversation at position {}", index + 1),
        },
        Command::Move(from, to) => {
            if state.history.reorder(from, to).await {
                print_history(state).await;
            } else {
                println!("Positions out of range");
            }
        }
        Command::Notifications => {
            let active = state.notifications.active();
            if active.is_empty() {
                println!("No notifications.");
            }
            for (i, notification) in active.iter().enumerate() {
                println!("{:>3}. {:?}: {}", i + 1, notification.kind, notification.message);
            }
        }
        Command::Dismiss(index) => {
            let target = state.notifications.active().get(index).map(|n| n.id);
            match target {
                Some(id) if state.notifications.dismiss(id) => println!("Dismissed."),
                _ => println!("No notification at position {}", index + 1),
            }
        }
        Command::Help => println!("{}", HELP),
        Command::Quit => return Ok(Flow::Quit),
    }
    Ok(Flow::Continue)
}

/// Reads commands from stdin until `/quit` or end of input.
pub async fn run_loop(state: AppState, input: InputLines) -> Result<()> {
    let confirmer = StdinConfirmer::new(input.clone());
    let _printer = spawn_notification_printer(&state.notifications);

    println!("Connected to {} as user {}. Type /help for commands.", state.config.gateway_url, state.config.user_id);
    if state.history.refresh(state.config.user_id).await.is_ok() {
        print_history(&state).await;
    }

    loop {
        TerminalSurface::print_prompt_marker();
        let line = input
            .lock()
            .await
            .next_line()
            .await
            .context("Failed to read from stdin")?;
        let Some(line) = line else {
            break;
        };

        match parse_command(&line) {
            Ok(command) => {
                if execute(&state, command, &confirmer).await? == Flow::Quit {
                    break;
                }
            }
            Err(message) => println!("{}", message),
        }
    }

    log::info!("Leaving command loop");
    Ok(())
}
