//! `rivet chat`: the interactive conversation.

use crate::app::App;
use crate::commands::history::print_conversations;
use rivet_agent::prompts::truncate_chars;
use rivet_config::AgentMode;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

/// Messages shown by `/load`.
const LOAD_PREVIEW_MESSAGES: usize = 6;
const LOAD_PREVIEW_CHARS: usize = 100;

/// One line of user input, classified.
#[derive(Debug, PartialEq, Eq)]
pub enum ReplCommand<'a> {
    Empty,
    Exit,
    New,
    Model(Option<&'a str>),
    History,
    Load(Option<&'a str>),
    Memory(Option<&'a str>),
    Unknown(&'a str),
    Message(&'a str),
}

pub fn parse(line: &str) -> ReplCommand<'_> {
    let line = line.trim();
    if line.is_empty() {
        return ReplCommand::Empty;
    }
    if line == "exit" || line == "quit" {
        return ReplCommand::Exit;
    }
    if !line.starts_with('/') {
        return ReplCommand::Message(line);
    }

    let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let arg = Some(rest.trim()).filter(|r| !r.is_empty());
    match command {
        "/new" => ReplCommand::New,
        "/model" => ReplCommand::Model(arg),
        "/history" => ReplCommand::History,
        "/load" => ReplCommand::Load(arg),
        "/memory" => ReplCommand::Memory(arg),
        other => ReplCommand::Unknown(other),
    }
}

/// Resolve a `/model` argument: a 1-based index into the list or a name in it.
pub fn pick_model<'a>(available: &'a [String], choice: &str) -> Option<&'a str> {
    if let Ok(n) = choice.parse::<usize>() {
        return n.checked_sub(1).and_then(|i| available.get(i)).map(String::as_str);
    }
    available.iter().find(|m| *m == choice).map(String::as_str)
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

pub async fn run(mut app: App) -> anyhow::Result<()> {
    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║          rivet · Interactive Mode            ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  User:      {}", app.user_id);
    println!("  Session:   {}", app.record.id);
    println!("  Model:     {}", app.session.model());
    println!("  Tools:     {}", app.config.tools.enabled.join(", "));
    if let Some(persona) = app.session.persona() {
        println!("  Persona:   {persona}");
    }
    println!();
    println!("  Commands:  exit | quit, /new, /model [n|name], /history, /load <id>, /memory [text]");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;

    while let Some(line) = lines.next_line().await? {
        match parse(&line) {
            ReplCommand::Empty => {}
            ReplCommand::Exit => break,
            ReplCommand::New => {
                app.start_new().await;
                println!("  Started a new conversation ({}).", app.record.id);
            }
            ReplCommand::Model(choice) => switch_model(&mut app, choice),
            ReplCommand::History => match app.history.list(&app.user_id).await {
                Ok(records) => print_conversations(&records),
                Err(e) => eprintln!("  [Error] {e}"),
            },
            ReplCommand::Load(None) => println!("  Usage: /load <conversation id>"),
            ReplCommand::Load(Some(id)) => load(&mut app, id).await,
            ReplCommand::Memory(text) => memory(&mut app, text).await,
            ReplCommand::Unknown(command) => println!("  Unknown command: {command}"),
            ReplCommand::Message(input) => {
                println!();
                print!("  Assistant > ");
                std::io::stdout().flush()?;
                let mode = app.config.agent.mode;
                match app.turn(input, mode).await {
                    Ok(_) => println!(),
                    Err(e) => {
                        println!();
                        eprintln!("  [Error] {e:#}");
                    }
                }
                println!();
            }
        }
        prompt()?;
    }

    app.save().await;
    println!();
    println!("  Goodbye! 👋");
    println!();
    Ok(())
}

fn switch_model(app: &mut App, choice: Option<&str>) {
    let available = &app.config.agent.available_models;
    let Some(choice) = choice else {
        println!("  Available models:");
        for (i, model) in available.iter().enumerate() {
            let marker = if model == app.session.model() { "*" } else { " " };
            println!("   {marker} {}. {model}", i + 1);
        }
        return;
    };

    match pick_model(available, choice) {
        Some(model) => {
            let model = model.to_string();
            info!(model = %model, "Switching model");
            app.session.set_model(model.clone());
            println!("  Switched to {model}.");
        }
        None => println!("  Unknown model: {choice}"),
    }
}

async fn load(app: &mut App, id: &str) {
    app.save().await;
    let record = match app.history.load(id).await {
        Ok(record) => record,
        Err(e) => {
            eprintln!("  [Error] {e}");
            return;
        }
    };

    println!("  Loaded conversation {} ({} messages).", record.id, record.messages.len());
    for message in record.recent(LOAD_PREVIEW_MESSAGES) {
        let content = truncate_chars(&message.content, LOAD_PREVIEW_CHARS);
        println!("    {}: {}", message.role.as_str(), content.replace('\n', " "));
    }
    app.record = record;
    app.session.reset();
}

async fn memory(app: &mut App, text: Option<&str>) {
    let Some(text) = text else {
        match app.session.persona() {
            Some(persona) => println!("  Current persona: {persona}"),
            None => println!("  No persona set. Usage: /memory <text>"),
        }
        return;
    };

    app.session.set_persona(Some(text.to_string()));
    match app.personas.save(&app.user_id, text).await {
        Ok(()) => println!("  Persona saved."),
        Err(e) => eprintln!("  [Error] could not save persona: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_repl_commands() {
        assert_eq!(parse("   "), ReplCommand::Empty);
        assert_eq!(parse("quit"), ReplCommand::Exit);
        assert_eq!(parse("/new"), ReplCommand::New);
        assert_eq!(parse("/model"), ReplCommand::Model(None));
        assert_eq!(parse("/model  2 "), ReplCommand::Model(Some("2")));
        assert_eq!(parse("/load ana_17"), ReplCommand::Load(Some("ana_17")));
        assert_eq!(parse("/memory You are a Go expert"), ReplCommand::Memory(Some("You are a Go expert")));
        assert_eq!(parse("/nope"), ReplCommand::Unknown("/nope"));
        assert_eq!(parse("exit now"), ReplCommand::Message("exit now"));
        assert_eq!(parse(" hello "), ReplCommand::Message("hello"));
    }

    #[test]
    fn model_choice_by_index_or_name() {
        let models = vec!["gpt-4o-mini".to_string(), "gpt-4o".to_string()];
        assert_eq!(pick_model(&models, "2"), Some("gpt-4o"));
        assert_eq!(pick_model(&models, "gpt-4o-mini"), Some("gpt-4o-mini"));
        assert_eq!(pick_model(&models, "0"), None);
        assert_eq!(pick_model(&models, "3"), None);
        assert_eq!(pick_model(&models, "claude"), None);
    }
}
