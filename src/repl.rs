use crate::demux::Progress;
use crate::export;
use crate::session::{Session, SessionError};
use anyhow::Result;
use colored::*;
use std::io::Write;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
/think [on|off]   toggle or set thinking
/clear            forget the conversation (system prompt is kept)
/history          print the conversation
/system <text>    set the system prompt (empty restores the default)
/ctx <tokens>     set the context window
/temp <t>         set the temperature (0.0 - 1.0)
/reset            restore default settings
/export <path>    write the conversation (md|json|html)
/quit             leave (also Ctrl-D)
Ctrl-C while a reply streams cancels that reply.";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Say(String),
    Think(Option<bool>),
    Clear,
    History,
    System(String),
    Ctx(usize),
    Temp(f32),
    Reset,
    Export(String),
    Help,
    Quit,
    Invalid(String),
}

/// Parses one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(Command::Say(line.to_string()));
    };
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((n, a)) => (n, a.trim()),
        None => (rest, ""),
    };
    let cmd = match name {
        "think" => match arg {
            "" => Command::Think(None),
            "on" => Command::Think(Some(true)),
            "off" => Command::Think(Some(false)),
            other => Command::Invalid(format!("expected on|off, got '{other}'")),
        },
        "clear" => Command::Clear,
        "history" => Command::History,
        "system" => Command::System(arg.to_string()),
        "ctx" => match arg.parse() {
            Ok(n) => Command::Ctx(n),
            Err(_) => Command::Invalid(format!("invalid token count '{arg}'")),
        },
        "temp" => match arg.parse() {
            Ok(t) => Command::Temp(t),
            Err(_) => Command::Invalid(format!("invalid temperature '{arg}'")),
        },
        "reset" => Command::Reset,
        "export" if !arg.is_empty() => Command::Export(arg.to_string()),
        "export" => Command::Invalid("/export needs a path".into()),
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => Command::Invalid(format!("unknown command /{other}")),
    };
    Some(cmd)
}

/// Prints the new part of each progress update: reasoning dimmed, answer plain.
#[derive(Debug, Default)]
pub struct StreamPrinter {
    reasoning_shown: usize,
    answer_shown: usize,
}

impl StreamPrinter {
    pub fn update(&mut self, p: &Progress<'_>) {
        let mut out = std::io::stdout().lock();
        if p.reasoning.len() > self.reasoning_shown {
            let _ = write!(out, "{}", p.reasoning[self.reasoning_shown..].dimmed());
            self.reasoning_shown = p.reasoning.len();
        }
        if p.answer.len() > self.answer_shown {
            if self.answer_shown == 0 && self.reasoning_shown > 0 {
                let _ = write!(out, "\n\n");
            }
            let _ = write!(out, "{}", &p.answer[self.answer_shown..]);
            self.answer_shown = p.answer.len();
        }
        let _ = out.flush();
    }
}

/// Sends one message and streams the reply to stdout.
pub async fn turn(session: &mut Session, text: &str, think: bool) -> Result<(), SessionError> {
    let mut printer = StreamPrinter::default();
    let cancel = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let outcome = session
        .send_until(text, think, cancel, |p| printer.update(p))
        .await?;
    println!();
    if let Some(marker) = &outcome.marker {
        eprintln!("{}", marker.red());
    }
    Ok(())
}

pub async fn run(session: &mut Session, mut think: bool, export_path: Option<&str>) -> Result<()> {
    eprintln!(
        "{} (model {}, think {}). /help for commands.",
        "ollama-chat".bold(),
        session.settings().model_for(think),
        on_off(think)
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", ">".green().bold());
        std::io::stdout().flush()?;
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let Some(cmd) = parse(&line) else { continue };
        match cmd {
            Command::Say(text) => {
                if let Err(e) = turn(session, &text, think).await {
                    eprintln!("{} {}", "error:".red(), e);
                }
            }
            Command::Think(value) => {
                think = value.unwrap_or(!think);
                eprintln!("think {} (model {})", on_off(think), session.settings().model_for(think));
            }
            Command::Clear => {
                session.clear();
                eprintln!("conversation cleared");
            }
            Command::History => {
                for m in session.history() {
                    println!("{}\n{}\n", m.role.to_string().bold(), m.content);
                }
            }
            Command::System(text) => {
                let s = session.settings().clone();
                report(session.save_settings(&text, s.num_ctx, s.temperature), "system prompt updated");
            }
            Command::Ctx(n) => {
                let s = session.settings().clone();
                let system = session.memory().system_instruction().content;
                report(session.save_settings(&system, n, s.temperature), "context window updated");
            }
            Command::Temp(t) => {
                let s = session.settings().clone();
                let system = session.memory().system_instruction().content;
                report(session.save_settings(&system, s.num_ctx, t), "temperature updated");
            }
            Command::Reset => report(session.reset_settings(), "settings reset"),
            Command::Export(path) => match export::save(Path::new(&path), &session.history()) {
                Ok(()) => eprintln!("exported to {path}"),
                Err(e) => eprintln!("{} {:#}", "export error:".red(), e),
            },
            Command::Help => eprintln!("{HELP}"),
            Command::Quit => break,
            Command::Invalid(msg) => eprintln!("{} {}", "error:".red(), msg),
        }
    }
    if let Some(path) = export_path {
        export::save(Path::new(path), &session.history())?;
        eprintln!("exported to {path}");
    }
    Ok(())
}

fn report(res: Result<(), SessionError>, ok: &str) {
    match res {
        Ok(()) => eprintln!("{ok}"),
        Err(e) => eprintln!("{} {}", "error:".red(), e),
    }
}

fn on_off(v: bool) -> &'static str {
    if v { "on" } else { "off" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_message() {
        assert_eq!(parse("  hello there "), Some(Command::Say("hello there".into())));
        assert_eq!(parse("   "), None);
    }

    #[test]
    fn slash_commands() {
        assert_eq!(parse("/think"), Some(Command::Think(None)));
        assert_eq!(parse("/think on"), Some(Command::Think(Some(true))));
        assert_eq!(parse("/ctx 4096"), Some(Command::Ctx(4096)));
        assert_eq!(parse("/temp 0.2"), Some(Command::Temp(0.2)));
        assert_eq!(parse("/system Be brief.  "), Some(Command::System("Be brief.".into())));
        assert_eq!(parse("/system"), Some(Command::System(String::new())));
        assert_eq!(parse("/export out.md"), Some(Command::Export("out.md".into())));
        assert_eq!(parse("/q"), Some(Command::Quit));
    }

    #[test]
    fn bad_arguments_are_reported() {
        assert!(matches!(parse("/think maybe"), Some(Command::Invalid(_))));
        assert!(matches!(parse("/ctx lots"), Some(Command::Invalid(_))));
        assert!(matches!(parse("/export"), Some(Command::Invalid(_))));
        assert!(matches!(parse("/nope"), Some(Command::Invalid(_))));
    }
}
