//! Interactive question loop with a per-session transcript

use console::style;
use std::io::{BufRead, Write};
use tracing::warn;

use crate::config::AnswerStrategy;
use crate::error::Result;
use crate::generation::{context_preview, render_answer, Answerer};

/// Who said a transcript line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// One transcript entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

/// A parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Ask a question
    Ask(String),
    /// Restrict to one company; `None` means all companies
    Company(Option<String>),
    /// List indexed companies
    Companies,
    /// Show the context behind the last answer
    Context,
    /// Clear the transcript
    Reset,
    /// Leave the session
    Exit,
    /// Blank line
    Empty,
    /// Unrecognized slash command
    Unknown(String),
}

impl Command {
    /// Parse one line of user input
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        if line.eq_ignore_ascii_case("exit") {
            return Self::Exit;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Self::Ask(line.to_string());
        };

        let mut parts = rest.splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or_default().to_lowercase();
        let arg = parts.next().map(str::trim).filter(|a| !a.is_empty());
        match (name.as_str(), arg) {
            ("company", Some(a)) if a.eq_ignore_ascii_case("all") => Self::Company(None),
            ("company", Some(a)) => Self::Company(Some(a.to_uppercase())),
            ("company", None) => Self::Company(None),
            ("companies", _) => Self::Companies,
            ("context", _) => Self::Context,
            ("reset", _) => Self::Reset,
            ("exit" | "quit", _) => Self::Exit,
            _ => Self::Unknown(line.to_string()),
        }
    }
}

/// State of one chat session
pub struct ChatSession {
    answerer: Answerer,
    strategy: AnswerStrategy,
    company: Option<String>,
    transcript: Vec<Turn>,
    last_context: Option<String>,
}

impl ChatSession {
    /// Start a session, optionally restricted to one company
    pub fn new(answerer: Answerer, strategy: AnswerStrategy, company: Option<String>) -> Self {
        Self {
            answerer,
            strategy,
            company: company.map(|c| c.to_uppercase()),
            transcript: Vec::new(),
            last_context: None,
        }
    }

    /// Completed turns, oldest first
    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    /// Current company filter
    pub fn company(&self) -> Option<&str> {
        self.company.as_deref()
    }

    /// Read lines from `input` until exit or end of input
    pub async fn run<R: BufRead, W: Write>(&mut self, input: R, mut out: W) -> Result<()> {
        self.print_banner(&mut out)?;
        let mut lines = input.lines();
        loop {
            write!(out, "\n{} ", style("you>").green().bold())?;
            out.flush()?;

            let Some(line) = lines.next() else {
                writeln!(out)?;
                break;
            };
            if !self.handle(&line?, &mut out).await? {
                break;
            }
        }
        Ok(())
    }

    /// Process one input line; returns `false` when the session should end
    pub async fn handle<W: Write>(&mut self, line: &str, out: &mut W) -> Result<bool> {
        match Command::parse(line) {
            Command::Empty => {}
            Command::Exit => return Ok(false),
            Command::Ask(question) => self.ask(&question, out).await?,
            Command::Company(company) => {
                self.company = company;
                writeln!(
                    out,
                    "Company filter: {}",
                    self.company.as_deref().unwrap_or("all")
                )?;
            }
            Command::Companies => {
                writeln!(out, "{}", self.answerer.retriever().companies().join(", "))?;
            }
            Command::Context => match &self.last_context {
                Some(context) => writeln!(
                    out,
                    "{}",
                    context_preview(context, self.answerer.config().preview_chars)
                )?,
                None => writeln!(out, "No answer yet.")?,
            },
            Command::Reset => {
                self.transcript.clear();
                self.last_context = None;
                writeln!(out, "Transcript cleared.")?;
            }
            Command::Unknown(cmd) => {
                writeln!(
                    out,
                    "{} {} (try /company, /companies, /context, /reset, /exit)",
                    style("Unknown command:").red(),
                    cmd
                )?;
            }
        }
        Ok(true)
    }

    async fn ask<W: Write>(&mut self, question: &str, out: &mut W) -> Result<()> {
        let answer = match self
            .answerer
            .ask(question, self.company.as_deref(), self.strategy)
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Question failed: {}", e);
                writeln!(out, "{} {}", style("Error:").red().bold(), e)?;
                return Ok(());
            }
        };

        let rendered = render_answer(&answer);
        writeln!(out, "{}", style(&rendered).cyan())?;

        if let Some(context) = answer.context() {
            self.last_context = Some(context.to_string());
        }
        self.transcript.push(Turn {
            role: Role::User,
            content: question.to_string(),
        });
        self.transcript.push(Turn {
            role: Role::Assistant,
            content: rendered,
        });
        Ok(())
    }

    fn print_banner<W: Write>(&self, out: &mut W) -> Result<()> {
        writeln!(
            out,
            "{} - ask questions about 10-K filings",
            style("tenk-rag").magenta().bold()
        )?;
        writeln!(
            out,
            "{}",
            style(format!(
                "{} chunks indexed | company: {} | /company <TICKER|all>, /companies, /context, /reset, exit",
                self.answerer.retriever().len(),
                self.company.as_deref().unwrap_or("all")
            ))
            .dim()
        )?;
        Ok(())
    }
}
