// src/protocol/parser.rs

use crate::protocol::PlanStep;
use regex::{Match, Regex};
use std::sync::LazyLock;
use tracing::debug;

static NUMBERED_STEP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:\*\*)?\s*(?:step\s*)?\d+\s*[.:)]\s*(?:\*\*)?\s*description\s*(?:\*\*)?\s*:\s*(?:\*\*)?\s*(.*)$",
    )
        .expect("numbered step pattern is valid")
});

static STEP_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:\*\*)?\s*step\s*#?\d+").expect("step header pattern is valid"));

static FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:\*\*)?\s*(description|command|validation)\s*(?:\*\*)?\s*:\s*(?:\*\*)?\s*(.*)$",
    )
        .expect("field pattern is valid")
});

const ABSENT_COMMANDS: [&str; 3] = ["n/a", "none", "no command"];

/// Cuts the model's echo of the prompt (and chat-template noise) off the generated text.
pub fn extract_plan_text(raw: &str) -> &str {
    if let Some((_, rest)) = raw.split_once("<|assistant|>") {
        rest
    } else if let Some((_, rest)) = raw.rsplit_once("[/INST]") {
        rest
    } else if let Some((_, rest)) = raw.split_once("Here's the plan") {
        rest
    } else {
        raw
    }
}

/// Parses free-form plan text into ordered steps. Never fails: lines it does
/// not recognize are skipped.
pub fn parse_plan(raw: &str) -> Vec<PlanStep> {
    let mut parser = PlanParser::default();
    for line in raw.lines() {
        parser.feed(line);
    }
    let steps = parser.finish();
    debug!(steps = steps.len(), "parsed plan text");
    steps
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum ParserState {
    #[default]
    SeekingStep,
    InStep,
}

#[derive(Debug, Default)]
struct StepDraft {
    description: Option<String>,
    command: Option<String>,
    validation: Option<String>,
}

impl StepDraft {
    fn described(description: Option<String>) -> Self {
        Self {
            description,
            ..Self::default()
        }
    }

    fn into_step(self) -> Option<PlanStep> {
        let description = self.description?;
        Some(PlanStep {
            description,
            command: self.command,
            validation: self.validation,
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Line<'a> {
    Ignored,
    NumberedStep(&'a str),
    StepHeader,
    Description(&'a str),
    Command(&'a str),
    Validation(&'a str),
}

#[derive(Debug, Default)]
struct PlanParser {
    state: ParserState,
    draft: StepDraft,
    steps: Vec<PlanStep>,
}

impl PlanParser {
    fn feed(&mut self, raw_line: &str) {
        match classify(strip_decorations(raw_line)) {
            Line::Ignored => {}
            Line::NumberedStep(description) => {
                self.flush();
                self.open(StepDraft::described(non_empty(description)));
            }
            Line::StepHeader => {
                self.flush();
                self.open(StepDraft::default());
            }
            Line::Description(description) => {
                let Some(description) = non_empty(description) else {
                    return;
                };
                if self.state == ParserState::InStep && self.draft.description.is_none() {
                    self.draft.description = Some(description);
                } else {
                    // a second description inside one step starts the next step
                    self.flush();
                    self.open(StepDraft::described(Some(description)));
                }
            }
            Line::Command(value) => {
                self.current().command = normalize_command(value);
            }
            Line::Validation(value) => {
                self.current().validation = non_empty(value);
            }
        }
    }

    fn finish(mut self) -> Vec<PlanStep> {
        self.flush();
        self.steps
    }

    fn open(&mut self, draft: StepDraft) {
        self.state = ParserState::InStep;
        self.draft = draft;
    }

    fn current(&mut self) -> &mut StepDraft {
        if self.state == ParserState::SeekingStep {
            self.open(StepDraft::default());
        }
        &mut self.draft
    }

    fn flush(&mut self) {
        if self.state == ParserState::SeekingStep {
            return;
        }
        self.state = ParserState::SeekingStep;
        if let Some(step) = std::mem::take(&mut self.draft).into_step() {
            self.steps.push(step);
        }
    }
}

/// Drops list bullets, heading and quote markers. Bold markers are left
/// for the patterns so `**` inside a value is never touched.
fn strip_decorations(line: &str) -> &str {
    let line = line.trim().trim_start_matches(['-', '•', '#', '>']).trim_start();
    match line.strip_prefix('*') {
        Some(rest) if !rest.starts_with('*') => rest.trim_start(),
        _ => line,
    }
}

/// The value after a field label, minus the closing `**` of a bold marker
/// opened before it.
fn field_value<'a>(line: &'a str, value: Option<Match<'a>>) -> &'a str {
    let Some(value) = value else {
        return "";
    };
    let text = value.as_str().trim_end();
    if line[..value.start()].matches("**").count() % 2 == 1 {
        text.strip_suffix("**").unwrap_or(text)
    } else {
        text
    }
}

fn classify(line: &str) -> Line<'_> {
    if line.is_empty() {
        return Line::Ignored;
    }
    if let Some(caps) = NUMBERED_STEP.captures(line) {
        return Line::NumberedStep(field_value(line, caps.get(1)));
    }
    if let Some(caps) = FIELD.captures(line) {
        let value = field_value(line, caps.get(2));
        return match caps[1].to_ascii_lowercase().as_str() {
            "description" => Line::Description(value),
            "command" => Line::Command(value),
            _ => Line::Validation(value),
        };
    }
    if STEP_HEADER.is_match(line) {
        return Line::StepHeader;
    }
    Line::Ignored
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn normalize_command(value: &str) -> Option<String> {
    let command = value.trim().trim_matches('`').trim();
    if command.is_empty() || ABSENT_COMMANDS.contains(&command.to_ascii_lowercase().as_str()) {
        return None;
    }
    Some(command.to_string())
}
