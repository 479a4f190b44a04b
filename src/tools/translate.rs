// src/tools/translate.rs

use crate::context::TargetShell;

/// Prefix written for Unix commands that have no Windows counterpart.
pub const SKIP_MARKER: &str = "rem Skipping";

/// Rewrites Unix shell idioms into the target shell's equivalents.
///
/// Rules match on the first word of the command and are tried in a fixed
/// order; the first match wins. Anything unrecognised passes through as-is.
#[derive(Clone, Copy, Debug)]
pub struct CommandTranslator {
    target: TargetShell,
}

impl CommandTranslator {
    pub fn new(target: TargetShell) -> Self {
        Self { target }
    }

    pub fn target(&self) -> TargetShell {
        self.target
    }

    pub fn translate(&self, command: &str) -> String {
        let command = command.trim().trim_matches('`').trim();
        match self.target {
            TargetShell::Posix => command.to_string(),
            TargetShell::Windows => to_windows(command).unwrap_or_else(|| command.to_string()),
        }
    }
}

/// True for commands the translator replaced with a no-op remark.
pub fn is_skip_marker(command: &str) -> bool {
    command
        .trim_start()
        .to_ascii_lowercase()
        .starts_with(&SKIP_MARKER.to_ascii_lowercase())
}

fn to_windows(command: &str) -> Option<String> {
    let (program, rest) = match command.split_once(char::is_whitespace) {
        Some((program, rest)) => (program, rest.trim()),
        None => (command, ""),
    };

    let translated = match program {
        "rm" => remove(rest)?,
        "touch" if !rest.is_empty() => args(rest)
            .iter()
            .map(|file| format!("type nul > {}", windows_path(file)))
            .collect::<Vec<_>>()
            .join(" & "),
        "echo" if rest.starts_with("-e ") => echo_lines(rest["-e ".len()..].trim())?,
        "ls" => {
            let paths: Vec<String> = args(rest)
                .iter()
                .filter(|arg| !arg.starts_with('-'))
                .map(|arg| windows_path(arg))
                .collect();
            with_args("dir", &paths.join(" "))
        }
        "pwd" if rest.is_empty() => "cd".to_string(),
        "chmod" => format!("{SKIP_MARKER} chmod (not needed on Windows)"),
        "cat" if !rest.is_empty() => with_args("type", &paths_of(rest)),
        "nano" | "vi" | "vim" if !rest.is_empty() => with_args("notepad", &paths_of(rest)),
        "mkdir" if !rest.is_empty() => {
            let paths: Vec<String> = args(rest)
                .iter()
                .filter(|arg| **arg != "-p")
                .map(|arg| windows_path(arg))
                .collect();
            with_args("mkdir", &paths.join(" "))
        }
        "cp" if !rest.is_empty() => with_args("copy", &paths_of(rest)),
        "mv" if !rest.is_empty() => with_args("move", &paths_of(rest)),
        "clear" if rest.is_empty() => "cls".to_string(),
        "which" if !rest.is_empty() => with_args("where", rest),
        _ => run_local(program, rest)?,
    };

    Some(translated)
}

fn remove(rest: &str) -> Option<String> {
    let args = args(rest);
    let (flags, targets): (Vec<&str>, Vec<&str>) =
        args.iter().partition(|arg| arg.starts_with('-'));
    if targets.is_empty() {
        return None;
    }
    let recursive = flags.iter().any(|flag| match flag.strip_prefix("--") {
        Some(long) => long == "recursive",
        None => flag.contains(['r', 'R']),
    });
    let targets = targets
        .iter()
        .map(|target| windows_path(target))
        .collect::<Vec<_>>()
        .join(" ");
    Some(if recursive {
        format!("rmdir /s /q {targets}")
    } else {
        format!("del {targets}")
    })
}

/// `echo -e "a\nb" > file` becomes `(echo a& echo b) > file`.
fn echo_lines(body: &str) -> Option<String> {
    let (content, redirect) = split_redirect(body);
    let content = content.trim().trim_matches(|c: char| c == '"' || c == '\'');
    let lines: Vec<String> = content
        .split("\\n")
        .map(|line| {
            if line.is_empty() {
                "echo.".to_string()
            } else {
                format!("echo {line}")
            }
        })
        .collect();
    if lines.is_empty() {
        return None;
    }

    let echoed = if lines.len() == 1 {
        lines[0].clone()
    } else {
        format!("({})", lines.join("& "))
    };
    Some(match redirect {
        Some((op, target)) => format!("{echoed} {op} {}", windows_path(target)),
        None => echoed,
    })
}

/// Splits `text > file` at the last redirect outside quotes.
fn split_redirect(text: &str) -> (&str, Option<(&str, &str)>) {
    let mut quote: Option<char> = None;
    let mut found = None;
    let bytes = text.as_bytes();
    for (i, c) in text.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (None, '"' | '\'') => quote = Some(c),
            (None, '>') => {
                if found.is_some_and(|start: usize| start + 1 == i) {
                    continue;
                }
                found = Some(i);
            }
            _ => {}
        }
    }
    let Some(start) = found else {
        return (text, None);
    };
    let append = bytes.get(start + 1) == Some(&b'>');
    let op_len = if append { 2 } else { 1 };
    let target = text[start + op_len..].trim();
    if target.is_empty() {
        return (text, None);
    }
    let op = if append { ">>" } else { ">" };
    (&text[..start], Some((op, target)))
}

fn run_local(program: &str, rest: &str) -> Option<String> {
    let script = program.strip_prefix("./")?;
    if script.is_empty() {
        return None;
    }
    let translated = if script.ends_with(".py") {
        with_args(&format!("python {}", windows_path(script)), rest)
    } else {
        with_args(&format!(".\\{}", windows_path(script)), rest)
    };
    Some(translated)
}

fn args(rest: &str) -> Vec<&str> {
    rest.split_whitespace().collect()
}

fn paths_of(rest: &str) -> String {
    args(rest)
        .iter()
        .map(|arg| windows_path(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

fn windows_path(path: &str) -> String {
    path.replace('/', "\\")
}

fn with_args(program: &str, args: &str) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{program} {args}")
    }
}
