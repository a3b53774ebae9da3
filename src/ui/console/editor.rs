use crossterm::style::{Color, Stylize};
use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::HistoryHinter;
use rustyline::history::MemHistory;
use rustyline::line_buffer::LineBuffer;
use rustyline::{Changeset, CompletionType, Config, Context, Editor};
use rustyline_derive::{Helper, Hinter, Validator};
use std::borrow::Cow;
use std::borrow::Cow::{Borrowed, Owned};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use trie_rs::{Trie, TrieBuilder};

/// What kind of argument a command takes, used for argument completion.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ArgumentHint {
    None,
    /// `<file>:<line>` pairs.
    Breakpoint,
    /// A file path.
    File,
}

pub struct CommandHint {
    short: Option<String>,
    long: String,
    argument: ArgumentHint,
}

impl CommandHint {
    pub fn with_argument(mut self, argument: ArgumentHint) -> Self {
        self.argument = argument;
        self
    }

    fn display_with_short(&self) -> String {
        match self.short {
            Some(ref short) => format!("{}|{}", &self.long, short.clone().bold().underlined()),
            None => self.long.clone(),
        }
    }
}

impl From<&str> for CommandHint {
    fn from(value: &str) -> Self {
        CommandHint {
            short: None,
            long: value.to_string(),
            argument: ArgumentHint::None,
        }
    }
}

impl From<(&str, &str)> for CommandHint {
    fn from((short, long): (&str, &str)) -> Self {
        CommandHint {
            short: Some(short.to_string()),
            long: long.to_string(),
            argument: ArgumentHint::None,
        }
    }
}

fn build_trie<'a>(words: impl IntoIterator<Item = &'a str>) -> Trie<u8> {
    let mut builder = TrieBuilder::new();
    words.into_iter().for_each(|word| builder.push(word));
    builder.build()
}

pub struct CommandCompleter {
    commands: Vec<CommandHint>,
    command_hints: Trie<u8>,
    arguments: HashMap<String, ArgumentHint>,
    files: Vec<String>,
    file_hints: Trie<u8>,
}

impl CommandCompleter {
    pub fn new(commands: impl IntoIterator<Item = CommandHint>) -> Self {
        let commands: Vec<CommandHint> = commands.into_iter().collect();
        let command_hints = build_trie(commands.iter().flat_map(|cmd| {
            std::iter::once(cmd.long.as_str()).chain(cmd.short.as_deref())
        }));
        let arguments = commands
            .iter()
            .flat_map(|cmd| {
                let mut hints = vec![(cmd.long.clone(), cmd.argument)];
                if let Some(ref short) = cmd.short {
                    hints.push((short.clone(), cmd.argument));
                }
                hints
            })
            .collect();

        Self {
            commands,
            command_hints,
            arguments,
            files: vec![],
            file_hints: TrieBuilder::new().build(),
        }
    }

    /// Remember a file name for argument completion.
    pub fn add_file_hint(&mut self, file: &str) {
        if self.files.iter().any(|f| f == file) {
            return;
        }
        self.files.push(file.to_string());
        self.file_hints = build_trie(self.files.iter().map(String::as_str));
    }

    fn commands_with_prefix(&self, prefix: &str) -> Vec<Pair> {
        let matched: Vec<String> = if prefix.is_empty() {
            vec![]
        } else {
            self.command_hints
                .predictive_search(prefix)
                .iter()
                .map(|word| String::from_utf8_lossy(word).into_owned())
                .collect()
        };

        self.commands
            .iter()
            .filter(|cmd| {
                prefix.is_empty()
                    || matched.contains(&cmd.long)
                    || cmd.short.as_ref().is_some_and(|s| matched.contains(s))
            })
            .map(|cmd| Pair {
                display: cmd.display_with_short(),
                replacement: cmd.long.clone(),
            })
            .collect()
    }

    fn files_with_prefix(&self, prefix: &str, suffix: &str) -> Vec<Pair> {
        let variants: Vec<String> = if prefix.is_empty() {
            self.files.clone()
        } else {
            self.file_hints
                .predictive_search(prefix)
                .iter()
                .map(|word| String::from_utf8_lossy(word).into_owned())
                .collect()
        };
        variants
            .into_iter()
            .map(|v| Pair {
                display: v.clone(),
                replacement: v + suffix,
            })
            .collect()
    }
}

impl Completer for CommandCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        _pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Self::Candidate>)> {
        let trimmed = line.trim_start();
        let Some((cmd, rest)) = trimmed.split_once(char::is_whitespace) else {
            let pos = line.len() - trimmed.len();
            return Ok((pos, self.commands_with_prefix(trimmed)));
        };

        let suffix = match self.arguments.get(cmd) {
            Some(ArgumentHint::Breakpoint) => ":",
            Some(ArgumentHint::File) => "",
            _ => return Ok((0, vec![])),
        };
        let token = rest.rsplit(char::is_whitespace).next().unwrap_or_default();
        if token.contains(':') {
            return Ok((0, vec![]));
        }
        let pos = line.len() - token.len();
        Ok((pos, self.files_with_prefix(token, suffix)))
    }
}

#[derive(Helper, Hinter, Validator)]
pub struct RLHelper {
    pub completer: Arc<Mutex<CommandCompleter>>,
    #[rustyline(Hinter)]
    hinter: HistoryHinter,
    pub colored_prompt: String,
}

impl Completer for RLHelper {
    type Candidate = <CommandCompleter as Completer>::Candidate;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Self::Candidate>)> {
        self.completer.lock().unwrap().complete(line, pos, ctx)
    }

    fn update(&self, line: &mut LineBuffer, start: usize, elected: &str, cl: &mut Changeset) {
        self.completer
            .lock()
            .unwrap()
            .update(line, start, elected, cl)
    }
}

impl Highlighter for RLHelper {
    fn highlight_prompt<'b, 's: 'b, 'p: 'b>(
        &'s self,
        prompt: &'p str,
        default: bool,
    ) -> Cow<'b, str> {
        if default {
            Borrowed(&self.colored_prompt)
        } else {
            Borrowed(prompt)
        }
    }

    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Owned(format!("{}", hint.with(Color::Grey)))
    }
}

pub type ShellEditor = Editor<RLHelper, MemHistory>;

pub fn create_editor(
    prompt: &str,
    commands: impl IntoIterator<Item = CommandHint>,
) -> anyhow::Result<ShellEditor> {
    let config = Config::builder()
        .history_ignore_space(true)
        .completion_type(CompletionType::List)
        .build();

    let h = RLHelper {
        completer: Arc::new(Mutex::new(CommandCompleter::new(commands))),
        hinter: HistoryHinter {},
        colored_prompt: format!("{}", prompt.with(Color::DarkGreen)),
    };

    let mut editor = Editor::with_history(config, MemHistory::new())?;
    editor.set_helper(Some(h));
    Ok(editor)
}

#[cfg(test)]
mod test {
    use super::*;
    use rustyline::history::DefaultHistory;

    fn completer() -> CommandCompleter {
        let mut completer = CommandCompleter::new([
            "start".into(),
            "stop".into(),
            "stop_listen".into(),
            ("list", "get_sessions").into(),
            CommandHint::from("add_breakpoint").with_argument(ArgumentHint::Breakpoint),
            CommandHint::from("set_source").with_argument(ArgumentHint::File),
        ]);
        completer.add_file_hint("main.py");
        completer.add_file_hint("module.py");
        completer.add_file_hint("main.py");
        completer
    }

    fn replacements(line: &str) -> (usize, Vec<String>) {
        let history = DefaultHistory::new();
        let ctx = Context::new(&history);
        let (pos, pairs) = completer().complete(line, line.len(), &ctx).unwrap();
        let mut replacements: Vec<String> = pairs.into_iter().map(|p| p.replacement).collect();
        replacements.sort();
        (pos, replacements)
    }

    #[test]
    fn test_complete_command() {
        assert_eq!(
            replacements("st"),
            (0, vec!["start".to_string(), "stop".to_string(), "stop_listen".to_string()])
        );
        assert_eq!(replacements("li"), (0, vec!["get_sessions".to_string()]));
        assert_eq!(replacements("x").1, Vec::<String>::new());
        assert_eq!(replacements("").1.len(), 6);
    }

    #[test]
    fn test_complete_argument() {
        assert_eq!(
            replacements("add_breakpoint ma"),
            (15, vec!["main.py:".to_string()])
        );
        assert_eq!(
            replacements("set_source m").1,
            vec!["main.py".to_string(), "module.py".to_string()]
        );
        assert_eq!(replacements("add_breakpoint main.py:1").1, Vec::<String>::new());
        assert_eq!(replacements("start now").1, Vec::<String>::new());
    }
}
