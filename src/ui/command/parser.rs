use super::{Command, CommandError, CommandResult, ServerCommand};
use crate::debugger::Breakpoint;
use chumsky::error::Rich;
use chumsky::prelude::{any, choice, end, just};
use chumsky::{extra, text, Boxed, IterParser, Parser};
use std::path::PathBuf;

pub const CREATE_SESSION_COMMAND: &str = "create_session";
pub const CREATE_FILE_COMMAND: &str = "create_file";
pub const CREATE_DATA_COMMAND: &str = "create_data";
pub const GET_SESSIONS_COMMAND: &str = "get_sessions";
pub const GET_SESSIONS_COMMAND_SHORT: &str = "list";
pub const USE_COMMAND: &str = "use";
pub const SET_SOURCE_COMMAND: &str = "set_source";
pub const START_COMMAND: &str = "start";
pub const PAUSE_COMMAND: &str = "pause";
pub const RESUME_COMMAND: &str = "resume";
pub const STOP_COMMAND: &str = "stop";
pub const ADD_BREAKPOINT_COMMAND: &str = "add_breakpoint";
pub const REMOVE_BREAKPOINT_COMMAND: &str = "remove_breakpoint";
pub const SET_BREAKPOINTS_COMMAND: &str = "set_breakpoints";
pub const GET_BREAKPOINTS_COMMAND: &str = "get_breakpoints";
pub const LISTEN_COMMAND: &str = "listen";
pub const STOP_LISTEN_COMMAND: &str = "stop_listen";
pub const STATUS_COMMAND: &str = "status";
pub const HELP_COMMAND: &str = "help";
pub const EXIT_COMMAND: &str = "exit";
pub const EXIT_COMMAND_SHORT: &str = "quit";

type Err<'a> = extra::Err<Rich<'a, char>>;

/// Decode `\n`, `\t` and `\\` escapes of inline source text.
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn word<'a>() -> impl chumsky::Parser<'a, &'a str, &'a str, Err<'a>> + Clone {
    any()
        .filter(|c: &char| !c.is_whitespace())
        .repeated()
        .at_least(1)
        .to_slice()
        .padded()
}

fn rest_of_line<'a>(what: &'static str) -> impl chumsky::Parser<'a, &'a str, &'a str, Err<'a>> + Clone {
    any()
        .repeated()
        .to_slice()
        .try_map(move |s: &str, span| {
            let s = s.trim();
            if s.is_empty() {
                Err(Rich::custom(span, format!("expected {what}")))
            } else {
                Ok(s)
            }
        })
}

pub fn path<'a>() -> impl chumsky::Parser<'a, &'a str, PathBuf, Err<'a>> + Clone {
    rest_of_line("file path").map(PathBuf::from)
}

pub fn brkpt_at_line_parser<'a>() -> impl chumsky::Parser<'a, &'a str, Breakpoint, Err<'a>> + Clone {
    any()
        .filter(|c: &char| *c != ':' && !c.is_whitespace())
        .repeated()
        .at_least(1)
        .to_slice()
        .then_ignore(just(':'))
        .then(text::int(10).try_map(|s: &str, span| {
            s.parse::<u32>()
                .ok()
                .filter(|line| *line > 0)
                .ok_or_else(|| Rich::custom(span, format!("invalid line number: {s}")))
        }))
        .map(|(file, line): (&str, u32)| Breakpoint::new(file, line))
        .padded()
        .labelled("<file>:<line>")
}

fn command<'a, O, I>(ctx: &'static str, inner: I) -> Boxed<'a, 'a, &'a str, O, Err<'a>>
where
    O: 'a,
    I: chumsky::Parser<'a, &'a str, O, Err<'a>> + 'a,
{
    inner.then_ignore(end()).labelled(ctx).boxed()
}

fn first_error(errors: Vec<Rich<'_, char>>) -> CommandError {
    let message = errors
        .first()
        .map(ToString::to_string)
        .unwrap_or_else(|| "unknown command".to_string());
    CommandError::Parsing(message)
}

fn unknown_command_hint(e: Rich<'_, char>) -> Rich<'_, char> {
    let span = e.span();
    if span.start == 0 && span.end == 0 {
        Rich::custom(*e.span(), "type help for list of commands")
    } else {
        e
    }
}

impl Command {
    /// Parse input string into command.
    pub fn parse(input: &str) -> CommandResult<Command> {
        Self::parser()
            .parse(input)
            .into_result()
            .map_err(first_error)
    }

    fn parser<'a>() -> impl chumsky::Parser<'a, &'a str, Command, Err<'a>> {
        let op = |sym| just(sym).padded();
        let op2 = |full, short| op(full).or(op(short));

        let create_session = op(CREATE_SESSION_COMMAND).to(Command::CreateSession);
        let create_file = op(CREATE_FILE_COMMAND)
            .ignore_then(path())
            .map(Command::CreateFile)
            .boxed();
        let create_data = op(CREATE_DATA_COMMAND)
            .ignore_then(word())
            .then(rest_of_line("source text"))
            .map(|(label, text): (&str, &str)| Command::CreateData {
                label: label.to_string(),
                text: unescape(text),
            })
            .boxed();
        let list = op2(GET_SESSIONS_COMMAND, GET_SESSIONS_COMMAND_SHORT).to(Command::ListSessions);
        let r#use = op(USE_COMMAND)
            .ignore_then(word())
            .map(|id: &str| Command::Use(id.to_string()))
            .boxed();
        let set_source = op(SET_SOURCE_COMMAND)
            .ignore_then(path())
            .map(Command::SetSource)
            .boxed();

        let start = op(START_COMMAND).to(Command::Start);
        let pause = op(PAUSE_COMMAND).to(Command::Pause);
        let resume = op(RESUME_COMMAND).to(Command::Resume);
        let stop = op(STOP_COMMAND).to(Command::Stop);

        let add_breakpoint = op(ADD_BREAKPOINT_COMMAND)
            .ignore_then(brkpt_at_line_parser())
            .map(Command::AddBreakpoint)
            .boxed();
        let remove_breakpoint = op(REMOVE_BREAKPOINT_COMMAND)
            .ignore_then(brkpt_at_line_parser())
            .map(Command::RemoveBreakpoint)
            .boxed();
        let set_breakpoints = op(SET_BREAKPOINTS_COMMAND)
            .ignore_then(brkpt_at_line_parser().repeated().collect::<Vec<_>>())
            .map(Command::SetBreakpoints)
            .boxed();
        let get_breakpoints = op(GET_BREAKPOINTS_COMMAND).to(Command::GetBreakpoints);

        let listen = op(LISTEN_COMMAND).to(Command::Listen);
        let stop_listen = op(STOP_LISTEN_COMMAND).to(Command::StopListen);

        let help = op(HELP_COMMAND)
            .ignore_then(text::ident().or_not())
            .map(|s: Option<&str>| Command::Help(s.map(ToOwned::to_owned)))
            .padded()
            .boxed();
        let exit = op2(EXIT_COMMAND, EXIT_COMMAND_SHORT).to(Command::Exit);

        choice((
            command(CREATE_SESSION_COMMAND, create_session),
            command(CREATE_FILE_COMMAND, create_file),
            command(CREATE_DATA_COMMAND, create_data),
            command(GET_SESSIONS_COMMAND, list),
            command(USE_COMMAND, r#use),
            command(SET_SOURCE_COMMAND, set_source),
            command(START_COMMAND, start),
            command(PAUSE_COMMAND, pause),
            command(RESUME_COMMAND, resume),
            command(STOP_COMMAND, stop),
            command(ADD_BREAKPOINT_COMMAND, add_breakpoint),
            command(REMOVE_BREAKPOINT_COMMAND, remove_breakpoint),
            command(SET_BREAKPOINTS_COMMAND, set_breakpoints),
            command(GET_BREAKPOINTS_COMMAND, get_breakpoints),
            command(LISTEN_COMMAND, listen),
            command(STOP_LISTEN_COMMAND, stop_listen),
            command(HELP_COMMAND, help),
            command(EXIT_COMMAND, exit),
        ))
        .map_err(unknown_command_hint)
    }
}

impl ServerCommand {
    /// Parse input string into server shell command.
    pub fn parse(input: &str) -> CommandResult<ServerCommand> {
        Self::parser()
            .parse(input)
            .into_result()
            .map_err(first_error)
    }

    fn parser<'a>() -> impl chumsky::Parser<'a, &'a str, ServerCommand, Err<'a>> {
        let op = |sym| just(sym).padded();

        choice((
            op(START_COMMAND).to(ServerCommand::Start),
            op(STOP_COMMAND).to(ServerCommand::Stop),
            op(STATUS_COMMAND).to(ServerCommand::Status),
            op(HELP_COMMAND).to(ServerCommand::Help),
            op(EXIT_COMMAND)
                .or(op(EXIT_COMMAND_SHORT))
                .to(ServerCommand::Exit),
        ))
        .then_ignore(end())
        .map_err(unknown_command_hint)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_simple_commands() {
        struct TestCase {
            inputs: Vec<&'static str>,
            command: Command,
        }
        let cases = vec![
            TestCase {
                inputs: vec!["create_session", "  create_session  "],
                command: Command::CreateSession,
            },
            TestCase {
                inputs: vec!["get_sessions", "list"],
                command: Command::ListSessions,
            },
            TestCase {
                inputs: vec!["start"],
                command: Command::Start,
            },
            TestCase {
                inputs: vec!["stop"],
                command: Command::Stop,
            },
            TestCase {
                inputs: vec!["stop_listen"],
                command: Command::StopListen,
            },
            TestCase {
                inputs: vec!["listen"],
                command: Command::Listen,
            },
            TestCase {
                inputs: vec!["exit", "quit"],
                command: Command::Exit,
            },
            TestCase {
                inputs: vec!["help"],
                command: Command::Help(None),
            },
            TestCase {
                inputs: vec!["help start"],
                command: Command::Help(Some("start".to_string())),
            },
        ];

        for case in cases {
            for input in case.inputs {
                assert_eq!(Command::parse(input).unwrap(), case.command, "input: {input}");
            }
        }
    }

    #[test]
    fn test_argument_commands() {
        assert_eq!(
            Command::parse("create_file ./demo/main.py").unwrap(),
            Command::CreateFile(PathBuf::from("./demo/main.py"))
        );
        assert_eq!(
            Command::parse(r"create_data demo.py print('a')\nx = 1").unwrap(),
            Command::CreateData {
                label: "demo.py".to_string(),
                text: "print('a')\nx = 1".to_string(),
            }
        );
        assert_eq!(
            Command::parse("use 6f1c").unwrap(),
            Command::Use("6f1c".to_string())
        );
        assert_eq!(
            Command::parse("add_breakpoint main.py:10").unwrap(),
            Command::AddBreakpoint(Breakpoint::new("main.py", 10))
        );
        assert_eq!(
            Command::parse("remove_breakpoint ./main.py:3").unwrap(),
            Command::RemoveBreakpoint(Breakpoint::new("main.py", 3))
        );
        assert_eq!(
            Command::parse("set_breakpoints a.py:1 b.py:2").unwrap(),
            Command::SetBreakpoints(vec![Breakpoint::new("a.py", 1), Breakpoint::new("b.py", 2)])
        );
        assert_eq!(
            Command::parse("set_breakpoints").unwrap(),
            Command::SetBreakpoints(vec![])
        );
    }

    #[test]
    fn test_malformed_commands() {
        for input in [
            "",
            "launch",
            "startx",
            "add_breakpoint main.py",
            "add_breakpoint main.py:0",
            "add_breakpoint main.py:99999999999",
            "create_file",
            "create_data label",
            "stop now",
        ] {
            assert!(
                matches!(Command::parse(input), Err(CommandError::Parsing(_))),
                "input: {input}"
            );
        }
    }

    #[test]
    fn test_server_commands() {
        assert_eq!(ServerCommand::parse("start").unwrap(), ServerCommand::Start);
        assert_eq!(ServerCommand::parse(" stop ").unwrap(), ServerCommand::Stop);
        assert_eq!(ServerCommand::parse("status").unwrap(), ServerCommand::Status);
        assert_eq!(ServerCommand::parse("quit").unwrap(), ServerCommand::Exit);
        assert!(ServerCommand::parse("restart").is_err());
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r"a\nb\tc\\d\q"), "a\nb\tc\\d\\q");
        assert_eq!(unescape(r"end\"), "end\\");
    }
}
