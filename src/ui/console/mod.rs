//! Interactive line shells for debugger client and server.

use crate::debugger::Breakpoint;
use crate::rpc::DebuggerClient;
use crate::ui::command::parser::{
    ADD_BREAKPOINT_COMMAND, CREATE_DATA_COMMAND, CREATE_FILE_COMMAND, CREATE_SESSION_COMMAND,
    EXIT_COMMAND, EXIT_COMMAND_SHORT, GET_BREAKPOINTS_COMMAND, GET_SESSIONS_COMMAND,
    GET_SESSIONS_COMMAND_SHORT, HELP_COMMAND, LISTEN_COMMAND, PAUSE_COMMAND,
    REMOVE_BREAKPOINT_COMMAND, RESUME_COMMAND, SET_BREAKPOINTS_COMMAND, SET_SOURCE_COMMAND,
    START_COMMAND, STOP_COMMAND, STOP_LISTEN_COMMAND, USE_COMMAND,
};
use crate::ui::command::{Command, CommandError, CommandResult};
use crate::ui::console::editor::{
    create_editor, ArgumentHint, CommandCompleter, CommandHint, ShellEditor,
};
use crate::ui::console::help::help_for_command;
use crate::ui::console::print::style::{ErrorView, FilePathView, SessionView};
use crate::ui::console::print::{render_event, ExternalPrinter};
use itertools::Itertools;
use rustyline::error::ReadlineError;
use std::path::Path;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

mod editor;
mod help;
pub mod print;
pub mod server;

const WELCOME_TEXT: &str = r#"
Specter debugger client
Type 'help' for commands
"#;
const PROMPT: &str = "(specter) ";

fn client_commands() -> Vec<CommandHint> {
    vec![
        CREATE_SESSION_COMMAND.into(),
        CommandHint::from(CREATE_FILE_COMMAND).with_argument(ArgumentHint::File),
        CREATE_DATA_COMMAND.into(),
        (GET_SESSIONS_COMMAND_SHORT, GET_SESSIONS_COMMAND).into(),
        USE_COMMAND.into(),
        CommandHint::from(SET_SOURCE_COMMAND).with_argument(ArgumentHint::File),
        START_COMMAND.into(),
        PAUSE_COMMAND.into(),
        RESUME_COMMAND.into(),
        STOP_COMMAND.into(),
        CommandHint::from(ADD_BREAKPOINT_COMMAND).with_argument(ArgumentHint::Breakpoint),
        CommandHint::from(REMOVE_BREAKPOINT_COMMAND).with_argument(ArgumentHint::Breakpoint),
        CommandHint::from(SET_BREAKPOINTS_COMMAND).with_argument(ArgumentHint::Breakpoint),
        GET_BREAKPOINTS_COMMAND.into(),
        LISTEN_COMMAND.into(),
        STOP_LISTEN_COMMAND.into(),
        HELP_COMMAND.into(),
        (EXIT_COMMAND_SHORT, EXIT_COMMAND).into(),
    ]
}

enum Control {
    /// New command from user received
    Cmd(String),
    /// Terminate application
    Terminate,
}

pub struct ClientApplication {
    client: DebuggerClient,
    editor: ShellEditor,
    control_tx: Sender<Control>,
    control_rx: Receiver<Control>,
}

impl ClientApplication {
    pub fn new(client: DebuggerClient) -> anyhow::Result<Self> {
        let (control_tx, control_rx) = mpsc::channel::<Control>();
        let editor = create_editor(PROMPT, client_commands())?;
        Ok(Self {
            client,
            editor,
            control_tx,
            control_rx,
        })
    }

    pub fn run(mut self) -> anyhow::Result<()> {
        let completer = self
            .editor
            .helper_mut()
            .map(|h| Arc::clone(&h.completer))
            .ok_or_else(|| anyhow::anyhow!("editor helper must exists"))?;

        let app_loop = AppLoop {
            client: self.client,
            session_id: None,
            printer: ExternalPrinter::new(&mut self.editor)?,
            event_printer: Arc::new(Mutex::new(ExternalPrinter::new(&mut self.editor)?)),
            completer,
        };

        let mut editor = self.editor;
        let control_tx = self.control_tx;
        let editor_thread = thread::Builder::new()
            .name("editor".to_string())
            .spawn(move || {
                println!("{WELCOME_TEXT}");

                loop {
                    match editor.readline(PROMPT) {
                        Ok(input) => {
                            let trimmed = input.trim();
                            if trimmed == EXIT_COMMAND || trimmed == EXIT_COMMAND_SHORT {
                                _ = control_tx.send(Control::Terminate);
                                break;
                            }
                            if trimmed.is_empty() {
                                continue;
                            }
                            _ = editor.add_history_entry(&input);
                            if control_tx.send(Control::Cmd(input)).is_err() {
                                break;
                            }
                        }
                        Err(ReadlineError::Eof | ReadlineError::Interrupted) => {
                            println!("\nExiting...");
                            _ = control_tx.send(Control::Terminate);
                            break;
                        }
                        Err(err) => {
                            println!("error: {:#}", err);
                            _ = control_tx.send(Control::Terminate);
                            break;
                        }
                    }
                }
            })?;

        app_loop.run(self.control_rx);
        _ = editor_thread.join();
        Ok(())
    }
}

struct AppLoop {
    client: DebuggerClient,
    session_id: Option<String>,
    printer: ExternalPrinter,
    /// Shared with event listener threads.
    event_printer: Arc<Mutex<ExternalPrinter>>,
    completer: Arc<Mutex<CommandCompleter>>,
}

impl AppLoop {
    fn session(&self) -> CommandResult<String> {
        self.session_id.clone().ok_or(CommandError::NoSession)
    }

    fn read_source(path: &Path) -> CommandResult<Vec<u8>> {
        std::fs::read(path).map_err(|e| CommandError::Source(path.to_path_buf(), e))
    }

    fn upload(&mut self, session_id: &str, filename: &str, source: Vec<u8>) -> CommandResult<()> {
        self.client.set_source(session_id, filename, source)?;
        self.completer.lock().unwrap().add_file_hint(filename);
        Ok(())
    }

    fn create_session(&mut self) -> CommandResult<String> {
        let id = self.client.create_session()?;
        self.printer
            .print(format!("Session created with id: {}", SessionView::from(&id)));
        self.session_id = Some(id.clone());
        Ok(id)
    }

    fn print_breakpoint(&self, action: &str, bp: &Breakpoint) {
        self.printer.print(format!(
            "{action} {}:{}",
            FilePathView::from(&bp.filename),
            bp.lineno
        ));
    }

    /// Handle a single command, return false if application must exit.
    fn handle_command(&mut self, cmd: &str) -> CommandResult<bool> {
        match Command::parse(cmd)? {
            Command::CreateSession => {
                self.create_session()?;
            }
            Command::CreateFile(path) => {
                let source = Self::read_source(&path)?;
                let id = self.create_session()?;
                let filename = path.to_string_lossy().to_string();
                self.upload(&id, &filename, source)?;
                self.printer
                    .print(format!("Source set from {}", FilePathView::from(&filename)));
            }
            Command::CreateData { label, text } => {
                let id = self.create_session()?;
                self.upload(&id, &label, text.into_bytes())?;
                self.printer
                    .print(format!("Source set as {}", FilePathView::from(&label)));
            }
            Command::ListSessions => {
                let sessions = self.client.list_sessions()?;
                if sessions.is_empty() {
                    self.printer.print("No active sessions");
                } else {
                    let list = sessions
                        .iter()
                        .map(|id| {
                            let marker = if Some(id) == self.session_id.as_ref() { "*" } else { "-" };
                            format!("  {marker} {}", SessionView::from(id))
                        })
                        .join("\n");
                    self.printer.print(format!("Active sessions:\n{list}"));
                }
            }
            Command::Use(id) => {
                let sessions = self.client.list_sessions()?;
                match sessions.into_iter().find(|s| s.starts_with(&id)) {
                    Some(found) => {
                        self.printer
                            .print(format!("Session {} selected", SessionView::from(&found)));
                        self.session_id = Some(found);
                    }
                    None => self.printer.print(ErrorView::from(format!("unknown session: {id}"))),
                }
            }
            Command::SetSource(path) => {
                let id = self.session()?;
                let source = Self::read_source(&path)?;
                let filename = path.to_string_lossy().to_string();
                self.upload(&id, &filename, source)?;
                self.printer
                    .print(format!("Source set from {}", FilePathView::from(&filename)));
            }
            Command::Start => {
                self.client.start(&self.session()?)?;
                self.printer.print("Started debugging session");
            }
            Command::Pause => {
                self.client.pause(&self.session()?)?;
                self.printer.print("Pause requested");
            }
            Command::Resume => {
                self.client.resume(&self.session()?)?;
                self.printer.print("Resumed debugging session");
            }
            Command::Stop => {
                self.client.stop(&self.session()?)?;
                self.printer.print("Stopped debugging session");
            }
            Command::AddBreakpoint(bp) => {
                self.client
                    .add_breakpoint(&self.session()?, &bp.filename, bp.lineno)?;
                self.print_breakpoint("Added breakpoint at", &bp);
            }
            Command::RemoveBreakpoint(bp) => {
                self.client
                    .remove_breakpoint(&self.session()?, &bp.filename, bp.lineno)?;
                self.print_breakpoint("Removed breakpoint at", &bp);
            }
            Command::SetBreakpoints(breakpoints) => {
                let count = breakpoints.len();
                self.client.set_breakpoints(&self.session()?, breakpoints)?;
                self.printer.print(format!("{count} breakpoint(s) set"));
            }
            Command::GetBreakpoints => {
                let breakpoints = self.client.get_breakpoints(&self.session()?)?;
                if breakpoints.is_empty() {
                    self.printer.print("No breakpoints set");
                } else {
                    self.printer.print("Breakpoints:");
                    breakpoints
                        .iter()
                        .for_each(|bp| self.print_breakpoint("  -", bp));
                }
            }
            Command::Listen => {
                let id = self.session()?;
                if self.client.is_listening() {
                    self.printer.print("Already listening");
                    return Ok(true);
                }
                let printer = Arc::clone(&self.event_printer);
                let error_printer = Arc::clone(&self.event_printer);
                self.client.listen_events(
                    &id,
                    move |event| printer.lock().unwrap().print(render_event(&event)),
                    Some(Box::new(move |e: anyhow::Error| {
                        error_printer
                            .lock()
                            .unwrap()
                            .print(ErrorView::from(format!("event stream closed: {e:#}")))
                    })),
                )?;
                self.printer.print("Started listening to events");
            }
            Command::StopListen => {
                if !self.client.is_listening() {
                    self.printer.print("Not currently listening");
                    return Ok(true);
                }
                if !self.client.stop_listening() {
                    log::warn!(target: "ui", "event listener did not stop in time");
                }
                self.printer.print("Stopped listening to events");
            }
            Command::Help(command) => {
                self.printer.print(help_for_command(command.as_deref()));
            }
            Command::Exit => return Ok(false),
        }

        Ok(true)
    }

    fn run(mut self, control_rx: Receiver<Control>) {
        while let Ok(Control::Cmd(command)) = control_rx.recv() {
            match self.handle_command(&command) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e @ CommandError::Parsing(_)) | Err(e @ CommandError::NoSession) => {
                    self.printer.print(ErrorView::from(e));
                }
                Err(e) => {
                    self.printer.print(ErrorView::from(format!("error: {e:#}")));
                }
            }
        }

        log::debug!(target: "ui", "client shell terminated, closing connection");
        self.client.close();
    }
}
