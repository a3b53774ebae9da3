use crate::rpc::DebuggerServer;
use crate::ui::command::parser::{
    EXIT_COMMAND, EXIT_COMMAND_SHORT, HELP_COMMAND, START_COMMAND, STATUS_COMMAND, STOP_COMMAND,
};
use crate::ui::command::ServerCommand;
use crate::ui::console::editor::{create_editor, ShellEditor};
use crate::ui::console::help::HELP_SERVER;
use crate::ui::console::print::style::{ErrorView, KeywordView};
use crate::weak_error;
use rustyline::error::ReadlineError;

const WELCOME_TEXT: &str = r#"
Specter debugger server
Type 'help' for commands
"#;
const PROMPT: &str = "(specter-server) ";

/// Interactive shell that controls a local debugger server.
pub struct ServerApplication {
    server: DebuggerServer,
    editor: ShellEditor,
    autostart: bool,
}

impl ServerApplication {
    pub fn new(server: DebuggerServer, autostart: bool) -> anyhow::Result<Self> {
        let editor = create_editor(
            PROMPT,
            [
                START_COMMAND.into(),
                STOP_COMMAND.into(),
                STATUS_COMMAND.into(),
                HELP_COMMAND.into(),
                (EXIT_COMMAND_SHORT, EXIT_COMMAND).into(),
            ],
        )?;
        Ok(Self {
            server,
            editor,
            autostart,
        })
    }

    fn start(&mut self) {
        if self.server.is_running() {
            println!("Server is already running.");
            return;
        }
        match self.server.start() {
            Ok(addr) => println!("Server listening on {}", KeywordView::from(addr)),
            Err(e) => println!("{}", ErrorView::from(format!("error: {e:#}"))),
        }
    }

    fn stop(&mut self) {
        if !self.server.is_running() {
            println!("Server is not running.");
            return;
        }
        match self.server.stop() {
            Ok(()) => println!("Server stopped"),
            Err(e) => println!("{}", ErrorView::from(format!("error: {e:#}"))),
        }
    }

    fn status(&self) {
        match self.server.local_addr().filter(|_| self.server.is_running()) {
            Some(addr) => println!("Server is running on {}", KeywordView::from(addr)),
            None => println!("Server is not running."),
        }
    }

    pub fn run(mut self) -> anyhow::Result<()> {
        println!("{WELCOME_TEXT}");
        if self.autostart {
            self.start();
        }

        loop {
            match self.editor.readline(PROMPT) {
                Ok(input) => {
                    if input.trim().is_empty() {
                        continue;
                    }
                    _ = self.editor.add_history_entry(&input);
                    match ServerCommand::parse(&input) {
                        Ok(ServerCommand::Start) => self.start(),
                        Ok(ServerCommand::Stop) => self.stop(),
                        Ok(ServerCommand::Status) => self.status(),
                        Ok(ServerCommand::Help) => println!("{HELP_SERVER}"),
                        Ok(ServerCommand::Exit) => break,
                        Err(e) => println!("{}", ErrorView::from(e)),
                    }
                }
                Err(ReadlineError::Eof | ReadlineError::Interrupted) => {
                    println!("\nExiting...");
                    break;
                }
                Err(err) => {
                    println!("error: {:#}", err);
                    break;
                }
            }
        }

        if self.server.is_running() {
            weak_error!(self.server.stop(), "stop server:");
        }
        println!("Goodbye!");
        Ok(())
    }
}
