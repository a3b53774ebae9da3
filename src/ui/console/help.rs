use crate::ui::command::parser;

pub const HELP: &str = r#"
Available debugger client commands:

create_session                      -- create a debugging session and select it
create_file <path>                  -- create a session with source read from file
create_data <label> <text>          -- create a session with inline source (`\n` escapes allowed)
get_sessions, list                  -- list sessions known by the server
use <session id>                    -- select a session
set_source <path>                   -- upload source of the current session
start                               -- start debugging current session
pause                               -- pause current session at the next line
resume                              -- resume paused session
stop                                -- stop debugging current session
add_breakpoint <file:line>          -- add a breakpoint, example: foo.py:10
remove_breakpoint <file:line>       -- remove a breakpoint, example: foo.py:10
set_breakpoints <file:line>...      -- replace all breakpoints of current session
get_breakpoints                     -- list breakpoints of current session
listen                              -- start listening to events of current session
stop_listen                         -- stop listening to events
help <>|<command>                   -- show help
exit, quit                          -- exit the client
"#;

pub const HELP_SERVER: &str = r#"
Available debugger server commands:

start                               -- start the debugger server
stop                                -- stop the debugger server
status                              -- show server status
help                                -- show this help message
exit, quit                          -- stop server if running and exit
"#;

pub const HELP_CREATE_DATA: &str = "\
\x1b[32;1mcreate_data\x1b[0m
Create a session and upload inline source text. First word is a file label, the rest of line is a source text.
Escape sequences `\\n` (new line), `\\t` (tab) and `\\\\` are decoded.

Examples of usage:
create_data demo.py print('hello')\\nprint('world')
";

pub const HELP_BREAKPOINT: &str = "\
\x1b[32;1madd_breakpoint, remove_breakpoint, set_breakpoints\x1b[0m
Manage breakpoints of current session. A breakpoint is accepted only for lines with an executable statement
of uploaded source.

Examples of usage:
add_breakpoint main.py:3        - stop before line 3 of main.py
remove_breakpoint main.py:3     - remove breakpoint
set_breakpoints main.py:1 main.py:5 - replace all breakpoints with two new ones
set_breakpoints                 - remove all breakpoints
";

pub const HELP_LISTEN: &str = "\
\x1b[32;1mlisten\x1b[0m
Subscribe to events of current session: line changes, pauses, program output and completion.
Events are printed as they come. Only one subscription may be active, use `stop_listen` to cancel it.
";

pub const HELP_START: &str = "\
\x1b[32;1mstart\x1b[0m
Run uploaded source of current session. Execution stops at breakpoints, use `resume` to continue
or `stop` to terminate the program. A finished session may be started again.
";

pub const HELP_QUIT: &str = "\
\x1b[32;1mexit, quit\x1b[0m
Exit the client, active event listener is stopped before it.
";

pub fn help_for_command(command: Option<&str>) -> &str {
    match command {
        None => HELP,
        Some(parser::CREATE_DATA_COMMAND) => HELP_CREATE_DATA,
        Some(parser::ADD_BREAKPOINT_COMMAND)
        | Some(parser::REMOVE_BREAKPOINT_COMMAND)
        | Some(parser::SET_BREAKPOINTS_COMMAND) => HELP_BREAKPOINT,
        Some(parser::LISTEN_COMMAND) | Some(parser::STOP_LISTEN_COMMAND) => HELP_LISTEN,
        Some(parser::START_COMMAND) => HELP_START,
        Some(parser::EXIT_COMMAND) | Some(parser::EXIT_COMMAND_SHORT) => HELP_QUIT,
        _ => "unknown command",
    }
}
