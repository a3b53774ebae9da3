use crate::debugger::Event;
use rustyline::history::History;
use rustyline::{Editor, ExternalPrinter as RLExternalPrinter, Helper};
use std::cell::RefCell;
use std::fmt::Display;

/// [`ExternalPrinter`] safe print messages to stdout while a prompt is active.
///
/// External printer does not play well with integration tests, so it is disabled
/// when compiled with `int_test` feature.
pub struct ExternalPrinter {
    printer: Option<RefCell<Box<dyn RLExternalPrinter>>>,
}

// each printer instance is owned by a single thread at a time
unsafe impl Send for ExternalPrinter {}

impl ExternalPrinter {
    #[cfg(not(feature = "int_test"))]
    pub fn new<H: Helper, I: History>(editor: &mut Editor<H, I>) -> rustyline::Result<Self> {
        let external_p = editor.create_external_printer()?;
        Ok(Self {
            printer: Some(RefCell::new(Box::new(external_p))),
        })
    }

    #[cfg(feature = "int_test")]
    pub fn new<H: Helper, I: History>(_editor: &mut Editor<H, I>) -> rustyline::Result<Self> {
        Ok(Self { printer: None })
    }

    pub fn print(&self, msg: impl Display) {
        let msg = msg.to_string();
        match &self.printer {
            None => {
                println!("{msg}")
            }
            Some(printer) => {
                if printer.borrow_mut().print(msg.clone()).is_err() {
                    println!("{msg}");
                }
            }
        }
    }
}

pub mod style {
    use crossterm::style::{Color, Stylize};
    use std::fmt::{Display, Formatter};

    struct View<T: Display> {
        inner: T,
        color: Color,
    }

    impl<T: Display> Display for View<T> {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            let text = self.inner.to_string();
            if cfg!(feature = "int_test") {
                f.write_str(&text)
            } else {
                f.write_fmt(format_args!("{}", text.with(self.color)))
            }
        }
    }

    /// Construct structure declaration to display data of the same type (file paths, session ids, etc.).
    /// A display style will reset if program compile with `int_test` feature.
    macro_rules! view_struct {
        ($name: ident, $color: expr) => {
            pub struct $name<T: Display>(View<T>);

            impl<T: Display> From<T> for $name<T> {
                fn from(value: T) -> Self {
                    Self(View {
                        inner: value,
                        color: $color,
                    })
                }
            }

            impl<T: Display> Display for $name<T> {
                fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                    self.0.fmt(f)
                }
            }
        };
    }

    view_struct!(SessionView, Color::Blue);
    view_struct!(FilePathView, Color::Green);
    view_struct!(KeywordView, Color::Magenta);
    view_struct!(StdoutView, Color::Reset);
    view_struct!(StderrView, Color::DarkRed);
    view_struct!(ErrorView, Color::Red);
}

/// Human readable event representation.
pub fn render_event(event: &Event) -> String {
    use style::{FilePathView, KeywordView, StderrView, StdoutView};

    match event {
        Event::LineChanged { filename, lineno } => {
            format!("[EVENT] Line changed: {}:{lineno}", FilePathView::from(filename))
        }
        Event::Started => format!("[EVENT] {}", KeywordView::from("Started")),
        Event::Paused => format!("[EVENT] {}", KeywordView::from("Paused")),
        Event::Resumed => format!("[EVENT] {}", KeywordView::from("Resumed")),
        Event::Finished { status } => {
            format!("[EVENT] {}: {status}", KeywordView::from("Finished"))
        }
        Event::Stdout { message } => {
            format!("[STDOUT] {}", StdoutView::from(message.trim_end_matches('\n')))
        }
        Event::Stderr { message } => {
            format!("[STDERR] {}", StderrView::from(message.trim_end_matches('\n')))
        }
    }
}
