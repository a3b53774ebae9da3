use crate::debugger::event::Event;
use crate::debugger::queue::EventQueue;
use crate::script::StreamKind;
use std::io;
use std::sync::Arc;

/// Debuggee output stream that turns written text into session events.
///
/// Text is buffered until a newline is written, then the whole buffer goes out
/// as a single event. Remaining text is emitted on flush and when capture is dropped.
pub struct OutputCapture {
    queue: Arc<EventQueue>,
    kind: StreamKind,
    buffer: Vec<u8>,
}

impl OutputCapture {
    pub fn new(queue: Arc<EventQueue>, kind: StreamKind) -> Self {
        Self {
            queue,
            kind,
            buffer: vec![],
        }
    }

    fn emit(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let message = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        let event = match self.kind {
            StreamKind::Stdout => Event::Stdout { message },
            StreamKind::Stderr => Event::Stderr { message },
        };
        self.queue.push(event);
    }
}

impl io::Write for OutputCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.buffer.extend_from_slice(buf);
        if buf.contains(&b'\n') {
            self.emit();
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.emit();
        Ok(())
    }
}

impl Drop for OutputCapture {
    fn drop(&mut self) {
        self.emit();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    fn drain(queue: &EventQueue) -> Vec<Event> {
        std::iter::from_fn(|| queue.try_pop()).collect()
    }

    #[test]
    fn test_line_buffering() {
        let queue = Arc::new(EventQueue::new());
        let mut out = OutputCapture::new(queue.clone(), StreamKind::Stdout);

        out.write_all(b"hello").unwrap();
        out.write_all(b"").unwrap();
        assert!(queue.is_empty());
        out.write_all(b", world\n").unwrap();
        out.write_all(b"a\nb").unwrap();

        assert_eq!(
            drain(&queue),
            vec![
                Event::Stdout {
                    message: "hello, world\n".to_string()
                },
                Event::Stdout {
                    message: "a\nb".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_flush_and_drop() {
        let queue = Arc::new(EventQueue::new());
        {
            let mut err = OutputCapture::new(queue.clone(), StreamKind::Stderr);
            err.write_all(b"partial").unwrap();
            err.flush().unwrap();
            err.flush().unwrap();
            err.write_all(b"tail").unwrap();
        }
        assert_eq!(
            drain(&queue),
            vec![
                Event::Stderr {
                    message: "partial".to_string()
                },
                Event::Stderr {
                    message: "tail".to_string()
                },
            ]
        );
    }
}
