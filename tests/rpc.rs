use serial_test::serial;
use specter_debugger::debugger::{Breakpoint, Event, SessionRegistry, DEFAULT_STACK_SIZE};
use specter_debugger::rpc::client::Error;
use specter_debugger::rpc::{ClientOptions, Code, DebuggerClient, DebuggerServer, DebuggerService};
use std::net::SocketAddr;
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(10);

fn setup_server() -> (DebuggerServer, SocketAddr) {
    let service = Arc::new(DebuggerService::new(
        SessionRegistry::new(DEFAULT_STACK_SIZE),
        Duration::from_millis(50),
    ));
    let mut server = DebuggerServer::new(service, "127.0.0.1:0", 4);
    let addr = server.start().unwrap();
    (server, addr)
}

fn connect(addr: SocketAddr) -> DebuggerClient {
    DebuggerClient::connect(addr, ClientOptions::default()).unwrap()
}

fn assert_code<T: std::fmt::Debug>(result: Result<T, Error>, code: Code, message: &str) {
    match result {
        Err(Error::Status(status)) => {
            assert_eq!(status.code, code);
            assert_eq!(status.message, message);
        }
        other => panic!("expected {code} status, got {other:?}"),
    }
}

/// Receive events from listener channel until `Finished` one.
fn recv_until_finish(rx: &mpsc::Receiver<Event>) -> Vec<Event> {
    let deadline = Instant::now() + TIMEOUT;
    let mut events = vec![];
    while Instant::now() < deadline {
        if let Ok(event) = rx.recv_timeout(Duration::from_millis(100)) {
            let last = event.is_terminal();
            events.push(event);
            if last {
                return events;
            }
        }
    }
    panic!("stream not finished in time, got: {events:?}");
}

fn recv_until(rx: &mpsc::Receiver<Event>, expected: &Event) -> Vec<Event> {
    let deadline = Instant::now() + TIMEOUT;
    let mut events = vec![];
    while Instant::now() < deadline {
        if let Ok(event) = rx.recv_timeout(Duration::from_millis(100)) {
            let found = &event == expected;
            events.push(event);
            if found {
                return events;
            }
        }
    }
    panic!("event {expected:?} not received, got: {events:?}");
}

fn line(filename: &str, lineno: u32) -> Event {
    Event::LineChanged {
        filename: filename.to_string(),
        lineno,
    }
}

#[test]
#[serial]
fn test_server_start_stop() {
    let (mut server, addr) = setup_server();
    assert!(server.is_running());
    assert_eq!(server.local_addr(), Some(addr));

    let mut client = connect(addr);
    assert!(client.list_sessions().unwrap().is_empty());
    client.close();

    server.stop().unwrap();
    assert!(!server.is_running());
}

#[test]
#[serial]
fn test_session_lifecycle_over_rpc() {
    let (mut server, addr) = setup_server();
    let mut client = connect(addr);

    let id = client.create_session().unwrap();
    assert_eq!(client.list_sessions().unwrap(), vec![id.clone()]);
    client
        .set_source(&id, "main.py", b"x = 1\nprint(x)\n".to_vec())
        .unwrap();

    let (tx, rx) = mpsc::channel();
    client
        .listen_events(
            &id,
            move |event| {
                _ = tx.send(event);
            },
            None,
        )
        .unwrap();
    assert!(client.is_listening());
    assert_eq!(client.listening_session(), Some(id.as_str()));

    client.start(&id).unwrap();
    assert_eq!(
        recv_until_finish(&rx),
        vec![
            Event::Started,
            line("main.py", 1),
            line("main.py", 2),
            Event::Stdout {
                message: "1\n".to_string()
            },
            Event::Finished {
                status: "success".to_string()
            },
        ]
    );

    assert!(client.stop_listening());
    assert!(!client.is_listening());
    client.close();
    server.stop().unwrap();
}

#[test]
#[serial]
fn test_breakpoints_over_rpc() {
    let (mut server, addr) = setup_server();
    let mut client = connect(addr);

    let id = client.create_session().unwrap();
    client
        .set_source(&id, "bp.py", b"a = 1\nb = 2\nc = 3\n".to_vec())
        .unwrap();
    client.add_breakpoint(&id, "bp.py", 2).unwrap();
    assert_eq!(
        client.get_breakpoints(&id).unwrap(),
        vec![Breakpoint::new("bp.py", 2)]
    );
    assert_code(
        client.add_breakpoint(&id, "bp.py", 42),
        Code::FailedPrecondition,
        "Cannot add breakpoint",
    );
    assert_code(
        client.remove_breakpoint(&id, "bp.py", 3),
        Code::FailedPrecondition,
        "Cannot remove breakpoint",
    );

    let (tx, rx) = mpsc::channel();
    client
        .listen_events(
            &id,
            move |event| {
                _ = tx.send(event);
            },
            None,
        )
        .unwrap();
    client.start(&id).unwrap();

    let events = recv_until(&rx, &Event::Paused);
    assert_eq!(events.last(), Some(&Event::Paused));
    assert!(events.contains(&line("bp.py", 2)));
    assert_code(client.pause(&id), Code::FailedPrecondition, "Session already paused");

    client.resume(&id).unwrap();
    let events = recv_until_finish(&rx);
    assert_eq!(events.first(), Some(&Event::Resumed));
    assert_eq!(
        events.last(),
        Some(&Event::Finished {
            status: "success".to_string()
        })
    );

    client
        .set_breakpoints(&id, vec![Breakpoint::new("bp.py", 1), Breakpoint::new("bp.py", 3)])
        .unwrap();
    assert_eq!(client.get_breakpoints(&id).unwrap().len(), 2);

    client.close();
    server.stop().unwrap();
}

#[test]
#[serial]
fn test_stop_paused_session_over_rpc() {
    let (mut server, addr) = setup_server();
    let mut client = connect(addr);

    let id = client.create_session().unwrap();
    client
        .set_source(&id, "loop.py", b"i = 0\nwhile True:\n    i = i + 1\n".to_vec())
        .unwrap();
    client.add_breakpoint(&id, "loop.py", 3).unwrap();

    let (tx, rx) = mpsc::channel();
    client
        .listen_events(
            &id,
            move |event| {
                _ = tx.send(event);
            },
            None,
        )
        .unwrap();
    client.start(&id).unwrap();
    recv_until(&rx, &Event::Paused);

    client.stop(&id).unwrap();
    let events = recv_until_finish(&rx);
    assert_eq!(
        events.last(),
        Some(&Event::Finished {
            status: "stopped".to_string()
        })
    );
    assert_code(client.stop(&id), Code::FailedPrecondition, "Session not running");

    client.close();
    server.stop().unwrap();
}

#[test]
#[serial]
fn test_unknown_session() {
    let (mut server, addr) = setup_server();
    let mut client = connect(addr);

    let missing = "00000000-0000-0000-0000-000000000000";
    assert_code(client.start(missing), Code::NotFound, "Session not found");
    assert_code(
        client.get_breakpoints("not-an-id"),
        Code::NotFound,
        "Session not found",
    );
    assert!(matches!(
        client.listen_events(missing, |_| {}, None),
        Err(Error::Status(_))
    ));
    assert!(!client.is_listening());

    client.close();
    server.stop().unwrap();
}

#[test]
#[serial]
fn test_second_listener_rejected_locally() {
    let (mut server, addr) = setup_server();
    let mut client = connect(addr);

    let id = client.create_session().unwrap();
    client.listen_events(&id, |_| {}, None).unwrap();
    assert!(matches!(
        client.listen_events(&id, |_| {}, None),
        Err(Error::AlreadyListening(_))
    ));
    assert!(client.stop_listening());
    assert!(!client.stop_listening());

    client.close();
    server.stop().unwrap();
}

#[test]
#[serial]
fn test_unnormalized_breakpoints_over_rpc() {
    let (mut server, addr) = setup_server();
    let mut client = connect(addr);

    let id = client.create_session().unwrap();
    client
        .set_source(&id, "m.py", b"a = 1\nb = 2\nc = 3\n".to_vec())
        .unwrap();
    client
        .set_breakpoints(&id, vec![Breakpoint::new("./m.py", 2), Breakpoint::new("m.py", 2)])
        .unwrap();
    assert_eq!(
        client.get_breakpoints(&id).unwrap(),
        vec![Breakpoint::new("m.py", 2)]
    );
    client.remove_breakpoint(&id, "./m.py", 2).unwrap();
    assert!(client.get_breakpoints(&id).unwrap().is_empty());

    client.add_breakpoint(&id, "./m.py", 2).unwrap();
    let (tx, rx) = mpsc::channel();
    client
        .listen_events(
            &id,
            move |event| {
                _ = tx.send(event);
            },
            None,
        )
        .unwrap();
    client.start(&id).unwrap();
    let events = recv_until(&rx, &Event::Paused);
    assert!(events.contains(&line("m.py", 2)));

    client.stop(&id).unwrap();
    recv_until_finish(&rx);
    client.close();
    server.stop().unwrap();
}

#[test]
fn test_request_timeout() {
    // accepts connections but never answers
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let acceptor = std::thread::spawn(move || listener.accept().map(|(stream, _)| stream));

    let options = ClientOptions {
        request_timeout: Duration::from_millis(200),
        ..ClientOptions::default()
    };
    let mut client = DebuggerClient::connect(addr, options).unwrap();
    let _stream = acceptor.join().unwrap().unwrap();

    let begin = Instant::now();
    assert!(matches!(client.create_session(), Err(Error::Transport(_))));
    assert!(begin.elapsed() < TIMEOUT);
}

#[test]
#[serial]
fn test_server_stop_ends_listener_quietly() {
    let (mut server, addr) = setup_server();
    let mut client = connect(addr);

    let id = client.create_session().unwrap();
    let (err_tx, err_rx) = mpsc::channel();
    client
        .listen_events(
            &id,
            |_| {},
            Some(Box::new(move |e| {
                _ = err_tx.send(e.to_string());
            })),
        )
        .unwrap();

    server.stop().unwrap();
    let deadline = Instant::now() + TIMEOUT;
    while client.is_listening() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(!client.is_listening());
    assert!(err_rx.recv_timeout(Duration::from_millis(200)).is_err());
    assert!(client.stop_listening());
}
