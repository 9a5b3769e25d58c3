use pktforge::control::{self, SCRIPT_END_MARK};
use pktforge::engine::{GeneratorEngine, ScriptEngine};
use pktforge::structs::PortConfig;

use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

fn start_generator() -> (control::ControlServer, Arc<Mutex<GeneratorEngine>>) {
    let mut engine = GeneratorEngine::new((1, 2));
    engine.add_port(0, PortConfig::default());
    let engine = Arc::new(Mutex::new(engine));
    let server = control::start("127.0.0.1", 0, Arc::clone(&engine)).expect("server start");
    (server, engine)
}

/// Send one script unit and collect the reply lines up to the status line.
fn submit(stream: &TcpStream, script: &str) -> Vec<String> {
    let mut writer = stream.try_clone().unwrap();
    writer
        .write_all(format!("{script}\n{SCRIPT_END_MARK}\n").as_bytes())
        .unwrap();
    read_reply(stream)
}

fn read_reply(stream: &TcpStream) -> Vec<String> {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut lines = vec![];
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap() == 0 {
            return lines;
        }
        let line = line.trim_end().to_string();
        let done = line == "ok" || line.starts_with("error:");
        lines.push(line);
        if done {
            return lines;
        }
    }
}

#[test]
fn script_units_execute_in_sequence_on_one_connection() {
    let (mut server, engine) = start_generator();
    let stream = TcpStream::connect(server.local_addr()).unwrap();

    assert_eq!(submit(&stream, "set 0 count 42"), vec!["ok"]);
    let reply = submit(&stream, "show 0");
    assert_eq!(reply.last().unwrap(), "ok");
    assert!(reply[0].contains("count=42"), "{reply:?}");

    assert_eq!(engine.lock().unwrap().port(0).unwrap().count, 42);
    server.stop();
}

#[test]
fn script_error_is_reported_and_session_survives() {
    let (mut server, engine) = start_generator();
    let stream = TcpStream::connect(server.local_addr()).unwrap();

    let reply = submit(&stream, "set 0 count oops");
    assert!(reply[0].starts_with("error: line 1:"), "{reply:?}");

    // same connection, next unit still works
    assert_eq!(submit(&stream, "set 0 count 7"), vec!["ok"]);
    assert_eq!(engine.lock().unwrap().port(0).unwrap().count, 7);
    server.stop();
}

#[test]
fn peer_half_close_flushes_the_final_unit() {
    let (mut server, engine) = start_generator();
    let stream = TcpStream::connect(server.local_addr()).unwrap();

    let mut writer = stream.try_clone().unwrap();
    writer.write_all(b"set 0 size 128\n").unwrap();
    stream.shutdown(Shutdown::Write).unwrap();

    let reply = read_reply(&stream);
    assert_eq!(reply, vec!["ok"]);
    assert_eq!(engine.lock().unwrap().port(0).unwrap().size, 128);
    server.stop();
}

#[test]
fn disconnect_mid_read_leaves_the_server_usable() {
    let (mut server, engine) = start_generator();
    let addr = server.local_addr();

    {
        let stream = TcpStream::connect(addr).unwrap();
        let mut writer = stream.try_clone().unwrap();
        // half a command, no newline, then drop the connection
        writer.write_all(b"set 0 ra").unwrap();
    }

    // another operator is unaffected
    let stream = TcpStream::connect(addr).unwrap();
    assert_eq!(submit(&stream, "set 0 rate 25"), vec!["ok"]);
    assert_eq!(engine.lock().unwrap().port(0).unwrap().rate, 25);
    server.stop();
}

#[test]
fn stop_closes_the_listener() {
    let (mut server, _engine) = start_generator();
    let addr = server.local_addr();
    server.stop();
    assert!(TcpStream::connect(addr).is_err());
}

/// Records execution begin/end pairs so interleaving would be visible.
struct SlowEngine {
    journal: Vec<String>,
}

impl ScriptEngine for SlowEngine {
    fn execute(&mut self, script: &str) -> Result<Option<String>, String> {
        let tag = script.trim().to_string();
        self.journal.push(format!("begin {tag}"));
        thread::sleep(Duration::from_millis(100));
        self.journal.push(format!("end {tag}"));
        Ok(None)
    }
}

#[test]
fn concurrent_connections_never_interleave_executions() {
    let engine = Arc::new(Mutex::new(SlowEngine { journal: vec![] }));
    let mut server = control::start("127.0.0.1", 0, Arc::clone(&engine)).expect("server start");
    let addr = server.local_addr();

    let mut workers = vec![];
    for tag in ["a", "b", "c"] {
        workers.push(thread::spawn(move || {
            let stream = TcpStream::connect(addr).unwrap();
            let reply = submit(&stream, tag);
            assert_eq!(reply, vec!["ok"]);
        }));
    }
    for worker in workers {
        worker.join().unwrap();
    }
    server.stop();

    let guard = engine.lock().unwrap();
    let journal = &guard.journal;
    assert_eq!(journal.len(), 6, "{journal:?}");
    for pair in journal.chunks(2) {
        let tag = pair[0].strip_prefix("begin ").expect("begin first");
        assert_eq!(pair[1], format!("end {tag}"), "interleaved: {journal:?}");
    }
}
