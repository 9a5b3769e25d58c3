use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::unbounded;

use crate::engine::ScriptEngine;
use crate::structs::{ExecStatus, ScriptExecutionResult};

/// A line holding only this marker ends a script unit.
pub const SCRIPT_END_MARK: &str = ".";

// session reads wake up at this pace to observe the shutdown flag
const READ_TICK: Duration = Duration::from_millis(200);

/// Handle on a running control server.
///
/// The server accepts TCP connections and executes the script units it
/// receives against the shared engine. Executions are serialized through
/// the engine mutex: at most one script runs at a time, whatever the number
/// of connections. Dropping the handle stops the server.
pub struct ControlServer {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    acceptor: Option<JoinHandle<()>>,
}

/// Bind the control endpoint and start accepting connections in the
/// background. Bind or listen failure is returned to the caller and leaves
/// the process untouched.
pub fn start<E>(host: &str, port: u16, engine: Arc<Mutex<E>>) -> io::Result<ControlServer>
where
    E: ScriptEngine + Send + 'static,
{
    let listener = TcpListener::bind((host, port))?;
    let local_addr = listener.local_addr()?;
    let running = Arc::new(AtomicBool::new(true));

    let accept_running = Arc::clone(&running);
    let builder = thread::Builder::new().name("control-accept".into());
    let acceptor = builder.spawn(move || accept_loop(listener, engine, accept_running))?;

    log::info!("control server listening on {local_addr}");
    Ok(ControlServer {
        local_addr,
        running,
        acceptor: Some(acceptor),
    })
}

impl ControlServer {
    /// The bound address, useful when port 0 was requested.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, signal the sessions to wind down and wait for them.
    /// A script execution in progress is allowed to finish.
    pub fn stop(&mut self) {
        let Some(acceptor) = self.acceptor.take() else {
            return;
        };
        self.running.store(false, Ordering::Relaxed);

        // unblock the accept call with a throwaway connection
        let mut wake = self.local_addr;
        if wake.ip().is_unspecified() {
            wake.set_ip(match wake.ip() {
                IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
                IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
            });
        }
        let _ = TcpStream::connect(wake);

        if acceptor.join().is_err() {
            log::error!("control acceptor thread panicked");
        }
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop<E>(listener: TcpListener, engine: Arc<Mutex<E>>, running: Arc<AtomicBool>)
where
    E: ScriptEngine + Send + 'static,
{
    let (tx_done, rx_done) = unbounded::<u64>();
    let mut sessions: HashMap<u64, JoinHandle<()>> = HashMap::new();
    let mut next_id: u64 = 0;

    for conn in listener.incoming() {
        if !running.load(Ordering::Relaxed) {
            break;
        }
        // reap the sessions that signalled completion
        while let Ok(id) = rx_done.try_recv() {
            if let Some(handle) = sessions.remove(&id) {
                let _ = handle.join();
            }
        }
        match conn {
            Ok(stream) => {
                let peer = match stream.peer_addr() {
                    Ok(peer) => peer,
                    Err(e) => {
                        log::debug!("connection vanished before accept completed: {e}");
                        continue;
                    }
                };
                let id = next_id;
                next_id += 1;
                let engine = Arc::clone(&engine);
                let session_running = Arc::clone(&running);
                let tx_done = tx_done.clone();
                let builder = thread::Builder::new().name(format!("control-session-{id}"));
                match builder.spawn(move || {
                    run_session(stream, peer, engine, session_running);
                    let _ = tx_done.send(id);
                }) {
                    Ok(handle) => {
                        sessions.insert(id, handle);
                    }
                    Err(e) => log::error!("cannot spawn session thread: {e}"),
                }
            }
            // an accept failure is local to that connection attempt
            Err(e) => log::warn!("accept failed: {e}"),
        }
    }

    drop(tx_done);
    for (_, handle) in sessions.drain() {
        let _ = handle.join();
    }
    log::info!("control server stopped");
}

fn run_session<E: ScriptEngine>(
    stream: TcpStream,
    peer: SocketAddr,
    engine: Arc<Mutex<E>>,
    running: Arc<AtomicBool>,
) {
    log::info!("control connection from {peer}");
    if let Err(e) = serve_session(&stream, &engine, &running) {
        let result = ScriptExecutionResult::io_error(e.to_string());
        log::warn!(
            "session {peer} ended with {}: {}",
            result.status,
            result.message.unwrap_or_default()
        );
    }
    let _ = stream.shutdown(Shutdown::Both);
    log::info!("control connection {peer} closed");
}

/// Read script units off the connection and execute them one by one.
///
/// Lines accumulate until the end-of-script marker; the peer closing its
/// write side flushes a final partial unit. Read timeouts only serve to
/// observe the shutdown flag.
fn serve_session<E: ScriptEngine>(
    stream: &TcpStream,
    engine: &Arc<Mutex<E>>,
    running: &Arc<AtomicBool>,
) -> io::Result<()> {
    stream.set_read_timeout(Some(READ_TICK))?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream.try_clone()?;

    let mut script = String::new();
    let mut line = String::new();
    loop {
        match reader.read_line(&mut line) {
            Ok(0) => {
                if !script.trim().is_empty() {
                    let result = execute(engine, &script);
                    // the peer may already be gone, nothing to do about it
                    let _ = respond(&mut writer, &result);
                }
                return Ok(());
            }
            Ok(_) => {
                if line.trim_end_matches(['\r', '\n']) == SCRIPT_END_MARK {
                    let result = execute(engine, &script);
                    script.clear();
                    respond(&mut writer, &result)?;
                } else {
                    script.push_str(&line);
                }
                line.clear();
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                // keep any partial line already read
                if !running.load(Ordering::Relaxed) {
                    return Ok(());
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
}

fn execute<E: ScriptEngine>(engine: &Arc<Mutex<E>>, script: &str) -> ScriptExecutionResult {
    let mut engine = match engine.lock() {
        Ok(guard) => guard,
        // a panic in another session must not take the engine down with it
        Err(poisoned) => poisoned.into_inner(),
    };
    match engine.execute(script) {
        Ok(message) => ScriptExecutionResult::ok(message),
        Err(e) => {
            log::warn!("script error: {e}");
            ScriptExecutionResult::script_error(e)
        }
    }
}

fn respond(writer: &mut TcpStream, result: &ScriptExecutionResult) -> io::Result<()> {
    match result.status {
        ExecStatus::Ok => {
            if let Some(message) = &result.message {
                writer.write_all(message.as_bytes())?;
                if !message.ends_with('\n') {
                    writer.write_all(b"\n")?;
                }
            }
            writer.write_all(b"ok\n")?;
        }
        ExecStatus::ScriptError | ExecStatus::IoError => {
            let message = result.message.as_deref().unwrap_or("unknown");
            writer.write_all(format!("error: {message}\n").as_bytes())?;
        }
    }
    writer.flush()
}
