use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};

use tracing::{info, warn};

const CONSOLE_ENV_VAR: &str = "WORLD_SERVER_CONSOLE";
const CONSOLE_PORT_ENV_VAR: &str = "WORLD_SERVER_CONSOLE_PORT";
const CONSOLE_DEFAULT_PORT: u16 = 46101;
const OUTBOUND_CAP_BYTES: usize = 256 * 1024;
const READ_CHUNK_BYTES: usize = 1024;

/// Newline-delimited admin lines over localhost TCP. Disabled unless the env flag is set.
#[derive(Debug)]
pub(crate) enum AdminConsole {
    Disabled,
    Enabled(ConsoleListener),
}

#[derive(Debug)]
pub(crate) struct ConsoleListener {
    listener: TcpListener,
    port: u16,
    sessions: Vec<Session>,
}

#[derive(Debug)]
struct Session {
    stream: TcpStream,
    inbound: Vec<u8>,
    outbound: VecDeque<u8>,
}

pub(crate) fn initialize() -> AdminConsole {
    if !console_requested(std::env::var(CONSOLE_ENV_VAR).ok().as_deref()) {
        return AdminConsole::Disabled;
    }
    let port = console_port(std::env::var(CONSOLE_PORT_ENV_VAR).ok().as_deref());
    match ConsoleListener::bind(port) {
        Ok(listener) => {
            info!(port = listener.port, "admin_console_ready");
            AdminConsole::Enabled(listener)
        }
        Err(err) => {
            warn!(error = %err, port, "admin_console_bind_failed_disabled");
            AdminConsole::Disabled
        }
    }
}

fn console_requested(raw: Option<&str>) -> bool {
    raw == Some("1")
}

fn console_port(raw: Option<&str>) -> u16 {
    let Some(raw) = raw else {
        return CONSOLE_DEFAULT_PORT;
    };
    raw.trim().parse().unwrap_or_else(|_| {
        warn!(
            value = raw,
            fallback_port = CONSOLE_DEFAULT_PORT,
            "admin_console_invalid_port_using_default"
        );
        CONSOLE_DEFAULT_PORT
    })
}

impl AdminConsole {
    pub(crate) fn poll_lines(&mut self, out: &mut Vec<String>) {
        if let Self::Enabled(listener) = self {
            listener.poll_lines(out);
        }
    }

    pub(crate) fn send_output_lines(&mut self, lines: &[String]) {
        if let Self::Enabled(listener) = self {
            listener.broadcast(lines);
        }
    }
}

impl ConsoleListener {
    fn bind(port: u16) -> io::Result<Self> {
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], port)))?;
        listener.set_nonblocking(true)?;
        let port = listener.local_addr()?.port();
        Ok(Self {
            listener,
            port,
            sessions: Vec::new(),
        })
    }

    fn poll_lines(&mut self, out: &mut Vec<String>) {
        self.accept_sessions();
        self.sessions.retain_mut(|session| match session.read_lines(out) {
            Ok(true) => true,
            Ok(false) => {
                info!("admin_console_client_disconnected");
                false
            }
            Err(err) => {
                warn!(error = %err, "admin_console_client_read_failed");
                false
            }
        });
        self.flush_sessions();
    }

    fn broadcast(&mut self, lines: &[String]) {
        for session in &mut self.sessions {
            for line in lines {
                session.queue_line(line);
            }
        }
        self.flush_sessions();
    }

    fn accept_sessions(&mut self) {
        loop {
            let (stream, peer) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return,
                Err(err) => {
                    warn!(error = %err, "admin_console_accept_failed");
                    return;
                }
            };
            if let Err(err) = stream.set_nonblocking(true) {
                warn!(error = %err, peer = %peer, "admin_console_client_nonblocking_failed");
                continue;
            }
            if let Err(err) = stream.set_nodelay(true) {
                warn!(error = %err, peer = %peer, "admin_console_client_nodelay_failed");
            }
            info!(peer = %peer, "admin_console_client_connected");
            let mut session = Session::new(stream);
            session.queue_line(&format!("world.console v1 port:{}", self.port));
            self.sessions.push(session);
        }
    }

    fn flush_sessions(&mut self) {
        self.sessions.retain_mut(|session| match session.flush() {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "admin_console_client_write_failed");
                false
            }
        });
    }
}

impl Session {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            inbound: Vec::new(),
            outbound: VecDeque::new(),
        }
    }

    /// Reads whatever is available and splits off complete lines. `Ok(false)` on EOF.
    fn read_lines(&mut self, out: &mut Vec<String>) -> io::Result<bool> {
        let mut chunk = [0u8; READ_CHUNK_BYTES];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Ok(false),
                Ok(read) => {
                    self.inbound.extend_from_slice(&chunk[..read]);
                    split_lines(&mut self.inbound, out);
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(true),
                Err(err) => return Err(err),
            }
        }
    }

    /// Past the cap, whole lines are dropped from the front so the newest output survives.
    fn queue_line(&mut self, line: &str) {
        let needed = line.len() + 1;
        if needed > OUTBOUND_CAP_BYTES {
            return;
        }
        while self.outbound.len() + needed > OUTBOUND_CAP_BYTES {
            let cut = self
                .outbound
                .iter()
                .position(|byte| *byte == b'\n')
                .map_or(self.outbound.len(), |newline| newline + 1);
            self.outbound.drain(..cut);
        }
        self.outbound.extend(line.bytes());
        self.outbound.push_back(b'\n');
    }

    fn flush(&mut self) -> io::Result<()> {
        while !self.outbound.is_empty() {
            let (front, _) = self.outbound.as_slices();
            match self.stream.write(front) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(written) => {
                    self.outbound.drain(..written);
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

fn split_lines(buffer: &mut Vec<u8>, out: &mut Vec<String>) {
    while let Some(newline) = buffer.iter().position(|byte| *byte == b'\n') {
        let raw: Vec<u8> = buffer.drain(..=newline).collect();
        let line = raw.strip_suffix(b"\n").unwrap_or(&raw);
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        match std::str::from_utf8(line) {
            Ok(text) => out.push(text.to_string()),
            Err(err) => warn!(error = %err, "admin_console_invalid_utf8_line_dropped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;

    fn poll_until<F: Fn(&ConsoleListener, &[String]) -> bool>(
        listener: &mut ConsoleListener,
        done: F,
    ) -> Vec<String> {
        let mut out = Vec::new();
        for _ in 0..40 {
            listener.poll_lines(&mut out);
            if done(listener, &out) {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        out
    }

    fn loopback_session() -> (Session, TcpStream) {
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).expect("bind");
        let client = TcpStream::connect(listener.local_addr().expect("addr")).expect("connect");
        let (server_side, _) = listener.accept().expect("accept");
        (Session::new(server_side), client)
    }

    #[test]
    fn env_values_enable_and_pick_the_port() {
        assert!(!console_requested(None));
        assert!(!console_requested(Some("0")));
        assert!(console_requested(Some("1")));
        assert_eq!(console_port(None), CONSOLE_DEFAULT_PORT);
        assert_eq!(console_port(Some(" 47000 ")), 47000);
        assert_eq!(console_port(Some("many")), CONSOLE_DEFAULT_PORT);
    }

    #[test]
    fn split_lines_keeps_the_partial_tail() {
        let mut buffer = b"help\r\nspawn i_ch".to_vec();
        let mut out = Vec::new();
        split_lines(&mut buffer, &mut out);
        assert_eq!(out, vec!["help".to_string()]);
        assert_eq!(buffer, b"spawn i_ch".to_vec());
    }

    #[test]
    fn listener_binds_loopback_and_reads_lines() {
        let mut listener = ConsoleListener::bind(0).expect("bind");
        let addr = listener.listener.local_addr().expect("local_addr");
        assert!(addr.ip().is_loopback());
        let mut client = TcpStream::connect(addr).expect("connect");
        client.write_all(b"purge\ntag 0x1 ").expect("write");
        client.flush().expect("flush");

        let out = poll_until(&mut listener, |_, out| !out.is_empty());
        assert_eq!(out, vec!["purge".to_string()]);
    }

    #[test]
    fn clients_get_the_ready_line_then_broadcasts() {
        let mut listener = ConsoleListener::bind(0).expect("bind");
        let addr = listener.listener.local_addr().expect("local_addr");
        let mut client = TcpStream::connect(addr).expect("connect");
        client
            .set_read_timeout(Some(Duration::from_millis(200)))
            .expect("set_read_timeout");
        poll_until(&mut listener, |listener, _| listener.sessions.len() == 1);

        listener.broadcast(&["deleted 0x1".to_string()]);
        let expected = format!("world.console v1 port:{}\ndeleted 0x1\n", listener.port);
        let mut received = Vec::new();
        let mut chunk = [0u8; 256];
        for _ in 0..20 {
            if received.len() >= expected.len() {
                break;
            }
            match client.read(&mut chunk) {
                Ok(read) => received.extend_from_slice(&chunk[..read]),
                Err(_) => listener.poll_lines(&mut Vec::new()),
            }
        }
        assert_eq!(String::from_utf8(received).expect("utf8"), expected);
    }

    #[test]
    fn closed_clients_are_forgotten() {
        let mut listener = ConsoleListener::bind(0).expect("bind");
        let client = TcpStream::connect(listener.listener.local_addr().expect("addr"))
            .expect("connect");
        poll_until(&mut listener, |listener, _| listener.sessions.len() == 1);
        drop(client);
        poll_until(&mut listener, |listener, _| listener.sessions.is_empty());
        assert!(listener.sessions.is_empty());
    }

    #[test]
    fn outbound_cap_drops_the_oldest_lines() {
        let (mut session, _client) = loopback_session();
        let bulky = "x".repeat(OUTBOUND_CAP_BYTES / 2);
        session.queue_line("first");
        session.queue_line(&bulky);
        session.queue_line(&bulky);
        assert!(session.outbound.len() <= OUTBOUND_CAP_BYTES);
        assert_eq!(session.outbound.front().copied(), Some(b'x'));

        session.queue_line(&"y".repeat(OUTBOUND_CAP_BYTES));
        assert_eq!(session.outbound.back().copied(), Some(b'\n'));
        assert!(!session.outbound.contains(&b'y'));
    }
}
