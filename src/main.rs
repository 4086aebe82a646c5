//! DistrIRC protocol probe
//!
//! Listens for or opens IRC connections, plaintext or TLS, and logs every
//! command it receives. PINGs are answered so that servers keep the session
//! open. All connections are driven from one thread through a `SocketSet`.

use distrirc::connection::LineConnection;
use distrirc::mux::{timeout_from_millis, SocketSet, Waitable};
use distrirc::net::{
    Listener, NetStream, SocketError, TcpServer, TcpSocket, TlsConfig, TlsRuntime, TlsServer,
    TlsStream,
};
use distrirc::protocol::{Command, CommandBuilder, CommandKind, CommandParser};
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

type Peer = Rc<RefCell<LineConnection>>;

/// What the probe does once started
enum Mode {
    Listen(u16),
    Connect { host: String, port: u16 },
}

/// Probe configuration
struct Config {
    mode: Mode,
    /// Use TLS on every connection
    tls: bool,
    cert: Option<PathBuf>,
    key: Option<PathBuf>,
    ca: Option<PathBuf>,
    /// Nickname sent when connecting
    nick: String,
    /// Idle time before exiting; negative waits forever
    timeout_ms: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Listen(distrirc::DEFAULT_PORT),
            tls: false,
            cert: None,
            key: None,
            ca: None,
            nick: distrirc::SHORT_NAME.to_string(),
            timeout_ms: -1,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            let flag = args[i].as_str();
            match flag {
                "--tls" => {
                    config.tls = true;
                    i += 1;
                    continue;
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("{} version {}", distrirc::PROGRAM_NAME, distrirc::VERSION);
                    std::process::exit(0);
                }
                _ => {}
            }

            let Some(value) = args.get(i + 1).cloned() else {
                eprintln!("Error: {flag} requires a value");
                std::process::exit(1);
            };
            match flag {
                "--listen" | "-l" => {
                    config.mode = Mode::Listen(parse_or_exit(&value, "port number"));
                }
                "--connect" | "-c" => {
                    let Some((host, port)) = value.rsplit_once(':') else {
                        eprintln!("Error: --connect expects HOST:PORT");
                        std::process::exit(1);
                    };
                    config.mode = Mode::Connect {
                        host: host.to_string(),
                        port: parse_or_exit(port, "port number"),
                    };
                }
                "--cert" => config.cert = Some(value.into()),
                "--key" => config.key = Some(value.into()),
                "--ca" => config.ca = Some(value.into()),
                "--nick" | "-n" => config.nick = value,
                "--timeout-ms" => config.timeout_ms = parse_or_exit(&value, "timeout"),
                _ => {
                    eprintln!("Unknown argument: {flag}");
                    print_help();
                    std::process::exit(1);
                }
            }
            i += 2;
        }

        config
    }

    fn tls_config(&self) -> TlsConfig {
        let mut tls = TlsConfig::new();
        if let Some(cert) = &self.cert {
            tls = tls.with_certificate(cert);
        }
        if let Some(key) = &self.key {
            tls = tls.with_private_key(key);
        }
        if let Some(ca) = &self.ca {
            tls = tls.with_ca_bundle(ca);
        }
        tls
    }
}

fn parse_or_exit<T: std::str::FromStr>(value: &str, what: &str) -> T {
    value.parse().unwrap_or_else(|_| {
        eprintln!("Error: invalid {what}: {value}");
        std::process::exit(1);
    })
}

fn print_help() {
    println!(
        r#"
DistrIRC protocol probe

USAGE:
    distrirc [OPTIONS]

OPTIONS:
    -l, --listen <PORT>        Accept connections on PORT (default: 6667)
    -c, --connect <HOST:PORT>  Connect to an IRC server instead
        --tls                  Use TLS
        --cert <PATH>          Certificate chain (PEM)
        --key <PATH>           Private key (PEM)
        --ca <PATH>            CA bundle used to verify peers
    -n, --nick <NICK>          Nickname to register with (default: distrirc)
        --timeout-ms <N>       Exit after N ms without activity (default: never)
    -v, --version              Print version information
        --help                 Print this help message

ENVIRONMENT:
    RUST_LOG                   Log filter (default: info)
"#
    );
}

/// Drives every connection from a single `SocketSet`.
struct Probe {
    set: SocketSet,
    listener: Option<Rc<RefCell<Box<dyn Listener>>>>,
    peers: Vec<Peer>,
    parser: CommandParser,
    timeout: Option<Duration>,
}

impl Probe {
    fn new(timeout_ms: i64) -> anyhow::Result<Self> {
        Ok(Self {
            set: SocketSet::new()?,
            listener: None,
            peers: Vec::new(),
            parser: CommandParser::new(),
            timeout: timeout_from_millis(timeout_ms),
        })
    }

    fn listen(&mut self, listener: Box<dyn Listener>) {
        info!(port = listener.local_port(), "Listening");
        let listener = Rc::new(RefCell::new(listener));
        let member: Rc<dyn Waitable> = listener.clone();
        self.set.add(&member);
        self.listener = Some(listener);
    }

    fn add_peer(&mut self, stream: Box<dyn NetStream>) -> Peer {
        let peer = Rc::new(RefCell::new(LineConnection::new(stream)));
        let member: Rc<dyn Waitable> = peer.clone();
        self.set.add(&member);
        self.peers.push(Rc::clone(&peer));
        peer
    }

    fn run(&mut self) -> anyhow::Result<()> {
        loop {
            let Some(ready) = self.set.wait(self.timeout)? else {
                info!(peers = self.peers.len(), "Nothing left to wait for");
                return Ok(());
            };

            let is_listener = self
                .listener
                .as_ref()
                .is_some_and(|listener| same_object(&ready, listener));
            if is_listener {
                self.accept();
            } else if let Some(index) = self.peers.iter().position(|p| same_object(&ready, p)) {
                self.service(index);
            }
        }
    }

    fn accept(&mut self) {
        let Some(listener) = self.listener.clone() else {
            return;
        };
        let accepted = listener.borrow_mut().accept_stream(Some(Duration::ZERO));
        match accepted {
            Ok(Some(stream)) => {
                self.add_peer(stream);
                info!(peers = self.peers.len(), "Peer accepted");
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Accept failed"),
        }
    }

    fn service(&mut self, index: usize) {
        let peer = Rc::clone(&self.peers[index]);
        let result = peer.borrow_mut().read_lines(false);
        match result {
            Ok(lines) => {
                for line in lines {
                    self.handle_line(&peer, &line);
                }
            }
            Err(SocketError::LineTooLong { limit }) => {
                warn!(limit, "Discarded an oversized line");
            }
            Err(e) => {
                info!(reason = %e, "Peer gone");
                self.peers.remove(index);
            }
        }
    }

    fn handle_line(&self, peer: &Peer, line: &[u8]) {
        let command = match self.parser.parse_bytes(line) {
            Ok(command) => command,
            Err(e) => {
                debug!(error = %e, "Skipping line");
                return;
            }
        };
        info!(
            kind = %command.kind(),
            verb = command.verb(),
            source = command.source(),
            args = ?command.args(),
            "Received"
        );

        if command.kind() == CommandKind::Ping {
            let pong = Command::new(CommandKind::Pong, command.args().iter().cloned());
            if let Err(e) = peer.borrow_mut().send_command(&pong) {
                warn!(error = %e, "Failed to answer PING");
            }
        }
    }
}

/// Identity comparison that ignores the vtable half of a fat pointer.
fn same_object<T: ?Sized>(ready: &Rc<dyn Waitable>, other: &Rc<T>) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(ready), Rc::as_ptr(other))
}

fn register(peer: &Peer, nick: &str) -> anyhow::Result<()> {
    let mut conn = peer.borrow_mut();
    conn.send_command(&Command::new(CommandKind::Nick, [nick]))?;
    conn.send_command(
        &CommandBuilder::raw("USER")
            .args([distrirc::SHORT_NAME, distrirc::SHORT_NAME, "localhost", nick])
            .build(),
    )?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!(version = distrirc::VERSION, "{} probe starting", distrirc::PROGRAM_NAME);

    let runtime = if config.tls {
        Some(TlsRuntime::init()?)
    } else {
        None
    };
    let mut probe = Probe::new(config.timeout_ms)?;

    match &config.mode {
        Mode::Listen(port) => {
            let listener: Box<dyn Listener> = match &runtime {
                Some(runtime) => Box::new(TlsServer::listen(runtime, *port, &config.tls_config())?),
                None => Box::new(TcpServer::listen(*port)?),
            };
            probe.listen(listener);
        }
        Mode::Connect { host, port } => {
            let stream: Box<dyn NetStream> = match &runtime {
                Some(runtime) => {
                    let stream = TlsStream::connect(runtime, host, *port, &config.tls_config())?;
                    info!(
                        verified = stream.peer_verified(),
                        peer = ?stream.peer_common_name(),
                        "TLS session established"
                    );
                    Box::new(stream)
                }
                None => Box::new(TcpSocket::connect(host, *port)?),
            };
            info!(%host, port, "Connected");
            let peer = probe.add_peer(stream);
            register(&peer, &config.nick)?;
        }
    }

    probe.run()
}
