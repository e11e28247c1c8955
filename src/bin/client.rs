//! Proxy client entry point (§4.2, §4.6, §5): two threads — a
//! server-listener and a frontend-listener — each read one message, fold
//! it into the shared [`ClientState`] under one mutex, and emit at most
//! one outgoing message to the opposite party. Any fatal error on either
//! thread triggers a shared shutdown that tears down both transports.

use clap::Parser;
use robots::client_state::ClientState;
use robots::codec::{ClientToServer, FrontendToClient, ServerToClient};
use robots::error::CodecError;
use robots::options::{split_address, ClientArgs};
use robots::transport::{DatagramTransport, StreamTransport, WireWrite};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::sync::{Arc, Condvar, Mutex};

fn main() {
    let args = ClientArgs::parse();
    robots::logging::init(args.verbose);

    if let Err(e) = args.validate() {
        eprintln!("ERROR : {e}");
        std::process::exit(1);
    }

    if let Err(e) = run(args) {
        eprintln!("ERROR : {e}");
        std::process::exit(1);
    }
}

/// Signals the first fatal error on either worker thread so the main
/// thread can close both transports and join the workers. Mirrors the
/// original `end_mutex`/`end_condition`/`end` flag.
#[derive(Default)]
struct Shutdown {
    mutex: Mutex<bool>,
    condvar: Condvar,
}

impl Shutdown {
    fn signal(&self) {
        let mut ended = self.mutex.lock().unwrap();
        if !*ended {
            *ended = true;
            self.condvar.notify_all();
        }
    }

    fn wait(&self) {
        let guard = self.mutex.lock().unwrap();
        let _ = self.condvar.wait_while(guard, |ended| !*ended).unwrap();
    }
}

/// Resolves `host:port` to one concrete address, attempting both IPv4 and
/// IPv6 via the system resolver (§6) and taking the first candidate. Used
/// for the frontend address, which is only ever a `send_to` target (UDP has
/// no handshake to retry across candidates).
fn resolve_one(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| anyhow::anyhow!("could not resolve address {host}:{port}"))
}

/// Resolves `host:port` and tries every candidate in turn, mirroring
/// `boost::asio::connect(socket, endpoints)` iterating a resolver's full
/// result set (both IPv4 and IPv6 addresses a hostname may carry) rather
/// than giving up after the first address fails to accept a connection.
fn connect_any(host: &str, port: u16) -> anyhow::Result<TcpStream> {
    let mut last_err = None;
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect(addr) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }
    Err(match last_err {
        Some(e) => anyhow::anyhow!("could not connect to {host}:{port}: {e}"),
        None => anyhow::anyhow!("could not resolve address {host}:{port}"),
    })
}

fn run(args: ClientArgs) -> anyhow::Result<()> {
    let (server_host, server_port) = split_address(&args.server_address)?;
    let server_port: u16 = server_port.parse()?;
    let (gui_host, gui_port) = split_address(&args.gui_address)?;
    let gui_addr = resolve_one(&gui_host, gui_port.parse()?)?;

    tracing::info!(host = %server_host, port = server_port, "connecting to server");
    let server_read_stream = connect_any(&server_host, server_port)?;
    let server_write_stream = server_read_stream.try_clone()?;
    let server_read = StreamTransport::new(server_read_stream)?;
    let server_write = StreamTransport::new(server_write_stream)?;

    let udp_read_socket = UdpSocket::bind(("0.0.0.0", args.port))?;
    let udp_write_socket = udp_read_socket.try_clone()?;
    let gui_read = DatagramTransport::new(udp_read_socket, gui_addr);
    let gui_write = DatagramTransport::new(udp_write_socket, gui_addr);
    tracing::info!(port = args.port, %gui_addr, "listening for frontend datagrams");

    let state = Arc::new(Mutex::new(ClientState::new()));
    let shutdown = Arc::new(Shutdown::default());

    // Both UDP handles share one underlying socket (`try_clone`), so
    // closing either unblocks a pending `recv_from` on the other; same
    // for the TCP pair via `shutdown(Both)`.
    let server_closer = server_read.closer();
    let gui_closer = gui_read.closer();

    let server_thread = {
        let state = Arc::clone(&state);
        let shutdown = Arc::clone(&shutdown);
        std::thread::spawn(move || server_messages_loop(state, server_read, gui_write, shutdown))
    };

    let frontend_thread = {
        let state = Arc::clone(&state);
        let shutdown = Arc::clone(&shutdown);
        let player_name = args.player_name.clone();
        std::thread::spawn(move || {
            frontend_messages_loop(state, gui_read, server_write, player_name, shutdown)
        })
    };

    shutdown.wait();
    tracing::info!("shutting down");
    server_closer.close();
    gui_closer.close();

    let _ = server_thread.join();
    let _ = frontend_thread.join();

    Ok(())
}

/// Server-listener: decode one `ServerToClient`, fold it into shared
/// state, forward the resulting frontend message (if any).
fn server_messages_loop(
    state: Arc<Mutex<ClientState>>,
    mut server_read: StreamTransport,
    mut gui_write: DatagramTransport,
    shutdown: Arc<Shutdown>,
) {
    loop {
        let msg = match ServerToClient::decode(&mut server_read) {
            Ok(m) => m,
            Err(e) => {
                tracing::info!(error = %e, "server connection ended");
                shutdown.signal();
                return;
            }
        };
        tracing::debug!(?msg, "received from server");

        let out = {
            let mut state = state.lock().unwrap();
            state.apply_server_message(msg)
        };

        if let Some(frontend_msg) = out {
            if let Err(e) = send_datagram(&mut gui_write, &frontend_msg) {
                tracing::info!(error = %e, "failed to send to frontend");
                shutdown.signal();
                return;
            }
        }
    }
}

/// Frontend-listener: stage one datagram, decode the single message it
/// should contain, and discard the whole datagram on any malformed input
/// (unknown tag, truncated payload, or trailing bytes after a complete
/// message) rather than treating it as fatal.
fn frontend_messages_loop(
    state: Arc<Mutex<ClientState>>,
    mut gui_read: DatagramTransport,
    mut server_write: StreamTransport,
    player_name: String,
    shutdown: Arc<Shutdown>,
) {
    loop {
        if let Err(e) = gui_read.receive_next() {
            tracing::info!(error = %e, "frontend socket closed");
            shutdown.signal();
            return;
        }

        let msg = match FrontendToClient::decode(&mut gui_read) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(error = %e, "malformed frontend datagram, discarding");
                gui_read.discard_rest();
                continue;
            }
        };

        if gui_read.has_more() {
            tracing::debug!("trailing bytes after frontend message, discarding datagram");
            gui_read.discard_rest();
            continue;
        }

        let out = {
            let state = state.lock().unwrap();
            state.apply_frontend_message(msg, &player_name)
        };

        if let Err(e) = send_stream(&mut server_write, &out) {
            tracing::info!(error = %e, "failed to send to server");
            shutdown.signal();
            return;
        }
    }
}

fn send_datagram(
    out: &mut DatagramTransport,
    msg: &robots::codec::ClientToFrontend,
) -> Result<(), CodecError> {
    msg.encode(out)?;
    out.flush()?;
    Ok(())
}

fn send_stream(out: &mut StreamTransport, msg: &ClientToServer) -> Result<(), CodecError> {
    msg.encode(out)?;
    out.flush()?;
    Ok(())
}
