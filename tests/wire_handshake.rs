// tests/wire_handshake.rs

mod common;
use crate::common::{connected_pair, init_tracing, loopback, TestResult};

use std::io::Write;
use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};

use steerflow::errors::SteerError;
use steerflow::signal::Signal;
use steerflow::wire::{self, AcceptAbort, Connection, ConnectionState, RendezvousAddr, ShutdownFlag};

#[test]
fn rendezvous_file_is_published_discovered_and_retracted() -> TestResult {
    let dir = tempfile::tempdir()?;
    let addr = RendezvousAddr::new("node017", 6004);

    let path = wire::publish(dir.path(), "simulation", &addr)?;
    assert_eq!(path, dir.path().join("simulation.conn_info"));
    assert_eq!(std::fs::read_to_string(&path)?, "node017:6004");

    let found = wire::discover(dir.path(), "simulation")?;
    assert_eq!(found, addr);
    assert_eq!(found.heartbeat(), RendezvousAddr::new("node017", 6005));

    wire::retract(dir.path(), "simulation");
    assert!(!path.exists());
    // Retracting twice is harmless.
    wire::retract(dir.path(), "simulation");
    Ok(())
}

#[test]
fn missing_or_malformed_rendezvous_is_a_connection_error() -> TestResult {
    let dir = tempfile::tempdir()?;
    assert!(matches!(
        wire::discover(dir.path(), "ghost"),
        Err(SteerError::ConnectionLost { .. })
    ));

    std::fs::write(dir.path().join("broken.conn_info"), "no-port-here")?;
    assert!(matches!(
        wire::discover(dir.path(), "broken"),
        Err(SteerError::ConnectionLost { .. })
    ));
    Ok(())
}

#[test]
fn handshake_completes_with_ready() {
    init_tracing();
    let (control, app) = connected_pair("analysis");
    assert_eq!(control.state(), ConnectionState::Open);
    assert_eq!(app.state(), ConnectionState::Open);
}

#[test]
fn anything_but_ready_first_is_a_handshake_error() -> TestResult {
    init_tracing();
    let (listener, addr) = loopback();

    let client = thread::spawn(move || -> std::io::Result<()> {
        let mut stream = TcpStream::connect((addr.host.as_str(), addr.port))?;
        stream.write_all(b"\"DONE\"\n")?;
        Ok(())
    });

    let (stream, _) = listener.accept()?;
    let mut conn = Connection::new("impostor", stream)?;
    assert_eq!(conn.state(), ConnectionState::Handshaking);
    let err = wire::expect_ready(&mut conn).unwrap_err();
    assert_eq!(conn.state(), ConnectionState::Closed);
    client.join().unwrap()?;

    match err {
        SteerError::Handshake {
            peer,
            expected,
            actual,
        } => {
            assert_eq!(peer, "impostor");
            assert_eq!(expected, "READY");
            assert_eq!(actual, "DONE");
        }
        other => panic!("expected handshake error, got {other:?}"),
    }
    assert_eq!(conn.state(), ConnectionState::Closed);
    Ok(())
}

#[test]
fn frames_arrive_in_send_order() -> TestResult {
    let (mut control, mut app) = connected_pair("analysis");
    for symbol in ["A", "B", "C"] {
        app.send(&Signal::custom(symbol))?;
    }
    app.send(&Signal::Done)?;

    let mut seen = Vec::new();
    loop {
        let signal: Signal = control.recv()?;
        let done = signal.is_terminal();
        seen.push(signal.to_string());
        if done {
            break;
        }
    }
    assert_eq!(seen, ["A", "B", "C", "DONE"]);
    Ok(())
}

#[test]
fn recv_timeout_returns_none_then_the_late_frame() -> TestResult {
    let (mut control, mut app) = connected_pair("simulation");

    let started = Instant::now();
    let nothing: Option<Signal> = control.recv_timeout(Duration::from_millis(100))?;
    assert!(nothing.is_none());
    assert!(started.elapsed() >= Duration::from_millis(90));

    app.send(&Signal::Sigterm)?;
    let late: Option<Signal> = control.recv_timeout(Duration::from_secs(2))?;
    assert_eq!(late, Some(Signal::Sigterm));
    Ok(())
}

#[test]
fn peer_close_is_connection_lost() {
    let (mut control, mut app) = connected_pair("simulation");
    app.close();
    assert!(matches!(
        control.recv::<Signal>(),
        Err(SteerError::ConnectionLost { .. })
    ));
}

#[test]
fn accept_gives_up_on_deadline_or_shutdown() -> TestResult {
    let (listener, _addr) = loopback();
    let flag = ShutdownFlag::new();

    let started = Instant::now();
    let outcome = wire::accept_until(
        &listener,
        Some(Instant::now() + Duration::from_millis(150)),
        &flag,
    )?;
    assert_eq!(outcome.unwrap_err(), AcceptAbort::DeadlineElapsed);
    assert!(started.elapsed() >= Duration::from_millis(140));

    let trigger = flag.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        trigger.trigger();
    });
    let outcome = wire::accept_until(&listener, None, &flag)?;
    assert_eq!(outcome.unwrap_err(), AcceptAbort::ShutdownRequested);
    Ok(())
}
