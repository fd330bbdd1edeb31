use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use daq_log::record::{PlcChannels, SampleRecord, SpuChannels};
use daq_log::{Error, RetryPolicy, SyncPolicy, TelemetryLogger};

fn sample(seq: u32) -> SampleRecord {
    SampleRecord {
        plc: PlcChannels {
            read: true,
            tt01: 20.5 + seq as f32,
            fi01: 3.25,
            ..Default::default()
        },
        spu_a: SpuChannels {
            read: true,
            n_rate: 1000.0 + seq as f32,
            rdy: true,
            ..Default::default()
        },
        spu_b: SpuChannels {
            read: true,
            t_rate: 250.0,
            test: seq % 2 == 1,
            ..Default::default()
        },
    }
}

fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = [0u8; 16];
    let n = stream.read(&mut buf).unwrap();
    String::from_utf8_lossy(&buf[..n]).into_owned()
}

fn spawn_server<F>(handler: F) -> (u16, JoinHandle<()>)
where
    F: FnOnce(TcpStream) + Send + 'static,
{
    let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        handler(stream);
    });
    (port, handle)
}

#[test]
fn three_records_then_close_appends_three_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("telemetry.log");
    let (port, server) = spawn_server(|mut stream| {
        assert_eq!(read_request(&mut stream), "3");
        for seq in 0..3 {
            stream.write_all(&sample(seq).encode()).unwrap();
        }
    });

    let stats = TelemetryLogger::new("127.0.0.1", port, &path)
        .run(3)
        .unwrap();
    server.join().unwrap();

    assert_eq!(stats.received, 3);
    assert_eq!(stats.logged, 3);
    assert_eq!(stats.dropped, 0);

    let log = std::fs::read_to_string(&path).unwrap();
    let headers: Vec<&str> = log.lines().filter(|l| l.starts_with("##### ")).collect();
    assert_eq!(headers.len(), 3);

    // Second-resolution local timestamps, never going backwards. The
    // YYYY_MM_DD_HH_MM_SS form sorts lexicographically.
    let stamps: Vec<String> = headers
        .iter()
        .map(|h| {
            h.trim_start_matches("##### ")
                .trim_end_matches(" ####")
                .to_owned()
        })
        .collect();
    assert!(stamps.iter().all(|s| s.len() == 19));
    let mut sorted = stamps.clone();
    sorted.sort();
    assert_eq!(stamps, sorted);

    let field_lines = log.lines().filter(|l| l.contains(": ")).count();
    assert_eq!(field_lines, 3 * SampleRecord::FIELD_COUNT);

    // Known values come back verbatim, each detector channel under its own
    // section.
    assert!(log.contains("PLC_TT01: 20.5"));
    assert!(log.contains("PLC_TT01: 22.5"));
    assert!(log.contains("PLC_FI01: 3.25"));
    assert!(log.contains("SPU_CHA_N_RATE: 1000"));
    assert!(log.contains("SPU_CHB_T_RATE: 250"));
    assert!(log.contains("SPU_CHA_T_RATE: 0"));

    // Four blank lines between consecutive blocks.
    assert!(log.contains("\n\n\n\n\n##### "));
}

#[test]
fn connection_refused_is_terminal_and_writes_nothing() {
    let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("telemetry.log");
    let err = TelemetryLogger::new("127.0.0.1", port, &path)
        .run(1)
        .unwrap_err();
    assert!(matches!(err, Error::Io(_)));
    assert!(!path.exists());
}

#[test]
fn immediate_close_ends_run_without_spurious_entry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("telemetry.log");
    let (port, server) = spawn_server(|mut stream| {
        let _ = read_request(&mut stream);
    });

    let stats = TelemetryLogger::new("127.0.0.1", port, &path)
        .run(1)
        .unwrap();
    server.join().unwrap();

    assert_eq!(stats.received, 0);
    assert!(!path.exists());
}

#[test]
fn partial_terminal_record_is_treated_as_closed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("telemetry.log");
    let (port, server) = spawn_server(|mut stream| {
        let _ = read_request(&mut stream);
        stream.write_all(&sample(0).encode()).unwrap();
        stream.write_all(&sample(1).encode()[..100]).unwrap();
    });

    let stats = TelemetryLogger::new("127.0.0.1", port, &path)
        .run(2)
        .unwrap();
    server.join().unwrap();

    assert_eq!(stats.received, 1);
    assert_eq!(stats.logged, 1);
    let log = std::fs::read_to_string(&path).unwrap();
    assert_eq!(log.matches("##### ").count(), 1);
}

#[test]
fn unwritable_log_path_drops_entries_but_keeps_receiving() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("telemetry.log");
    let (port, server) = spawn_server(|mut stream| {
        let _ = read_request(&mut stream);
        for seq in 0..2 {
            stream.write_all(&sample(seq).encode()).unwrap();
        }
    });

    let stats = TelemetryLogger::new("127.0.0.1", port, &path)
        .run(2)
        .unwrap();
    server.join().unwrap();

    assert_eq!(stats.received, 2);
    assert_eq!(stats.logged, 0);
    assert_eq!(stats.dropped, 2);
    assert!(!path.exists());
}

#[test]
fn stalled_server_times_out_when_a_read_timeout_is_set() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("telemetry.log");
    let (port, _server) = spawn_server(|mut stream| {
        let _ = read_request(&mut stream);
        thread::sleep(Duration::from_secs(2));
    });

    let err = TelemetryLogger::new("127.0.0.1", port, &path)
        .with_read_timeout(Duration::from_millis(100))
        .run(1)
        .unwrap_err();
    assert!(matches!(err, Error::Timeout));
    assert!(!path.exists());
}

#[test]
fn keep_open_policy_logs_every_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("telemetry.log");
    let (port, server) = spawn_server(|mut stream| {
        let _ = read_request(&mut stream);
        for seq in 0..2 {
            stream.write_all(&sample(seq).encode()).unwrap();
        }
    });

    let stats = TelemetryLogger::new("127.0.0.1", port, &path)
        .with_sync_policy(SyncPolicy::KeepOpen)
        .run(2)
        .unwrap();
    server.join().unwrap();

    assert_eq!(stats.logged, 2);
    let log = std::fs::read_to_string(&path).unwrap();
    assert_eq!(log.matches("##### ").count(), 2);
}

#[test]
fn supervisor_recovers_after_a_timed_out_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("telemetry.log");
    let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = thread::spawn(move || {
        // First connection stalls past the client's read timeout; it is
        // held open so the client sees a timeout, not a closed stream.
        let (mut first, _) = listener.accept().unwrap();
        let _ = read_request(&mut first);
        let (mut second, _) = listener.accept().unwrap();
        let _ = read_request(&mut second);
        second.write_all(&sample(0).encode()).unwrap();
        drop(first);
    });

    let retry = RetryPolicy {
        max_retries: 2,
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(50),
    };
    let stats = TelemetryLogger::new("127.0.0.1", port, &path)
        .with_read_timeout(Duration::from_millis(150))
        .run_supervised(1, &retry)
        .unwrap();
    server.join().unwrap();

    assert_eq!(stats.received, 1);
    assert_eq!(stats.logged, 1);
}

#[test]
fn supervisor_gives_up_after_max_retries() {
    let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("telemetry.log");
    let retry = RetryPolicy {
        max_retries: 1,
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(10),
    };
    let err = TelemetryLogger::new("127.0.0.1", port, &path)
        .run_supervised(1, &retry)
        .unwrap_err();
    assert!(matches!(err, Error::Io(_)));
    assert!(!path.exists());
}
