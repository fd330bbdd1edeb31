//! Synthetic acquisition server for trying the client locally.
//!
//! Accepts one connection at a time, reads the ASCII sampling request and
//! replays that many synthetic records at two per second, then closes.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use daq_log::record::{PlcChannels, SampleRecord, SpuChannels};

fn sample(seq: u32) -> SampleRecord {
    let drift = seq as f32 * 0.1;
    SampleRecord {
        plc: PlcChannels {
            read: true,
            ig01: seq % 2 == 0,
            tt01: 21.0 + drift,
            tt02: 20.4 + drift,
            fi01: 3.2,
            lt01: 87.5,
            pht01: 6.9,
            ..Default::default()
        },
        spu_a: SpuChannels {
            read: true,
            n_rate: 1000.0 + 50.0 * drift,
            t_rate: 250.0,
            cal_f1: 0.985,
            rdy: true,
            ..Default::default()
        },
        spu_b: SpuChannels {
            read: true,
            n_rate: 995.0 + 50.0 * drift,
            t_rate: 249.0,
            cal_f1: 1.012,
            rdy: true,
            ..Default::default()
        },
    }
}

fn serve(mut stream: TcpStream) -> std::io::Result<()> {
    let mut buf = [0u8; 16];
    let n = stream.read(&mut buf)?;
    let samples: u32 = std::str::from_utf8(&buf[..n])
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(1);
    println!("serving {} records", samples);
    for seq in 0..samples {
        stream.write_all(&sample(seq).encode())?;
        thread::sleep(Duration::from_millis(500));
    }
    Ok(())
}

fn main() -> std::io::Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", daq_log::DEFAULT_PORT))?;
    println!("replay server listening on {}", listener.local_addr()?);
    for stream in listener.incoming() {
        if let Err(e) = serve(stream?) {
            eprintln!("client dropped: {}", e);
        }
    }
    Ok(())
}
