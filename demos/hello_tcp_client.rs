//! Connect to a TCP server, send a line from stdin (or a default greeting),
//! and print whatever comes back.

use std::net::SocketAddr;
use std::process::ExitCode;

use tracing::{error, info};
use uvcc_rs::handle::tcp::Tcp;
use uvcc_rs::reactor::Loop;
use uvcc_rs::Buffer;

#[cfg(feature = "bin")]
fn init_logging() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, prelude::*, filter::LevelFilter};
    let stdout = fmt::layer().compact().with_target(false);
    let _ = tracing_subscriber::registry().with(stdout).with(LevelFilter::INFO).try_init();
}

#[cfg(not(feature = "bin"))]
fn init_logging() {}

fn main() -> ExitCode {
    init_logging();

    let addr: SocketAddr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:9999".to_string())
        .parse()
        .expect("invalid address");
    let message = std::env::args().nth(2).unwrap_or_else(|| "hello\n".to_string());

    let loop_ = Loop::default();
    let client = match Tcp::new(&loop_) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to create socket");
            return ExitCode::FAILURE;
        }
    };

    let client_for_connect = client.clone();
    let result = client.connect(&addr, move |result| {
        if let Err(e) = result {
            error!(error = %e, "connect failed");
            return;
        }
        info!(%addr, "connected");

        let client_for_read = client_for_connect.clone();
        if let Err(e) = client_for_connect.read_start(move |result| match result {
            Ok(buf) => {
                for i in 0..buf.segments() {
                    print!("{}", String::from_utf8_lossy(buf.as_slice(i)));
                }
            }
            Err(uvcc_rs::Error::EndOfStream) => {
                info!("server closed connection");
            }
            Err(e) => error!(error = %e, "read failed"),
        }) {
            error!(error = %e, "read_start failed");
            return;
        }

        let buf = Buffer::from(message.into_bytes());
        if let Err(e) = client_for_read.write(buf, |result| {
            if let Err(e) = result {
                error!(error = %e, "write failed");
            }
        }) {
            error!(error = %e, "write submission failed");
        }
    });
    if let Err(e) = result {
        error!(error = %e, "connect submission failed");
        return ExitCode::FAILURE;
    }

    let _ = loop_.run(libuv_sys2::uv_run_mode_UV_RUN_DEFAULT);
    ExitCode::SUCCESS
}
