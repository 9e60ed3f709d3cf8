//! A TCP echo server: accept connections, echo back whatever each client
//! sends, and log when they disconnect.

use std::net::SocketAddr;
use std::process::ExitCode;

use tracing::{error, info};
use uvcc_rs::handle::tcp::Tcp;
use uvcc_rs::reactor::Loop;

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

    let loop_ = Loop::default();
    let server = match Tcp::new(&loop_) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to create socket");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.bind(&addr) {
        error!(error = %e, "bind failed");
        return ExitCode::FAILURE;
    }

    let loop_for_accept = loop_.clone();
    let server_for_accept = server.clone();
    let result = server.listen(128, move |result| {
        if let Err(e) = result {
            error!(error = %e, "listen error");
            return;
        }
        match server_for_accept.accept(&loop_for_accept) {
            Ok(client) => echo(client),
            Err(e) => error!(error = %e, "accept failed"),
        }
    });
    if let Err(e) = result {
        error!(error = %e, "listen failed");
        return ExitCode::FAILURE;
    }

    info!(%addr, "echo server listening");
    let _ = loop_.run(libuv_sys2::uv_run_mode_UV_RUN_DEFAULT);
    ExitCode::SUCCESS
}

fn echo(client: Tcp) {
    let client_for_write = client.clone();
    let result = client.read_start(move |result| match result {
        Ok(buf) => {
            let client_for_shutdown = client_for_write.clone();
            let write_result = client_for_write.write(buf, move |result| {
                if let Err(e) = result {
                    error!(error = %e, "write failed");
                    let _ = client_for_shutdown.shutdown(|_| {});
                }
            });
            if let Err(e) = write_result {
                error!(error = %e, "write submission failed");
            }
        }
        Err(uvcc_rs::Error::EndOfStream) => {
            info!("client disconnected");
        }
        Err(e) => {
            error!(error = %e, "read failed");
        }
    });
    if let Err(e) = result {
        error!(error = %e, "read_start failed");
    }
}
