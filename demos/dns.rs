//! Resolve a hostname and print every address the engine's resolver
//! reports.

use std::process::ExitCode;

use tracing::error;
use uvcc_rs::reactor::Loop;
use uvcc_rs::request::dns;

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

    let host = match std::env::args().nth(1) {
        Some(h) => h,
        None => {
            eprintln!("usage: dns <hostname>");
            return ExitCode::FAILURE;
        }
    };

    let loop_ = Loop::default();
    let failed = std::rc::Rc::new(std::cell::Cell::new(false));
    let failed_for_cb = failed.clone();

    let result = dns::getaddrinfo(&loop_, Some(host.as_str()), None, move |result| match result {
        Ok(addrs) => {
            for addr in addrs {
                println!("{addr}");
            }
        }
        Err(e) => {
            error!(error = %e, "getaddrinfo failed");
            failed_for_cb.set(true);
        }
    });
    if let Err(e) = result {
        error!(error = %e, "getaddrinfo submission failed");
        return ExitCode::FAILURE;
    }

    let _ = loop_.run(libuv_sys2::uv_run_mode_UV_RUN_DEFAULT);
    if failed.get() { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}
