//! Print each file named on the command line to stdout, in order.

use std::os::raw::c_int;
use std::process::ExitCode;
use std::rc::Rc;

use tracing::error;
use uvcc_rs::handle::file::File;
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

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        eprintln!("usage: cat <file>...");
        return ExitCode::FAILURE;
    }

    let loop_ = Loop::default();
    let remaining = Rc::new(std::cell::Cell::new(paths.len()));
    let failed = Rc::new(std::cell::Cell::new(false));

    for path in paths {
        let remaining = remaining.clone();
        let failed = failed.clone();
        let loop_for_open = loop_.clone();
        let result = File::open(&loop_, &path, libc::O_RDONLY as c_int, 0, move |result| {
            match result {
                Ok(file) => cat_one(loop_for_open, file, remaining, failed),
                Err(e) => {
                    error!(%path, error = %e, "open failed");
                    failed.set(true);
                    remaining.set(remaining.get() - 1);
                }
            }
        });
        if let Err(e) = result {
            error!(error = %e, "open submission failed");
            return ExitCode::FAILURE;
        }
    }

    while remaining.get() > 0 {
        if loop_.run(libuv_sys2::uv_run_mode_UV_RUN_ONCE).is_err() {
            break;
        }
    }

    if failed.get() { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

fn cat_one(
    loop_: Loop,
    file: File,
    remaining: Rc<std::cell::Cell<usize>>,
    failed: Rc<std::cell::Cell<bool>>,
) {
    let _ = loop_;
    let done = remaining.clone();
    let done_failed = failed.clone();
    let file_for_stop = file.clone();
    let result = file.read_start(move |result| match result {
        Ok(buf) => {
            use std::io::Write;
            let mut stdout = std::io::stdout();
            for i in 0..buf.segments() {
                let _ = stdout.write_all(buf.as_slice(i));
            }
        }
        Err(uvcc_rs::Error::EndOfStream) => {
            done.set(done.get() - 1);
        }
        Err(e) => {
            error!(error = %e, "read failed");
            done_failed.set(true);
            done.set(done.get() - 1);
        }
    });
    if result.is_err() {
        file_for_stop.read_stop();
        remaining.set(remaining.get() - 1);
    }
}
