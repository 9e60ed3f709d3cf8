//! Follow a file from its current end, printing new data to stdout as it's
//! appended -- the same backpressure protocol as `tee`, but driven by a
//! single writer.

use std::os::raw::c_int;
use std::process::ExitCode;

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

const BUFFER_SIZE: usize = 8192;
const WRITE_QUEUE_SIZE_UPPER_LIMIT: usize = 128 * BUFFER_SIZE;
const WRITE_QUEUE_SIZE_LOWER_LIMIT: usize = 16 * BUFFER_SIZE;

fn main() -> ExitCode {
    init_logging();

    let path = match std::env::args().nth(1) {
        Some(p) => p,
        None => {
            eprintln!("usage: tail <file>");
            return ExitCode::FAILURE;
        }
    };

    let loop_ = Loop::default();
    let flags = libc::O_RDONLY as c_int;
    let result = File::open(&loop_, &path, flags, 0, move |result| match result {
        Ok(file) => {
            let fd = file.fd();
            unsafe { libc::lseek(fd, 0, libc::SEEK_END) };
            follow(file);
        }
        Err(e) => error!(error = %e, "open failed"),
    });
    if let Err(e) = result {
        error!(error = %e, "open submission failed");
        return ExitCode::FAILURE;
    }

    loop {
        if loop_.run(libuv_sys2::uv_run_mode_UV_RUN_DEFAULT).is_err() {
            break;
        }
        if !loop_.is_alive() {
            break;
        }
    }
    ExitCode::SUCCESS
}

fn follow(file: File) {
    let stdout = File::from_fd(&Loop::default(), 1);
    let file_for_pause = file.clone();
    let result = file.read_start(move |result| match result {
        Ok(buf) => {
            let file_for_resume = file_for_pause.clone();
            let stdout_for_resume = stdout.clone();
            let write_result = stdout.write(buf, -1, move |result| {
                if let Err(e) = result {
                    error!(error = %e, "write failed");
                }
                file_for_resume
                    .read_resume(stdout_for_resume.write_queue_size() <= WRITE_QUEUE_SIZE_LOWER_LIMIT);
            });
            if write_result.is_ok() {
                file_for_pause.read_pause(stdout.write_queue_size() >= WRITE_QUEUE_SIZE_UPPER_LIMIT);
            }
        }
        Err(uvcc_rs::Error::EndOfStream) => {}
        Err(e) => error!(error = %e, "read failed"),
    });
    if let Err(e) = result {
        error!(error = %e, "read_start failed");
    }
}
