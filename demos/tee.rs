//! Copy stdin to stdout and, if given, to a named file -- exercising the
//! backpressure protocol between a fast reader and slower writers.

use std::os::raw::c_int;
use std::process::ExitCode;
use std::rc::Rc;

use tracing::error;
use uvcc_rs::handle::file::File;
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

const BUFFER_SIZE: usize = 8192;
const WRITE_QUEUE_SIZE_UPPER_LIMIT: usize = 128 * BUFFER_SIZE;
const WRITE_QUEUE_SIZE_LOWER_LIMIT: usize = 16 * BUFFER_SIZE;

fn main() -> ExitCode {
    init_logging();

    let out_path = std::env::args().nth(1);
    let loop_ = Loop::default();

    let stdin = File::from_fd(&loop_, 0);
    let stdout = File::from_fd(&loop_, 1);
    let copy = out_path.map(|p| (p, Rc::new(std::cell::RefCell::new(None::<File>))));

    if let Some((path, slot)) = &copy {
        let slot = slot.clone();
        let flags = (libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC) as c_int;
        if let Err(e) = File::open(&loop_, path, flags, 0o644, move |result| match result {
            Ok(f) => *slot.borrow_mut() = Some(f),
            Err(e) => error!(error = %e, "failed to open tee file"),
        }) {
            error!(error = %e, "open submission failed");
            return ExitCode::FAILURE;
        }
        while slot.borrow().is_none() {
            if loop_.run(libuv_sys2::uv_run_mode_UV_RUN_ONCE).is_err() {
                break;
            }
        }
    }

    let copy_file = copy.and_then(|(_, slot)| slot.borrow().clone());
    let stdin_for_pause = stdin.clone();

    let result = stdin.read_start(move |result| match result {
        Ok(buf) => {
            write_to(&stdout, &stdin_for_pause, buf.clone());
            if let Some(f) = &copy_file {
                write_to(f, &stdin_for_pause, buf);
            }
        }
        Err(uvcc_rs::Error::EndOfStream) => {}
        Err(e) => error!(error = %e, "read failed"),
    });
    if let Err(e) = result {
        error!(error = %e, "read_start failed");
        return ExitCode::FAILURE;
    }

    let _ = loop_.run(libuv_sys2::uv_run_mode_UV_RUN_DEFAULT);
    ExitCode::SUCCESS
}

fn write_to(out: &File, in_: &File, buf: Buffer) {
    let in_for_resume = in_.clone();
    let out_for_resume = out.clone();
    let result = out.write(buf, -1, move |result| {
        if let Err(e) = result {
            error!(error = %e, "write failed");
        }
        in_for_resume.read_resume(out_for_resume.write_queue_size() <= WRITE_QUEUE_SIZE_LOWER_LIMIT);
    });
    if result.is_ok() {
        in_.read_pause(out.write_queue_size() >= WRITE_QUEUE_SIZE_UPPER_LIMIT);
    }
}
