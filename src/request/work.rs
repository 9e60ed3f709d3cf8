//! work request
//!
//! Runs a closure on the engine's threadpool (`uv_queue_work`), then
//! delivers its result back on the loop thread. The closure and its result
//! travel through the request's `data` slot exactly like the `fs` and `dns`
//! requests in this module.

use std::cell::Cell;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::reactor::Loop;

struct WorkCtx<T> {
    work: Option<Box<dyn FnOnce() -> T + Send>>,
    result: Option<T>,
    after: Option<Box<dyn FnOnce(T)>>,
    completed: Rc<Cell<bool>>,
}

extern "C" fn work_cb<T>(req: *mut libuv_sys2::uv_work_t) {
    unsafe {
        let ctx = &mut *((*req).data as *mut WorkCtx<T>);
        let work = ctx.work.take().expect("work_cb invoked twice");
        ctx.result = Some(work());
    }
}

extern "C" fn after_work_cb<T>(req: *mut libuv_sys2::uv_work_t, status: i32) {
    unsafe {
        let ctx = Box::from_raw((*req).data as *mut WorkCtx<T>);
        ctx.completed.set(true);
        drop(Box::from_raw(req));
        if status < 0 {
            warn!(status, "after_work_cb reports failed/cancelled work item");
        } else {
            debug!("after_work_cb completed");
        }
        let WorkCtx { result, after, .. } = *ctx;
        if let (Some(result), Some(after)) = (result, after) {
            after(result);
        }
    }
}

/// A pending work item, cancellable via [`WorkRequest::cancel`] -- only
/// effective while it's still queued, before a threadpool worker dequeues
/// it.
pub struct WorkRequest {
    req: *mut libuv_sys2::uv_work_t,
    completed: Rc<Cell<bool>>,
}

impl WorkRequest {
    /// Ask the engine to cancel this request (`uv_cancel`). A no-op if it
    /// has already completed. The completion callback still fires.
    pub fn cancel(&self) -> crate::error::Result<()> {
        if self.completed.get() {
            return Ok(());
        }
        let status = unsafe { libuv_sys2::uv_cancel(self.req as *mut libuv_sys2::uv_req_t) };
        if status < 0 {
            warn!(status, "work cancel failed");
            return Err(crate::error::Error::from_status(status));
        }
        debug!("work cancel submitted");
        Ok(())
    }
}

/// Run `work` on the threadpool, then hand its return value to `after`,
/// invoked on the loop thread once the work item completes.
///
/// `uv_queue_work` reports failure only when the engine's threadpool
/// cannot be used (queueing a closed loop, for instance); it is not
/// surfaced as a `Result<T>` because the work item itself never fails from
/// the engine's point of view -- any fallibility belongs inside `T`.
pub fn queue_work<T: Send + 'static>(
    loop_: &Loop,
    work: impl FnOnce() -> T + Send + 'static,
    after: impl FnOnce(T) + 'static,
) -> crate::error::Result<WorkRequest> {
    debug!("work queue submit");
    let completed = Rc::new(Cell::new(false));
    let ctx = Box::into_raw(Box::new(WorkCtx {
        work: Some(Box::new(work)),
        result: None,
        after: Some(Box::new(after)),
        completed: completed.clone(),
    }));
    let mut req: Box<libuv_sys2::uv_work_t> = Box::new(unsafe { std::mem::zeroed() });
    req.data = ctx as *mut _;
    let req_ptr = Box::into_raw(req);

    let status = unsafe {
        libuv_sys2::uv_queue_work(loop_.as_raw(), req_ptr, Some(work_cb::<T>), Some(after_work_cb::<T>))
    };
    if status < 0 {
        warn!(status, "work queue submission failed");
        unsafe {
            drop(Box::from_raw(ctx));
            drop(Box::from_raw(req_ptr));
        }
        return Err(crate::error::Error::from_status(status));
    }
    Ok(WorkRequest { req: req_ptr, completed })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_yields_computed_value() {
        let loop_ = Loop::new().unwrap();
        let got = std::rc::Rc::new(std::cell::Cell::new(0));
        let got2 = got.clone();
        queue_work(&loop_, || 21 * 2, move |v| got2.set(v)).unwrap();
        loop_.run(libuv_sys2::uv_run_mode_UV_RUN_DEFAULT).unwrap();
        assert_eq!(got.get(), 42);
    }

    #[test]
    fn cancel_before_it_runs_still_fires_the_callback() {
        let loop_ = Loop::new().unwrap();
        let got = std::rc::Rc::new(std::cell::Cell::new(false));
        let got2 = got.clone();
        let req = queue_work(&loop_, || 1 + 1, move |_v| got2.set(true)).unwrap();
        let _ = req.cancel();
        loop_.run(libuv_sys2::uv_run_mode_UV_RUN_DEFAULT).unwrap();
        assert!(got.get());
    }
}
