use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::AssertUnwindSafe;
use std::sync::Once;

use futures_util::FutureExt; // for catch_unwind on async blocks
use serde_json::Value;
use tracing::{error, warn};

use super::{Handler, HandlerFuture, Request};
use crate::config::ErrorPolicy;
use crate::error::{AppError, Status, INTERNAL_MESSAGE};
use crate::identity::CallContext;

/// Outermost stage: recovers panics anywhere downstream and normalizes every error before it
/// reaches the caller. Full detail is logged here and nowhere else.
pub struct FailureBoundary<H> {
    inner: H,
    policy: ErrorPolicy,
}

/// Where a panic started, captured by the panic hook before the stack unwinds.
struct PanicSite {
    location: String,
    backtrace: Backtrace,
}

thread_local! {
    static LAST_PANIC: RefCell<Option<PanicSite>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Chain a hook in front of the current one that records the panic site on the panicking
/// thread. `catch_unwind` runs on that same thread, so `recovered` can pick it up.
pub fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let location = info
                .location()
                .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
                .unwrap_or_else(|| "<unknown>".to_string());
            let site = PanicSite { location, backtrace: Backtrace::force_capture() };
            LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(site));
            previous(info);
        }));
    });
}

fn take_panic_site() -> Option<PanicSite> { LAST_PANIC.with(|slot| slot.borrow_mut().take()) }

impl<H: Handler> FailureBoundary<H> {
    pub fn new(inner: H, policy: ErrorPolicy) -> Self {
        install_panic_hook();
        Self { inner, policy }
    }

    /// Entry point for one inbound call: fresh context in, caller-facing status out.
    pub async fn serve(&self, req: Request) -> Result<Value, Status> {
        let ctx = CallContext::new(req.method.clone());
        self.call(ctx, req).await.map_err(Status::from)
    }
}

impl<H: Handler> Handler for FailureBoundary<H> {
    fn call(&self, ctx: CallContext, req: Request) -> HandlerFuture {
        let method = req.method.clone();
        let request_id = ctx.request_id.clone();
        let policy = self.policy;
        // The inner stage may panic while building its future, not only while it is polled.
        let fut = match std::panic::catch_unwind(AssertUnwindSafe(|| self.inner.call(ctx, req))) {
            Ok(fut) => fut,
            Err(payload) => {
                let err = recovered(&method, &request_id, payload);
                return Box::pin(async move { Err::<Value, AppError>(err) });
            }
        };
        Box::pin(async move {
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(normalize(policy, &method, &request_id, e)),
                Err(payload) => Err(recovered(&method, &request_id, payload)),
            }
        })
    }
}

fn normalize(policy: ErrorPolicy, method: &str, request_id: &str, err: AppError) -> AppError {
    match (policy, &err) {
        (ErrorPolicy::Distinguish, AppError::Auth { .. }) => {
            warn!(target: "auth", method, request_id, code = err.code_str(), "call unauthenticated");
            AppError::unauthenticated()
        }
        _ => {
            error!(method, request_id, code = err.code_str(), detail = err.message(), "call failed");
            generic_internal()
        }
    }
}

fn recovered(method: &str, request_id: &str, payload: Box<dyn Any + Send>) -> AppError {
    let msg = if let Some(s) = payload.downcast_ref::<&str>() { *s }
              else if let Some(s) = payload.downcast_ref::<String>() { s.as_str() }
              else { "panic" };
    match take_panic_site() {
        Some(site) => {
            error!(target: "panic", method, request_id, location = %site.location, "handler panic: {}\n{}", msg, site.backtrace)
        }
        None => error!(target: "panic", method, request_id, location = "<unknown>", "handler panic: {}", msg),
    }
    generic_internal()
}

fn generic_internal() -> AppError { AppError::internal("internal", INTERNAL_MESSAGE) }

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::error::Code;
    use crate::interceptor::handler_fn;

    #[derive(Clone, Default)]
    struct LogSink(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> { Ok(()) }
    }

    impl LogSink {
        fn contents(&self) -> String { String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned() }
    }

    #[tokio::test]
    async fn ok_passes_through() {
        let b = FailureBoundary::new(handler_fn(|_, _| async { Ok(Value::from(1)) }), ErrorPolicy::Distinguish);
        assert_eq!(b.serve(Request::new("/m")).await, Ok(Value::from(1)));
    }

    #[tokio::test]
    async fn exec_error_becomes_generic_internal() {
        let b = FailureBoundary::new(
            handler_fn(|_, _| async { Err(AppError::exec("db_down", "connection refused to 10.0.0.5")) }),
            ErrorPolicy::Distinguish,
        );
        let st = b.serve(Request::new("/m")).await.unwrap_err();
        assert_eq!(st, Status::internal());
        assert!(!st.message.contains("10.0.0.5"));
    }

    #[tokio::test]
    async fn auth_error_kept_or_collapsed_by_policy() {
        let inner = || handler_fn(|_, _| async { Err(AppError::unauthenticated()) });
        let d = FailureBoundary::new(inner(), ErrorPolicy::Distinguish);
        assert_eq!(d.serve(Request::new("/m")).await.unwrap_err().code, Code::Unauthenticated);
        let c = FailureBoundary::new(inner(), ErrorPolicy::Collapse);
        assert_eq!(c.serve(Request::new("/m")).await.unwrap_err(), Status::internal());
    }

    #[tokio::test]
    async fn panic_while_polling_is_recovered() {
        let b = FailureBoundary::new(
            handler_fn(|_, _| async {
                let rows: Vec<u32> = Vec::new();
                Ok(Value::from(rows[0]))
            }),
            ErrorPolicy::Distinguish,
        );
        assert_eq!(b.serve(Request::new("/m")).await.unwrap_err(), Status::internal());
    }

    #[tokio::test]
    async fn panic_log_names_the_fault_site() {
        let sink = LogSink::default();
        let writer = sink.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let fault = format!("{}:{}", file!(), line!() + 2);
        let b = FailureBoundary::new(
            handler_fn(|_, _| async { let rows: Vec<u32> = Vec::new(); Ok(Value::from(rows[3])) }),
            ErrorPolicy::Distinguish,
        );
        assert_eq!(b.serve(Request::new("/m")).await.unwrap_err(), Status::internal());

        let log = sink.contents();
        assert!(log.contains("index out of bounds"), "{}", log);
        assert!(log.contains(&fault), "expected {} in {}", fault, log);
        assert!(!log.contains("disabled backtrace"), "{}", log);
    }

    #[test]
    fn hook_records_site_on_panicking_thread() {
        install_panic_hook();
        let line = line!() + 1;
        let caught = std::panic::catch_unwind(|| panic!("recorded"));
        assert!(caught.is_err());
        let site = take_panic_site().expect("site recorded");
        assert!(site.location.starts_with(&format!("{}:{}:", file!(), line)), "{}", site.location);
        assert!(take_panic_site().is_none());
    }

    struct PanicsOnCall;

    impl Handler for PanicsOnCall {
        fn call(&self, _: CallContext, _: Request) -> HandlerFuture { panic!("boom before future") }
    }

    #[tokio::test]
    async fn panic_while_building_future_is_recovered() {
        let b = FailureBoundary::new(PanicsOnCall, ErrorPolicy::Distinguish);
        assert_eq!(b.serve(Request::new("/m")).await.unwrap_err(), Status::internal());
    }
}
