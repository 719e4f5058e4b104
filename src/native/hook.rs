//! Fatal error hook of the native library.
//!
//! The library reports unrecoverable internal errors through [`fatal_error`],
//! which runs every registered handler and then aborts the process. Handlers
//! get one chance to tell someone before the process disappears; they must
//! not return control to library code.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, Once, PoisonError};

type ErrorHandler = Box<dyn Fn(&str) + Send + Sync>;

static HANDLERS: Mutex<Vec<ErrorHandler>> = Mutex::new(Vec::new());

/// Set once the process is on its way down; a handler that fails fatally
/// itself must not re-enter the handler list.
static IN_FATAL: AtomicBool = AtomicBool::new(false);

static PANIC_HOOK: Once = Once::new();

/// Register a handler invoked on unrecoverable library errors.
pub fn add_error_handler<F>(handler: F)
where
    F: Fn(&str) + Send + Sync + 'static,
{
    HANDLERS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(Box::new(handler));
}

/// Report an unrecoverable error: run the handlers, then abort.
pub fn fatal_error(message: &str) -> ! {
    if IN_FATAL.swap(true, Ordering::SeqCst) {
        std::process::abort();
    }

    tracing::error!(message, "Native library fatal error");

    let handlers = HANDLERS.lock().unwrap_or_else(PoisonError::into_inner);
    for handler in handlers.iter() {
        handler(message);
    }

    std::process::abort()
}

/// Route panics in library code through [`fatal_error`].
///
/// A panic inside a worker function leaves library state unknown, so it is
/// treated exactly like a native fatal error.
pub fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        std::panic::set_hook(Box::new(|info| {
            fatal_error(&format!("panic: {}", info));
        }));
    });
}
