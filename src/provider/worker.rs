//! Worker process main entry point.
//!
//! This module runs when `geoprov worker --data-dir <dir>` is invoked. It
//! installs the crash hook, checks the function table and then serves
//! requests from the supervisor until STOP or end of input.

use super::ipc::{LineReader, PipeFd};
use super::protocol::{Opcode, Request};
use super::table::{Endpoint, FunctionTable, Responder, WorkerContext};
use crate::native::hook;
use std::io;
use std::os::unix::io::AsFd;
use std::path::Path;
use std::sync::Arc;

/// Serve requests until STOP or EOF.
///
/// Every request other than STOP gets exactly one response before the next
/// line is read. A request that cannot be decoded, or that names an opcode
/// without a function, is a contract violation and ends the process through
/// the native fatal error path.
pub fn dispatch_loop(
    reader: &mut LineReader,
    endpoint: &Endpoint,
    table: &FunctionTable,
    ctx: &WorkerContext,
) -> io::Result<()> {
    loop {
        let line = match reader.read_line()? {
            Some(line) => line.to_string(),
            // Supervisor closed its end.
            None => return Ok(()),
        };

        let request = match Request::from_line(&line) {
            Ok(request) => request,
            Err(e) => hook::fatal_error(&format!("contract violation: bad request: {}", e)),
        };

        if request.opcode == Opcode::Stop {
            tracing::debug!("Worker received STOP");
            return Ok(());
        }

        let Some(handler) = table.lookup(request.opcode) else {
            hook::fatal_error(&format!(
                "contract violation: no function for {}",
                request.opcode
            ));
        };

        tracing::trace!(opcode = %request.opcode, "Dispatching request");
        handler(Responder::new(endpoint), &request, ctx)?;
    }
}

/// Run the worker process main function.
///
/// Never returns: exits 0 after STOP or EOF, 1 on channel failure, and
/// aborts through the crash hook on native fatal errors.
pub fn run_worker_main(data_dir: &Path) -> ! {
    // Ignore SIGPIPE - a vanished supervisor shows up as a write error
    unsafe {
        nix::sys::signal::signal(
            nix::sys::signal::Signal::SIGPIPE,
            nix::sys::signal::SigHandler::SigIgn,
        )
        .ok();
    }

    let (mut reader, endpoint) = match open_channel() {
        Ok(channel) => channel,
        Err(e) => {
            tracing::error!(error = %e, "Worker failed to open its channel");
            std::process::exit(1);
        }
    };
    let endpoint = Arc::new(endpoint);

    let hook_endpoint = Arc::clone(&endpoint);
    hook::add_error_handler(move |message| hook_endpoint.send_fatal(message));
    hook::install_panic_hook();

    let table = FunctionTable::standard();
    if let Err(e) = table.validate() {
        hook::fatal_error(&format!("incomplete function table: {}", e));
    }

    let ctx = WorkerContext::new(data_dir);
    tracing::debug!(pid = std::process::id(), data_dir = %data_dir.display(), "Worker ready");

    match dispatch_loop(&mut reader, &endpoint, &table, &ctx) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            tracing::error!(error = %e, "Worker channel failed");
            std::process::exit(1);
        }
    }
}

/// Take stdin as the request stream and a private copy of stdout as the
/// response stream, then point fd 1 at stderr so stray output from library
/// code cannot interleave with responses.
fn open_channel() -> io::Result<(LineReader, Endpoint)> {
    let input = io::stdin().as_fd().try_clone_to_owned()?;
    let output = io::stdout().as_fd().try_clone_to_owned()?;
    nix::unistd::dup2_stdout(io::stderr()).map_err(io::Error::from)?;

    Ok((
        LineReader::new(PipeFd::from(input)),
        Endpoint::new(PipeFd::from(output)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ipc::LineWriter;
    use crate::provider::protocol::Response;
    use nix::unistd::pipe;
    use serde_json::json;
    use tempfile::tempdir;

    /// (request writer, response reader, worker input, worker endpoint)
    fn channel() -> (LineWriter, LineReader, LineReader, Endpoint) {
        let (req_read, req_write) = pipe().unwrap();
        let (resp_read, resp_write) = pipe().unwrap();
        (
            LineWriter::new(PipeFd::from(req_write)),
            LineReader::new(PipeFd::from(resp_read)),
            LineReader::new(PipeFd::from(req_read)),
            Endpoint::new(PipeFd::from(resp_write)),
        )
    }

    fn send(requests: &mut LineWriter, request: Request) {
        requests.write_line(&request.to_line().unwrap()).unwrap();
    }

    fn recv(responses: &mut LineReader) -> Option<Response> {
        responses
            .read_line()
            .unwrap()
            .map(|line| Response::from_line(line).unwrap())
    }

    #[test]
    fn test_dispatch_until_stop() {
        let dir = tempdir().unwrap();
        let (mut requests, mut responses, mut worker_in, endpoint) = channel();
        send(&mut requests, Request::new(Opcode::Echo, vec![json!(42)]));
        send(&mut requests, Request::new(Opcode::Echo, vec![json!("again")]));
        send(&mut requests, Request::stop());
        // Anything after STOP is never read.
        send(&mut requests, Request::new(Opcode::Echo, vec![json!(7)]));

        let table = FunctionTable::standard();
        let ctx = WorkerContext::new(dir.path());
        dispatch_loop(&mut worker_in, &endpoint, &table, &ctx).unwrap();
        drop(endpoint);

        assert_eq!(recv(&mut responses), Some(Response::value(json!(42))));
        assert_eq!(recv(&mut responses), Some(Response::value(json!("again"))));
        assert_eq!(recv(&mut responses), None);
    }

    #[test]
    fn test_dispatch_ends_on_eof() {
        let dir = tempdir().unwrap();
        let (mut requests, mut responses, mut worker_in, endpoint) = channel();
        send(&mut requests, Request::new(Opcode::Sleep, vec![json!(1)]));
        drop(requests);

        let table = FunctionTable::standard();
        let ctx = WorkerContext::new(dir.path());
        dispatch_loop(&mut worker_in, &endpoint, &table, &ctx).unwrap();
        drop(endpoint);

        assert_eq!(recv(&mut responses), Some(Response::value(json!(1))));
        assert_eq!(recv(&mut responses), None);
    }
}
