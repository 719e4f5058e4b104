//! Function table of the worker process.
//!
//! Maps each opcode to the worker-side function that serves it. A function
//! receives a [`Responder`] for the worker endpoint and must answer through it
//! exactly once; `Responder::send` consumes the responder and hands back the
//! [`Sent`] token the function has to return, so a function that forgets to
//! answer (or answers twice) does not compile.

use super::ipc::{LineWriter, PipeFd};
use super::protocol::{Opcode, Request, Response};
use crate::model::{FeatureType, PixelFormat, Region};
use crate::native::{self, NativeError, hook, store::MapStore};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError, TryLockError};
use std::time::Duration;

/// Worker end of the channel. Every write happens under its lock.
pub struct Endpoint {
    writer: Mutex<LineWriter>,
}

impl Endpoint {
    pub fn new(fd: PipeFd) -> Self {
        Self {
            writer: Mutex::new(LineWriter::new(fd)),
        }
    }

    fn send(&self, response: &Response) -> io::Result<()> {
        let line = response.to_line()?;
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write_line(&line)
    }

    /// Send the fatal marker from the crash hook.
    ///
    /// Never blocks: when the crash happens while this thread already holds
    /// the endpoint lock, the marker is skipped and the supervisor sees EOF.
    pub fn send_fatal(&self, message: &str) {
        let mut writer = match self.writer.try_lock() {
            Ok(writer) => writer,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return,
        };
        if let Ok(line) = Response::fatal(message).to_line() {
            let _ = writer.write_line(&line);
        }
    }
}

/// Proof that a function answered its request.
#[derive(Debug)]
pub struct Sent(());

/// One-shot handle for answering the current request.
pub struct Responder<'a> {
    endpoint: &'a Endpoint,
}

impl<'a> Responder<'a> {
    pub fn new(endpoint: &'a Endpoint) -> Self {
        Self { endpoint }
    }

    pub fn send(self, response: Response) -> io::Result<Sent> {
        self.endpoint.send(&response)?;
        Ok(Sent(()))
    }
}

/// State shared by all worker functions.
pub struct WorkerContext {
    pub store: MapStore,
}

impl WorkerContext {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            store: MapStore::new(data_dir),
        }
    }
}

/// A worker-side function.
pub type Handler = fn(Responder<'_>, &Request, &WorkerContext) -> io::Result<Sent>;

/// Opcode to function mapping. Read-only once the dispatch loop starts.
#[derive(Default)]
pub struct FunctionTable {
    handlers: HashMap<Opcode, Handler>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with every standard function registered.
    pub fn standard() -> Self {
        let mut table = Self::new();
        table
            .register(Opcode::VectorTable, vector_table)
            .register(Opcode::VectorFeatures, vector_features)
            .register(Opcode::RasterImage, raster_image)
            .register(Opcode::Echo, echo)
            .register(Opcode::Sleep, sleep)
            .register(Opcode::Fatal, fatal);
        table
    }

    pub fn register(&mut self, opcode: Opcode, handler: Handler) -> &mut Self {
        self.handlers.insert(opcode, handler);
        self
    }

    pub fn lookup(&self, opcode: Opcode) -> Option<Handler> {
        self.handlers.get(&opcode).copied()
    }

    /// Check that every opcode except STOP has a function and STOP has none.
    pub fn validate(&self) -> Result<(), String> {
        if self.handlers.contains_key(&Opcode::Stop) {
            return Err(format!("{} is reserved and cannot be registered", Opcode::Stop));
        }
        let missing: Vec<String> = Opcode::ALL
            .into_iter()
            .filter(|op| *op != Opcode::Stop && !self.handlers.contains_key(op))
            .map(|op| op.to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(format!("no function registered for {}", missing.join(", ")))
        }
    }
}

/// Decode positional argument `index`; absent arguments decode from null.
fn arg<T: DeserializeOwned>(request: &Request, index: usize, name: &str) -> Result<T, String> {
    serde_json::from_value(request.arg(index).clone())
        .map_err(|e| format!("invalid argument '{}': {}", name, e))
}

/// Answer with the serialized result, or with an error response.
fn reply<T: Serialize>(
    responder: Responder<'_>,
    result: Result<T, NativeError>,
) -> io::Result<Sent> {
    let response = match result {
        Ok(value) => match serde_json::to_value(value) {
            Ok(value) => Response::value(value),
            Err(e) => Response::error(format!("failed to encode result: {}", e)),
        },
        Err(e) => Response::error(e.to_string()),
    };
    responder.send(response)
}

fn parse_feature_type(raw: Option<String>) -> Result<FeatureType, String> {
    raw.map(|s| s.parse::<FeatureType>())
        .transpose()
        .map(Option::unwrap_or_default)
}

fn echo(responder: Responder<'_>, request: &Request, _: &WorkerContext) -> io::Result<Sent> {
    responder.send(Response::value(request.arg(0).clone()))
}

fn sleep(responder: Responder<'_>, request: &Request, _: &WorkerContext) -> io::Result<Sent> {
    let ms: u64 = match arg(request, 0, "milliseconds") {
        Ok(ms) => ms,
        Err(e) => return responder.send(Response::error(e)),
    };
    std::thread::sleep(Duration::from_millis(ms));
    responder.send(Response::value(ms))
}

fn fatal(_: Responder<'_>, request: &Request, _: &WorkerContext) -> io::Result<Sent> {
    let message = match request.arg(0) {
        Value::String(s) => s.clone(),
        _ => "fatal error requested".to_string(),
    };
    hook::fatal_error(&message)
}

fn vector_table(
    responder: Responder<'_>,
    request: &Request,
    ctx: &WorkerContext,
) -> io::Result<Sent> {
    let args = (|| {
        let map: String = arg(request, 0, "map")?;
        let filter: Option<String> = arg(request, 1, "where")?;
        Ok::<_, String>((map, filter))
    })();
    match args {
        Ok((map, filter)) => reply(
            responder,
            native::vector_table(&ctx.store, &map, filter.as_deref()),
        ),
        Err(e) => responder.send(Response::error(e)),
    }
}

fn vector_features(
    responder: Responder<'_>,
    request: &Request,
    ctx: &WorkerContext,
) -> io::Result<Sent> {
    let args = (|| {
        let map: String = arg(request, 0, "map")?;
        let extent: Option<Region> = arg(request, 1, "extent")?;
        let feature_type = parse_feature_type(arg(request, 2, "feature_type")?)?;
        let field: Option<i32> = arg(request, 3, "field")?;
        Ok::<_, String>((map, extent, feature_type, field.unwrap_or(1)))
    })();
    match args {
        Ok((map, extent, feature_type, field)) => reply(
            responder,
            native::vector_features(&ctx.store, &map, extent.as_ref(), feature_type, field),
        ),
        Err(e) => responder.send(Response::error(e)),
    }
}

fn raster_image(
    responder: Responder<'_>,
    request: &Request,
    ctx: &WorkerContext,
) -> io::Result<Sent> {
    let args = (|| {
        let map: String = arg(request, 0, "map")?;
        let extent: Option<Region> = arg(request, 1, "extent")?;
        let format: Option<PixelFormat> = arg(request, 2, "format")?;
        Ok::<_, String>((map, extent, format.unwrap_or_default()))
    })();
    match args {
        Ok((map, extent, format)) => reply(
            responder,
            native::raster_image(&ctx.store, &map, extent.as_ref(), format),
        ),
        Err(e) => responder.send(Response::error(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ipc::LineReader;
    use nix::unistd::pipe;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    fn channel() -> (Endpoint, LineReader) {
        let (read_fd, write_fd) = pipe().unwrap();
        (
            Endpoint::new(PipeFd::from(write_fd)),
            LineReader::new(PipeFd::from(read_fd)),
        )
    }

    fn call(table: &FunctionTable, ctx: &WorkerContext, request: Request) -> Response {
        let (endpoint, mut reader) = channel();
        let handler = table.lookup(request.opcode).unwrap();
        handler(Responder::new(&endpoint), &request, ctx).unwrap();
        let line = reader.read_line().unwrap().unwrap().to_string();
        Response::from_line(&line).unwrap()
    }

    #[test]
    fn test_standard_table_is_total() {
        let table = FunctionTable::standard();
        assert!(table.validate().is_ok());
        assert!(table.lookup(Opcode::Stop).is_none());
    }

    #[test]
    fn test_validate_reports_missing_functions() {
        let mut table = FunctionTable::new();
        table.register(Opcode::Echo, echo);
        let err = table.validate().unwrap_err();
        assert!(err.contains("VECTOR_TABLE(1)"));
        assert!(err.contains("FATAL(14)"));
        assert!(!err.contains("ECHO"));
    }

    #[test]
    fn test_validate_rejects_stop_registration() {
        let mut table = FunctionTable::standard();
        table.register(Opcode::Stop, echo);
        assert!(table.validate().unwrap_err().contains("reserved"));
    }

    #[test]
    fn test_echo_answers_once() {
        let dir = tempdir().unwrap();
        let ctx = WorkerContext::new(dir.path());
        let response = call(
            &FunctionTable::standard(),
            &ctx,
            Request::new(Opcode::Echo, vec![json!({"n": 42})]),
        );
        assert_eq!(response, Response::value(json!({"n": 42})));
    }

    #[test]
    fn test_sleep_rejects_bad_argument() {
        let dir = tempdir().unwrap();
        let ctx = WorkerContext::new(dir.path());
        let response = call(
            &FunctionTable::standard(),
            &ctx,
            Request::new(Opcode::Sleep, vec![json!("soon")]),
        );
        assert!(matches!(response, Response::Error { message } if message.contains("milliseconds")));
    }

    #[test]
    fn test_missing_map_is_an_error_response() {
        let dir = tempdir().unwrap();
        let ctx = WorkerContext::new(dir.path());
        let response = call(
            &FunctionTable::standard(),
            &ctx,
            Request::new(Opcode::VectorTable, vec![json!("roads")]),
        );
        assert_eq!(response, Response::error("vector map <roads> not found"));
    }

    #[test]
    fn test_vector_table_with_filter() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("vector")).unwrap();
        fs::write(
            dir.path().join("vector/roads.json"),
            json!({
                "columns": [{"name": "cat", "type": "integer"}],
                "rows": [[1], [2], [3]]
            })
            .to_string(),
        )
        .unwrap();

        let ctx = WorkerContext::new(dir.path());
        let response = call(
            &FunctionTable::standard(),
            &ctx,
            Request::new(Opcode::VectorTable, vec![json!("roads"), json!("cat > 1")]),
        );
        let Response::Value { value } = response else {
            panic!("expected value, got {:?}", response);
        };
        assert_eq!(value["rows"], json!([[2], [3]]));
    }

    #[test]
    fn test_unknown_feature_type_is_an_error_response() {
        let dir = tempdir().unwrap();
        let ctx = WorkerContext::new(dir.path());
        let response = call(
            &FunctionTable::standard(),
            &ctx,
            Request::new(
                Opcode::VectorFeatures,
                vec![json!("roads"), Value::Null, json!("boundary")],
            ),
        );
        assert!(matches!(response, Response::Error { message } if message.contains("boundary")));
    }

    #[test]
    fn test_send_fatal_writes_marker() {
        let (endpoint, mut reader) = channel();
        endpoint.send_fatal("out of memory");
        let line = reader.read_line().unwrap().unwrap().to_string();
        assert_eq!(Response::from_line(&line).unwrap(), Response::fatal("out of memory"));
    }
}
