//! IPC protocol between the supervisor and its worker process.
//!
//! Messages are JSON-serialized and newline-delimited. A request is an opcode
//! plus positional arguments; a response is either a value, an application
//! error, or the fatal marker that ends a worker generation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Selects the worker-side function a request invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Opcode {
    /// Close the channel and exit the worker. Never answered.
    Stop,
    /// Attribute table of a vector map.
    VectorTable,
    /// Vector features as `(id, cat, wkb)` triples.
    VectorFeatures,
    /// Raster window rendered to a pixel array.
    RasterImage,
    /// Return the first argument unchanged.
    Echo,
    /// Sleep for the given number of milliseconds, then answer. Diagnostic.
    Sleep,
    /// Trigger the native fatal error handler. Diagnostic.
    Fatal,
}

impl Opcode {
    /// Every opcode, in wire order.
    pub const ALL: [Opcode; 7] = [
        Opcode::Stop,
        Opcode::VectorTable,
        Opcode::VectorFeatures,
        Opcode::RasterImage,
        Opcode::Echo,
        Opcode::Sleep,
        Opcode::Fatal,
    ];

    /// The wire value of this opcode.
    pub const fn code(self) -> u8 {
        match self {
            Opcode::Stop => 0,
            Opcode::VectorTable => 1,
            Opcode::VectorFeatures => 2,
            Opcode::RasterImage => 3,
            Opcode::Echo => 4,
            Opcode::Sleep => 5,
            Opcode::Fatal => 14,
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Opcode::ALL
            .into_iter()
            .find(|op| op.code() == code)
            .ok_or_else(|| format!("unregistered opcode {}", code))
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> Self {
        op.code()
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Opcode::Stop => "STOP",
            Opcode::VectorTable => "VECTOR_TABLE",
            Opcode::VectorFeatures => "VECTOR_FEATURES",
            Opcode::RasterImage => "RASTER_IMAGE",
            Opcode::Echo => "ECHO",
            Opcode::Sleep => "SLEEP",
            Opcode::Fatal => "FATAL",
        };
        write!(f, "{}({})", name, self.code())
    }
}

/// Request from supervisor to worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub opcode: Opcode,
    #[serde(default)]
    pub args: Vec<Value>,
}

/// Response from worker to supervisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    /// Result produced by the worker function.
    #[serde(rename = "value")]
    Value { value: Value },

    /// The function ran but could not satisfy the request.
    #[serde(rename = "error")]
    Error { message: String },

    /// The worker is dying; nothing else will arrive from this generation.
    #[serde(rename = "fatal")]
    Fatal { message: String },
}

impl Request {
    pub fn new(opcode: Opcode, args: Vec<Value>) -> Self {
        Self { opcode, args }
    }

    pub fn stop() -> Self {
        Self::new(Opcode::Stop, Vec::new())
    }

    /// Positional argument, or `Value::Null` when absent.
    pub fn arg(&self, index: usize) -> &Value {
        self.args.get(index).unwrap_or(&Value::Null)
    }

    /// Serialize to JSON line (with newline).
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut json = serde_json::to_string(self)?;
        json.push('\n');
        Ok(json)
    }

    /// Deserialize from JSON line.
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}

impl Response {
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value {
            value: value.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }

    /// Serialize to JSON line (with newline).
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut json = serde_json::to_string(self)?;
        json.push('\n');
        Ok(json)
    }

    /// Deserialize from JSON line.
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}
