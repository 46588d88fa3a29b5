// Copyright 2026 The Warden Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types for sending and receiving RPCs.

use std::error;
use std::fmt;
use std::io;

use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use serde_json::{Error as JsonError, Value};

/// Errors that can occur when sending an RPC.
#[derive(Debug)]
pub enum Error {
    /// An IO error occurred on the underlying communication channel.
    IoError(io::Error),
    /// The peer returned an error response.
    RemoteError(RemoteError),
    /// The peer closed its connection.
    PeerDisconnect,
    /// The peer sent a response with the right id but a malformed body.
    InvalidResponse,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::IoError(err) => write!(f, "io error: {}", err),
            Error::RemoteError(err) => write!(f, "remote error: {}", err),
            Error::PeerDisconnect => write!(f, "peer disconnected"),
            Error::InvalidResponse => write!(f, "peer sent an invalid response"),
        }
    }
}

impl error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

impl From<RemoteError> for Error {
    fn from(err: RemoteError) -> Error {
        Error::RemoteError(err)
    }
}

/// Errors that can occur while reading an RPC off the wire.
#[derive(Debug)]
pub enum ReadError {
    /// An error reading from the underlying stream.
    Io(io::Error),
    /// The message was not valid JSON.
    Json(JsonError),
    /// The message was JSON, but not a JSON object.
    NotObject,
    /// The stream reached EOF.
    Disconnect,
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReadError::Io(err) => write!(f, "io error: {}", err),
            ReadError::Json(err) => write!(f, "json parse error: {}", err),
            ReadError::NotObject => write!(f, "json message was not an object"),
            ReadError::Disconnect => write!(f, "peer closed the connection"),
        }
    }
}

impl error::Error for ReadError {}

impl From<io::Error> for ReadError {
    fn from(err: io::Error) -> ReadError {
        ReadError::Io(err)
    }
}

impl From<JsonError> for ReadError {
    fn from(err: JsonError) -> ReadError {
        ReadError::Json(err)
    }
}

/// An error sent over the wire, modelled on the JSON-RPC error object:
/// `code`, `message`, and an optional `data` payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteError {
    /// The JSON was valid but not a correctly formed request.
    InvalidRequest(Option<Value>),
    /// The called method is not handled by the peer.
    MethodNotFound(Option<Value>),
    /// The params were not valid for the method.
    InvalidParams(Option<Value>),
    /// A custom, application level error.
    Custom { code: i64, message: String, data: Option<Value> },
}

impl RemoteError {
    /// Creates a new custom error.
    pub fn custom<S, V>(code: i64, message: S, data: V) -> Self
    where
        S: AsRef<str>,
        V: Into<Option<Value>>,
    {
        RemoteError::Custom {
            code,
            message: message.as_ref().to_string(),
            data: data.into(),
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RemoteError::InvalidRequest(_) => write!(f, "invalid request"),
            RemoteError::MethodNotFound(_) => write!(f, "method not found"),
            RemoteError::InvalidParams(_) => write!(f, "invalid params"),
            RemoteError::Custom { code, message, .. } => {
                write!(f, "error {}: {}", code, message)
            }
        }
    }
}

impl error::Error for RemoteError {}

#[derive(Deserialize, Serialize)]
struct ErrorHelper {
    code: i64,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl<'de> Deserialize<'de> for RemoteError {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let helper = ErrorHelper::deserialize(deserializer).map_err(de::Error::custom)?;
        Ok(match helper.code {
            -32600 => RemoteError::InvalidRequest(helper.data),
            -32601 => RemoteError::MethodNotFound(helper.data),
            -32602 => RemoteError::InvalidParams(helper.data),
            _ => RemoteError::Custom {
                code: helper.code,
                message: helper.message,
                data: helper.data,
            },
        })
    }
}

impl Serialize for RemoteError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let (code, message, data) = match self {
            RemoteError::InvalidRequest(d) => (-32600, "Invalid request", d),
            RemoteError::MethodNotFound(d) => (-32601, "Method not found", d),
            RemoteError::InvalidParams(d) => (-32602, "Invalid params", d),
            RemoteError::Custom { code, message, data } => (*code, message.as_str(), data),
        };
        let helper = ErrorHelper { code, message: message.to_string(), data: data.clone() };
        helper.serialize(serializer)
    }
}
