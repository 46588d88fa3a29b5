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

//! Parsing of raw JSON lines into RPC objects.

use std::io::BufRead;

use serde_json::Value;

use crate::error::{ReadError, RemoteError};

/// A unique identifier attached to request RPCs.
pub type RequestId = u64;

/// A request's result: either a JSON value or a wire error.
pub type Response = Result<Value, RemoteError>;

/// A single method call received from the peer.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcCall {
    pub method: String,
    pub params: Value,
}

/// Reads newline-delimited JSON messages off a stream, reusing a single
/// line buffer.
#[derive(Debug, Default)]
pub struct MessageReader(String);

impl MessageReader {
    /// Attempts to read the next message, blocking until a full line is
    /// available.
    pub fn next<R: BufRead>(&mut self, reader: &mut R) -> Result<RpcObject, ReadError> {
        self.0.clear();
        let bytes_read = reader.read_line(&mut self.0)?;
        if bytes_read == 0 {
            return Err(ReadError::Disconnect);
        }
        self.parse(&self.0)
    }

    /// Parses a single message. Exposed for testing.
    pub fn parse(&self, s: &str) -> Result<RpcObject, ReadError> {
        let value = serde_json::from_str::<Value>(s)?;
        if !value.is_object() {
            Err(ReadError::NotObject)
        } else {
            Ok(RpcObject(value))
        }
    }
}

/// A parsed JSON message, not yet classified as request, notification or
/// response.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcObject(pub Value);

impl RpcObject {
    pub fn get_id(&self) -> Option<RequestId> {
        self.0.get("id").and_then(Value::as_u64)
    }

    pub fn get_method(&self) -> Option<&str> {
        self.0.get("method").and_then(Value::as_str)
    }

    /// A message with an `id` and no `method` is a response to one of our
    /// requests.
    pub fn is_response(&self) -> bool {
        self.0.get("id").is_some() && self.0.get("method").is_none()
    }

    /// Converts a response object into a `Response`, failing with a
    /// description when the body does not contain exactly one of `result`
    /// and `error`.
    pub fn into_response(mut self) -> Result<Response, String> {
        self.get_id().ok_or("response missing the 'id' field")?;
        if self.0.get("result").is_some() == self.0.get("error").is_some() {
            return Err(
                "response must contain exactly one of the 'error' or 'result' fields".to_string(),
            );
        }
        let result = self.0.as_object_mut().and_then(|obj| obj.remove("result"));
        match result {
            Some(result) => Ok(Ok(result)),
            None => {
                let error = self
                    .0
                    .as_object_mut()
                    .and_then(|obj| obj.remove("error"))
                    .ok_or("error field disappeared")?;
                match serde_json::from_value::<RemoteError>(error) {
                    Ok(error) => Ok(Err(error)),
                    Err(err) => Err(format!("malformed error body: {}", err)),
                }
            }
        }
    }

    /// Converts a request or notification into an `RpcCall`.
    pub fn into_rpc(self) -> Result<RpcCall, String> {
        let method = match self.get_method() {
            Some(method) => method.to_string(),
            None => return Err("message missing the 'method' field".to_string()),
        };
        let params = self.0.get("params").cloned().unwrap_or(Value::Null);
        Ok(RpcCall { method, params })
    }
}
