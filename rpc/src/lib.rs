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

//! Generic RPC handling, used for communication with plugin processes.
//!
//! The wire format is newline-delimited JSON objects. A message with a
//! `method` field is a call; with an `id` it expects a response, without
//! one it is a notification. A message with an `id` and no `method` is a
//! response to an earlier request.

#[macro_use]
extern crate log;
extern crate serde;
#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate serde_json;

mod error;
mod parse;

pub use crate::error::{Error, ReadError, RemoteError};
pub use crate::parse::{MessageReader, Response, RpcCall, RpcObject};

use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use serde_json::Value;

/// A type that handles the calls a peer sends us.
pub trait Handler {
    fn handle_notification(&mut self, rpc: RpcCall);
    fn handle_request(&mut self, rpc: RpcCall) -> Result<Value, RemoteError>;
}

struct RpcState {
    writer: Mutex<Box<dyn Write + Send>>,
    id: AtomicU64,
    pending: Mutex<BTreeMap<u64, mpsc::Sender<Result<Value, Error>>>>,
    disconnected: AtomicBool,
}

/// The write half of a connection to a peer. Cheap to clone, shareable
/// between threads.
pub struct RpcPeer(Arc<RpcState>);

impl Clone for RpcPeer {
    fn clone(&self) -> Self {
        RpcPeer(self.0.clone())
    }
}

impl RpcPeer {
    /// Sends a notification; errors are logged and swallowed, matching the
    /// fire-and-forget contract of notifications.
    pub fn send_rpc_notification(&self, method: &str, params: &Value) {
        if let Err(err) = self.write_json(&json!({
            "method": method,
            "params": params,
        })) {
            warn!("error sending notification {:?}: {}", method, err);
        }
    }

    /// Sends a request and blocks until the peer responds or disconnects.
    pub fn send_rpc_request(&self, method: &str, params: &Value) -> Result<Value, Error> {
        if self.is_disconnected() {
            return Err(Error::PeerDisconnect);
        }
        let id = self.0.id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel();
        self.0.pending.lock().unwrap().insert(id, tx);
        if let Err(err) = self.write_json(&json!({
            "id": id,
            "method": method,
            "params": params,
        })) {
            self.0.pending.lock().unwrap().remove(&id);
            return Err(Error::IoError(err));
        }
        match rx.recv() {
            Ok(response) => response,
            Err(_) => Err(Error::PeerDisconnect),
        }
    }

    /// Sends the response to a request the peer made.
    pub fn respond(&self, response: Response, id: u64) {
        let body = match response {
            Ok(result) => json!({ "id": id, "result": result }),
            Err(error) => json!({ "id": id, "error": error }),
        };
        if let Err(err) = self.write_json(&body) {
            warn!("error sending response to request {}: {}", id, err);
        }
    }

    pub fn is_disconnected(&self) -> bool {
        self.0.disconnected.load(Ordering::Relaxed)
    }

    fn write_json(&self, value: &Value) -> io::Result<()> {
        let mut line = value.to_string();
        line.push('\n');
        let mut writer = self.0.writer.lock().unwrap();
        writer.write_all(line.as_bytes())?;
        writer.flush()
    }

    /// Routes a response from the peer to whichever request is waiting on
    /// it.
    fn handle_response(&self, id: u64, response: Result<Response, String>) {
        let tx = self.0.pending.lock().unwrap().remove(&id);
        match tx {
            Some(tx) => {
                let result = match response {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(remote)) => Err(Error::RemoteError(remote)),
                    Err(msg) => {
                        warn!("invalid response to request {}: {}", id, msg);
                        Err(Error::InvalidResponse)
                    }
                };
                // the requesting thread may have given up; that's fine
                let _ = tx.send(result);
            }
            None => warn!("unexpected response to unknown request {}", id),
        }
    }

    /// Marks the connection dead and fails every in-flight request.
    fn disconnect(&self) {
        self.0.disconnected.store(true, Ordering::Relaxed);
        let pending = std::mem::replace(&mut *self.0.pending.lock().unwrap(), BTreeMap::new());
        for (_, tx) in pending {
            let _ = tx.send(Err(Error::PeerDisconnect));
        }
    }
}

/// A main loop for one peer connection.
///
/// Reading happens on the thread that calls [`RpcLoop::mainloop`]; requests
/// and notifications from the peer are dispatched to the handler on that
/// same thread, while responses are routed to whichever thread is blocked
/// in [`RpcPeer::send_rpc_request`].
pub struct RpcLoop {
    reader: MessageReader,
    peer: RpcPeer,
}

impl RpcLoop {
    /// Creates a new `RpcLoop` writing to the given stream.
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        let state = RpcState {
            writer: Mutex::new(writer),
            id: AtomicU64::new(0),
            pending: Mutex::new(BTreeMap::new()),
            disconnected: AtomicBool::new(false),
        };
        RpcLoop { reader: MessageReader::default(), peer: RpcPeer(Arc::new(state)) }
    }

    pub fn get_peer(&self) -> RpcPeer {
        self.peer.clone()
    }

    /// Runs until the read stream closes or errors. Returns `Ok` on a
    /// clean EOF.
    pub fn mainloop<R, RF, H>(&mut self, rf: RF, handler: &mut H) -> Result<(), ReadError>
    where
        R: BufRead,
        RF: FnOnce() -> R,
        H: Handler,
    {
        let mut stream = rf();
        loop {
            let obj = match self.reader.next(&mut stream) {
                Ok(obj) => obj,
                Err(ReadError::Disconnect) => {
                    self.peer.disconnect();
                    return Ok(());
                }
                Err(err) => {
                    self.peer.disconnect();
                    return Err(err);
                }
            };

            if obj.is_response() {
                // checked by is_response
                let id = match obj.get_id() {
                    Some(id) => id,
                    None => continue,
                };
                self.peer.handle_response(id, obj.into_response());
            } else {
                let id = obj.get_id();
                match obj.into_rpc() {
                    Ok(call) => match id {
                        Some(id) => {
                            let result = handler.handle_request(call);
                            self.peer.respond(result, id);
                        }
                        None => handler.handle_notification(call),
                    },
                    Err(msg) => {
                        warn!("received malformed rpc: {}", msg);
                        if let Some(id) = id {
                            self.peer
                                .respond(Err(RemoteError::InvalidRequest(Some(json!(msg)))), id);
                        }
                    }
                }
            }
        }
    }
}
