//! MessagePack RPC bridge
//!
//! Talks to a co-operative subprocess over stdin/stdout using a
//! length-prefixed binary protocol:
//!
//! - Frame: 4-byte big-endian unsigned length, then a MessagePack payload
//!   of exactly that length.
//! - Request: map `{"c": method_name, "a": kwargs_map}`.
//! - Response: map with `{"r": result}` on success or `{"e": message}` on
//!   remote error. A response carrying neither key is a protocol error.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::UllError;
use crate::metadata::BridgeKind;

use super::proc::terminate_child;
use super::{Bridge, FunctionDescription};

/// Grace period between SIGTERM and SIGKILL on close
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Window in which a freshly launched server must still be alive
const LAUNCH_CHECK: Duration = Duration::from_millis(200);

#[derive(Serialize)]
struct RpcRequest<'a> {
    c: &'a str,
    a: &'a serde_json::Map<String, Value>,
}

/// Framed request/response exchange over any byte stream pair
///
/// The bridge itself wires this to a child process's stdio; tests wire it
/// to an in-memory socket pair. The wire format is identical either way.
#[derive(Debug)]
pub struct RpcTransport<R: Read, W: Write> {
    reader: R,
    writer: W,
}

impl<R: Read, W: Write> RpcTransport<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Send one request frame and block for the response frame
    pub fn call(&mut self, method: &str, args: &serde_json::Map<String, Value>) -> Result<Value, UllError> {
        debug!(%method, arg_count = args.len(), "RpcTransport::call: sending request");

        let payload = rmp_serde::to_vec_named(&RpcRequest { c: method, a: args })
            .map_err(|e| UllError::Protocol(format!("Failed to encode request for '{}': {}", method, e)))?;

        self.write_frame(&payload)
            .map_err(|e| UllError::Rpc(format!("Failed to send request '{}': {}", method, e)))?;

        let response_bytes = self.read_frame(method)?;

        let response: Value = rmp_serde::from_slice(&response_bytes)
            .map_err(|e| UllError::Protocol(format!("Failed to deserialize response for '{}': {}", method, e)))?;

        let map = response
            .as_object()
            .ok_or_else(|| UllError::Protocol(format!("Response for '{}' is not a map", method)))?;

        if let Some(e) = map.get("e") {
            let message = e.as_str().unwrap_or("unknown remote error");
            debug!(%method, %message, "RpcTransport::call: remote error");
            return Err(UllError::Rpc(format!("Remote method raised exception: {}\n  Error: {}", method, message)));
        }

        match map.get("r") {
            Some(r) => Ok(r.clone()),
            None => Err(UllError::Protocol(format!(
                "Invalid response format (missing 'r' and 'e' keys)\n  Method: {}",
                method
            ))),
        }
    }

    fn write_frame(&mut self, payload: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(&(payload.len() as u32).to_be_bytes())?;
        self.writer.write_all(payload)?;
        self.writer.flush()
    }

    fn read_frame(&mut self, method: &str) -> Result<Vec<u8>, UllError> {
        let mut length_bytes = [0u8; 4];
        self.reader
            .read_exact(&mut length_bytes)
            .map_err(|e| UllError::Rpc(format!("Failed to read response length header\n  Method: {}\n  Error: {}", method, e)))?;

        let length = u32::from_be_bytes(length_bytes) as usize;
        let mut payload = vec![0u8; length];
        self.reader.read_exact(&mut payload).map_err(|e| {
            UllError::Rpc(format!(
                "Failed to read complete response\n  Expected {} bytes\n  Method: {}\n  Error: {}",
                length, method, e
            ))
        })?;

        Ok(payload)
    }
}

/// RPC bridge owning the server subprocess
#[derive(Debug)]
pub struct RpcBridge {
    command: Vec<String>,
    child: Option<Child>,
    transport: Option<RpcTransport<std::process::ChildStdout, std::process::ChildStdin>>,
}

impl RpcBridge {
    /// Launch the RPC server subprocess with piped stdio
    ///
    /// Fails when the command cannot be spawned or when the server exits
    /// within the launch-check window.
    pub fn spawn(command: &[String], workspace: Option<&Path>) -> Result<Self, UllError> {
        debug!(?command, ?workspace, "RpcBridge::spawn: called");

        let (program, args) = command
            .split_first()
            .ok_or_else(|| UllError::Load("RPC server command is empty".to_string()))?;

        let mut cmd = Command::new(program);
        cmd.args(args).stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());
        if let Some(dir) = workspace {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            UllError::Load(format!(
                "Failed to start RPC server: command not found\n  Command: {}\n  Error: {}\n  Fix: Ensure runtime is installed (python3, node, dart, etc.)",
                command.join(" "),
                e
            ))
        })?;

        // The server must survive its own startup
        std::thread::sleep(LAUNCH_CHECK);
        if let Ok(Some(status)) = child.try_wait() {
            let mut stderr_output = String::new();
            if let Some(mut stderr) = child.stderr.take() {
                let _ = stderr.read_to_string(&mut stderr_output);
            }
            return Err(UllError::Load(format!(
                "RPC server exited immediately after launch\n  Command: {}\n  Exit code: {}\n  Stderr: {}",
                command.join(" "),
                status.code().unwrap_or(-1),
                stderr_output
            )));
        }

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| UllError::Load("RPC server stdin pipe missing".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| UllError::Load("RPC server stdout pipe missing".to_string()))?;

        debug!(pid = child.id(), "RpcBridge::spawn: server running");
        Ok(Self {
            command: command.to_vec(),
            child: Some(child),
            transport: Some(RpcTransport::new(stdout, stdin)),
        })
    }

    fn check_alive(&mut self) -> Result<(), UllError> {
        let Some(child) = self.child.as_mut() else {
            return Err(UllError::Load("RPC bridge already closed".to_string()));
        };
        if let Ok(Some(status)) = child.try_wait() {
            let mut stderr_output = String::new();
            if let Some(mut stderr) = child.stderr.take() {
                let _ = stderr.read_to_string(&mut stderr_output);
            }
            return Err(UllError::Load(format!(
                "RPC server process has died\n  Command: {}\n  Exit code: {}\n  Stderr: {}",
                self.command.join(" "),
                status.code().unwrap_or(-1),
                stderr_output
            )));
        }
        Ok(())
    }
}

impl Bridge for RpcBridge {
    fn kind(&self) -> BridgeKind {
        BridgeKind::Rpc
    }

    fn invoke(&mut self, method: &str, args: &serde_json::Map<String, Value>) -> Result<Value, UllError> {
        self.check_alive()?;
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| UllError::Load("RPC bridge already closed".to_string()))?;
        transport.call(method, args)
    }

    fn has_function(&mut self, name: &str) -> bool {
        // The server only reveals its surface through describe; without it,
        // any method is assumed reachable until an invoke says otherwise.
        match self.describe() {
            Some(functions) => functions.contains_key(name),
            None => true,
        }
    }

    fn describe(&mut self) -> Option<BTreeMap<String, FunctionDescription>> {
        let result = self.invoke("describe", &serde_json::Map::new()).ok()?;
        match serde_json::from_value(result) {
            Ok(functions) => Some(functions),
            Err(e) => {
                warn!(error = %e, "RpcBridge::describe: server returned undecodable description");
                None
            }
        }
    }

    fn close(&mut self) {
        self.transport = None;
        if let Some(mut child) = self.child.take() {
            terminate_child(&mut child, CLOSE_GRACE);
        }
    }
}

impl Drop for RpcBridge {
    fn drop(&mut self) {
        if self.child.is_some() {
            self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixStream;

    /// Minimal echo/add server speaking the wire protocol over any stream
    fn serve_one_connection(stream: UnixStream) {
        let mut reader = stream.try_clone().unwrap();
        let mut writer = stream;

        loop {
            let mut length_bytes = [0u8; 4];
            if reader.read_exact(&mut length_bytes).is_err() {
                return;
            }
            let length = u32::from_be_bytes(length_bytes) as usize;
            let mut payload = vec![0u8; length];
            reader.read_exact(&mut payload).unwrap();

            let request: Value = rmp_serde::from_slice(&payload).unwrap();
            let method = request["c"].as_str().unwrap().to_string();
            let args = request["a"].clone();

            let response = match method.as_str() {
                "add" => {
                    let sum = args["a"].as_i64().unwrap() + args["b"].as_i64().unwrap();
                    serde_json::json!({"r": sum})
                }
                "echo" => serde_json::json!({"r": args["v"]}),
                "bare" => serde_json::json!({"x": 1}),
                _ => serde_json::json!({"e": format!("Unknown method: {}", method)}),
            };

            let encoded = rmp_serde::to_vec_named(&response).unwrap();
            writer.write_all(&(encoded.len() as u32).to_be_bytes()).unwrap();
            writer.write_all(&encoded).unwrap();
            writer.flush().unwrap();
        }
    }

    fn transport_pair() -> (RpcTransport<UnixStream, UnixStream>, std::thread::JoinHandle<()>) {
        let (client, server) = UnixStream::pair().unwrap();
        let handle = std::thread::spawn(move || serve_one_connection(server));
        let reader = client.try_clone().unwrap();
        (RpcTransport::new(reader, client), handle)
    }

    fn args(pairs: &[(&str, Value)]) -> serde_json::Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_rpc_add_round_trip() {
        let (mut transport, _handle) = transport_pair();

        let result = transport
            .call("add", &args(&[("a", Value::from(2)), ("b", Value::from(3))]))
            .unwrap();
        assert_eq!(result, Value::from(5));
    }

    #[test]
    fn test_rpc_echo_preserves_value() {
        let (mut transport, _handle) = transport_pair();

        let nested = serde_json::json!({"list": [1, 2, 3], "name": "x", "flag": true});
        let result = transport.call("echo", &args(&[("v", nested.clone())])).unwrap();
        assert_eq!(result, nested);
    }

    #[test]
    fn test_rpc_unknown_method_errors() {
        let (mut transport, _handle) = transport_pair();

        let err = transport.call("foo", &serde_json::Map::new()).unwrap_err();
        assert!(err.to_string().contains("Unknown method"));
    }

    #[test]
    fn test_rpc_response_without_r_or_e_is_protocol_error() {
        let (mut transport, _handle) = transport_pair();

        let err = transport.call("bare", &serde_json::Map::new()).unwrap_err();
        assert!(matches!(err, UllError::Protocol(_)));
    }

    #[test]
    fn test_request_frame_is_length_prefixed_named_map() {
        // Verify the exact bytes on the wire: uint32 BE length, then a
        // msgpack map with string keys "c" and "a".
        let mut buffer = Vec::new();
        {
            let mut transport = RpcTransport::new(std::io::empty(), &mut buffer);
            // No response will come back from an empty reader; only the
            // written request bytes matter here.
            let _ = transport.call("ping", &serde_json::Map::new());
        }

        let length = u32::from_be_bytes(buffer[..4].try_into().unwrap()) as usize;
        assert_eq!(length, buffer.len() - 4);

        let decoded: Value = rmp_serde::from_slice(&buffer[4..]).unwrap();
        assert_eq!(decoded["c"], "ping");
        assert!(decoded["a"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_spawn_missing_command_fails() {
        let err = RpcBridge::spawn(&["definitely-not-a-real-binary-xyz".to_string()], None).unwrap_err();
        assert!(err.to_string().contains("command not found"));
    }

    #[test]
    fn test_spawn_immediate_exit_reports_stderr() {
        let command = vec!["sh".to_string(), "-c".to_string(), "echo boom >&2; exit 3".to_string()];
        let err = RpcBridge::spawn(&command, None).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("exited immediately"));
        assert!(msg.contains("boom"));
    }

    #[test]
    fn test_close_terminates_server() {
        // A server that ignores the protocol and just sleeps
        let command = vec!["sh".to_string(), "-c".to_string(), "sleep 60".to_string()];
        let mut bridge = RpcBridge::spawn(&command, None).unwrap();
        bridge.close();
        // Closed bridge refuses further calls
        let err = bridge.invoke("anything", &serde_json::Map::new()).unwrap_err();
        assert!(err.to_string().contains("closed"));
    }
}
