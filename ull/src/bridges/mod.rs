//! Language bridges
//!
//! A bridge adapts one way of talking to a library - in-process load,
//! subprocess RPC, or CLI shell-out - to a single `invoke` surface. Dynamic
//! attribute proxies from the original design are deliberately absent:
//! callers dispatch by method name through `invoke`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::UllError;
use crate::metadata::BridgeKind;

mod cli;
mod direct;
pub(crate) mod proc;
mod rpc;

pub use cli::CliFallbackBridge;
pub use direct::DirectBridge;
pub use rpc::{RpcBridge, RpcTransport};

/// Self-description of one exported function, as reported by co-operative
/// bridges (the `adc_describe` export for direct loads, the `describe`
/// method for RPC servers).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionDescription {
    /// Parameter name -> type label
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,

    /// Return type label, if declared
    #[serde(default)]
    pub returns: Option<String>,

    /// Documentation string, if the bridge can see one
    #[serde(default)]
    pub doc: Option<String>,
}

/// A loaded library, reachable through exactly one bridge at a time
pub trait Bridge: Send + std::fmt::Debug {
    /// Which bridge variant this is
    fn kind(&self) -> BridgeKind;

    /// Call a library function by name with keyword arguments
    fn invoke(&mut self, method: &str, args: &serde_json::Map<String, Value>) -> Result<Value, UllError>;

    /// Check whether a function with this name is reachable
    fn has_function(&mut self, name: &str) -> bool;

    /// Ask the library to describe its exported functions
    ///
    /// Returns None when the bridge (or the library behind it) cannot
    /// self-describe; verification then degrades to presence checks.
    fn describe(&mut self) -> Option<BTreeMap<String, FunctionDescription>>;

    /// Release the library; terminates any subprocess the bridge owns
    fn close(&mut self);
}
