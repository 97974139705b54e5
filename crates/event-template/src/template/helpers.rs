//! Event helpers available to every template.
//!
//! - `UnixTime seconds`: a [`Time`] for a Unix timestamp, in local time
//! - `UUIDFromBytes bytes`: canonical UUID text for exactly 16 bytes
//! - `Hostname`: the current host name, or an empty string
//!
//! ```text
//! {{ (UnixTime .Check.Executed).Format "2 Jan 2006 15:04:05" }}
//! {{ UUIDFromBytes .ID }} on {{ Hostname }}
//! ```

use std::sync::Arc;

use uuid::Uuid;

use super::funcs::{args0, args1, int_arg, FuncError, FuncResult, Funcs};
use super::value::Value;
use crate::time::Time;

/// Source of the host name reported by `Hostname`.
pub type HostnameProvider = Arc<dyn Fn() -> String + Send + Sync>;

/// Reads the host name from the operating system.
///
/// Returns an empty string when it cannot be determined.
pub fn system_hostname() -> String {
    match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(err) => {
            tracing::debug!(error = %err, "hostname lookup failed");
            String::new()
        }
    }
}

/// Registers `UnixTime`, `UUIDFromBytes` and `Hostname` on `funcs`.
pub(crate) fn register(funcs: &mut Funcs, hostname: HostnameProvider) {
    funcs.add("UnixTime", unix_time);
    funcs.add("UUIDFromBytes", uuid_from_bytes);
    funcs.add("Hostname", move |args| {
        args0("Hostname", args)?;
        Ok(Value::String(hostname()))
    });
}

fn unix_time(args: &[Value]) -> FuncResult {
    let seconds = int_arg("UnixTime", args1("UnixTime", args)?)?;
    Time::from_unix(seconds)
        .map(Value::Time)
        .ok_or_else(|| FuncError::new(format!("UnixTime: timestamp {seconds} is out of range")))
}

/// Accepts bytes or a list of integers in `0..=255`. Nil counts as no bytes.
fn uuid_from_bytes(args: &[Value]) -> FuncResult {
    let bytes = bytes_of(args1("UUIDFromBytes", args)?)?;
    let uuid = Uuid::from_slice(&bytes).map_err(|_| {
        FuncError::new(format!(
            "invalid UUID (got {} bytes, expected 16)",
            bytes.len()
        ))
    })?;
    Ok(Value::String(uuid.to_string()))
}

fn bytes_of(value: &Value) -> Result<Vec<u8>, FuncError> {
    let not_bytes = || {
        FuncError::new(format!(
            "UUIDFromBytes: expected bytes, got {}",
            value.kind()
        ))
    };
    match value {
        Value::Bytes(bytes) => Ok(bytes.clone()),
        Value::Nil => Ok(Vec::new()),
        Value::List(items) => items
            .iter()
            .map(|item| match item {
                Value::Int(i) => u8::try_from(*i).map_err(|_| not_bytes()),
                _ => Err(not_bytes()),
            })
            .collect(),
        _ => Err(not_bytes()),
    }
}
