//! Error boundary around adapter bodies
//!
//! Every native function the bridge hands to the runtime goes through
//! [`guarded`]: it recovers the owning environment, flushes released
//! handles, and turns dispatch errors and host panics into script errors
//! so nothing unwinds through the runtime's frames.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use tandem_sdk::{NativeFunction, ScriptError, ScriptResult, ScriptState};

use super::AdapterBody;
use crate::environment::Bridge;
use crate::error::{DispatchError, DispatchResult, HostException};
use crate::logging::log_panic_caught;

/// Wrap an adapter body as a native function
pub(crate) fn guarded(body: AdapterBody) -> NativeFunction {
    let function: NativeFunction = Rc::new(move |state: &mut dyn ScriptState| -> ScriptResult<usize> {
        let bridge = Bridge::from_state(state)?;
        bridge.drain_releases(state);
        run_guarded(&bridge, state, &*body).map_err(ScriptError::from)
    });
    function
}

/// Run `body`, catching host panics when the environment is configured to
pub(crate) fn run_guarded(
    bridge: &Bridge,
    state: &mut dyn ScriptState,
    body: &dyn Fn(&Bridge, &mut dyn ScriptState) -> DispatchResult<usize>,
) -> DispatchResult<usize> {
    if !bridge.config.catch_panics {
        return body(bridge, state);
    }
    match panic::catch_unwind(AssertUnwindSafe(|| body(bridge, state))) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            log_panic_caught(&message);
            Err(DispatchError::Host(HostException::new("panic", message)))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
