//! Process wide network subsystem state.
//!
//! Every transport calls [`ensure_initialized`] before touching the network. [`shutdown`] is
//! meant to run once at process exit; afterwards no new transport can be built.

use parking_lot::{const_mutex, Mutex};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum State {
    Uninitialized,
    Ready,
    ShutDown,
}

static STATE: Mutex<State> = const_mutex(State::Uninitialized);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubsystemError {
    #[error("network subsystem already shut down")]
    ShutDown,
}

/// Bring the subsystem up if it is not already. Safe to call any number of times.
pub fn ensure_initialized() -> Result<(), SubsystemError> {
    let mut state = STATE.lock();
    match *state {
        State::Ready => Ok(()),
        State::ShutDown => Err(SubsystemError::ShutDown),
        State::Uninitialized => {
            info!("network subsystem initialized");
            *state = State::Ready;
            Ok(())
        }
    }
}

pub fn is_initialized() -> bool {
    *STATE.lock() == State::Ready
}

/// Tear the subsystem down. Transports already built keep working, new ones fail to build.
pub fn shutdown() {
    let mut state = STATE.lock();
    if *state == State::ShutDown {
        debug!("network subsystem already shut down");
        return;
    }
    info!("network subsystem shut down");
    *state = State::ShutDown;
}
