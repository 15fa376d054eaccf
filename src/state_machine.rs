//! Chat session state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions: the
//! runtime feeds events in, gets a new state plus effects back, and performs
//! the effects.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;


pub use effect::Effect;
pub use event::Event;
pub use state::{SessionContext, SessionState};
pub use transition::{transition, TransitionError, TransitionResult};
