//! Realtime buffer control: the four-state FSM and the hysteresis
//! controller that converts buffer level and consumption rate into
//! delivery-rate and crew recommendations.

mod hysteresis;
mod state_machine;

pub use hysteresis::HysteresisController;
pub use state_machine::{BufferState, BufferStateMachine, StateChanged};
