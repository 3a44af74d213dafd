//! Control service: the three-tier closed loop plus its plumbing
//! (typed event bus and the lock-protected observability facade).

mod events;
mod facade;
mod service;

pub use events::{DomainEvent, EventBus};
pub use facade::{FacadeSnapshot, ObservabilityFacade};
pub use service::ControlService;
