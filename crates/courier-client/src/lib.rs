pub mod config;
pub mod delivery;
pub mod handlers;
pub mod outbound;
pub mod registration;
pub mod relay;

pub use delivery::{discard_pending, DeliveryLoop, Step, StepOutcome};
pub use handlers::{AutoResponder, ConsoleHandler, InboundMessage, MessageHandler};
pub use relay::{ErrorClass, HttpRelay, RelayError, RelayTransport};
