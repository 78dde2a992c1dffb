pub mod confirmation_token;
pub mod payment_event;
pub mod processed_event;

pub use confirmation_token::{ConfirmationToken, NewConfirmationToken, TokenInsert};
pub use payment_event::{EventType, PaymentEvent, PaymentEventData, PaymentIntent};
pub use processed_event::ProcessedEvent;
