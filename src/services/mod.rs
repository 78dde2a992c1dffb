pub mod confirmation;
pub mod dispatcher;
pub mod email;
pub mod retention;
pub mod webhook;

pub use confirmation::{ConfirmationTokenService, generate_token};
pub use dispatcher::{DispatchOutcome, EventDispatcher};
pub use email::EmailService;
pub use retention::ProcessedEventPurger;
pub use webhook::WebhookVerifier;
