pub mod confirmation;
pub mod health;
pub mod webhook;

pub use confirmation::confirm;
pub use health::health_check;
pub use webhook::{stripe_webhook, webhook_method_not_allowed};
