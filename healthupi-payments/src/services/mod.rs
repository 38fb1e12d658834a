pub mod events;
pub mod memory;
pub mod metrics;
pub mod payments;
pub mod razorpay;
pub mod repository;
pub mod side_effects;

pub use events::PaymentEvent;
pub use memory::InMemoryOrderStore;
pub use metrics::{get_metrics, init_metrics};
pub use payments::{PaymentProcessor, TransitionOutcome};
pub use razorpay::RazorpayClient;
pub use repository::{MongoOrderStore, OrderStore};
pub use side_effects::{
    ConfirmationNotifier, EntitlementGranter, HttpConfirmationNotifier, MongoEntitlements,
};
