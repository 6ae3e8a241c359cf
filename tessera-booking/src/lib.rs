pub mod checkout;
pub mod codes;
pub mod dispatch;
pub mod issuer;
pub mod locks;
pub mod orchestrator;
pub mod validator;

pub use checkout::{Checkout, CheckoutRequest, CheckoutService};
pub use dispatch::{Notification, NotificationDispatcher, RetryPolicy};
pub use issuer::{IssueOutcome, IssueRequest, IssueStatus, TicketIssuer};
pub use orchestrator::{MockPaymentAdapter, PaymentOrchestrator};
pub use validator::{TicketValidator, ValidationResult};
