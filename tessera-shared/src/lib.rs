pub mod models;
pub mod pii;

pub use models::{
    Attendee, Booking, Event, PaymentStatus, Ticket, TicketStatus, ValidationOutcome,
};
pub use pii::Masked;
