pub mod booking;
pub mod event;
pub mod events;
pub mod ticket;

pub use booking::{Attendee, Booking, PaymentStatus};
pub use event::Event;
pub use ticket::{Ticket, TicketStatus, ValidationOutcome};
