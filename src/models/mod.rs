pub mod event;
pub mod invoice;
pub mod payment;
pub mod person;
pub mod ticket;

pub use event::Event;
pub use invoice::{
    Installment, InstallmentDetail, InstallmentStatus, Invoice, InvoiceDetail, InvoiceStatus,
};
pub use payment::{Payment, PaymentIntent, PaymentMethod, PaymentStatus};
pub use person::Person;
pub use ticket::{Ticket, TicketStatus, TicketType};
