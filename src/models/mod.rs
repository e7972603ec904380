pub mod booking;
pub mod order;
pub mod service;
pub mod user;

pub use booking::{Booking, BookingStatus, BookingType, PlanType, BOOKING_DURATION_MINUTES};
pub use order::{Order, OrderStatus};
pub use service::{Service, ServiceCategory};
pub use user::User;
