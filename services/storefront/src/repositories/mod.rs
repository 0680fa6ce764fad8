//! Storefront repositories

pub mod appointments;
pub mod password_resets;
pub mod products;
pub mod quotes;
pub mod services;
pub mod users;

pub use appointments::AppointmentRepository;
pub use password_resets::PasswordResetRepository;
pub use products::ProductRepository;
pub use quotes::QuoteRepository;
pub use services::ServiceRepository;
pub use users::UserRepository;
