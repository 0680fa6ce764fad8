//! Storefront models

pub mod appointment;
pub mod catalog;
pub mod password_reset;
pub mod quote;
pub mod user;

// Re-export for convenience
pub use appointment::{Appointment, AppointmentRequest, NewAppointment};
pub use catalog::{
    FeaturedProduct, NewProduct, Product, ProductPage, ProductPayload, ProductSearchQuery,
    ProductUpdate, SearchParams, SeedService, Service, ServicePayload, SortOrder,
};
pub use password_reset::PasswordReset;
pub use quote::{Quote, QuoteReceipt, QuoteRequest, QuoteSubmission};
pub use user::{
    ApiUser, AuthResponse, ForgotPasswordRequest, LoginRequest, NewUser, Profile, RegisterRequest,
    ResetPasswordRequest, Role, UpdateProfileRequest, User,
};
