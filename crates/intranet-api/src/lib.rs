pub mod auth;
pub mod clock;
pub mod error;
pub mod middleware;
pub mod otp;
pub mod phone;
pub mod session;
pub mod store;
pub mod submission;
pub mod suggestions;
