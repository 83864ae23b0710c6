mod authenticator;
mod integration;

pub mod clients;
pub mod model;

pub use authenticator::Authenticator;
pub use integration::IntegrationTokens;
