mod session_client;

pub use session_client::{AuthChecker, AuthClientError, SessionClient};
