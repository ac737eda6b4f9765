pub mod authentication;
pub mod session;
pub mod user;

pub use authentication::*;
pub use session::*;
pub use user::*;
