pub mod guards;
pub mod identity;
pub mod oauth;
pub mod role;
pub mod user;

pub use guards::*;
pub use identity::*;
pub use role::*;
pub use user::*;
