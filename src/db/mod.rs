pub mod challenges;
pub mod content;
pub mod sessions;
pub mod users;
pub mod workshops;

pub use challenges::*;
pub use content::*;
pub use sessions::*;
pub use users::*;
pub use workshops::*;
