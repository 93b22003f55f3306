pub mod biology;
pub mod enums;
pub mod medication;
pub mod scan;
pub mod schedule;
pub mod user;

pub use biology::*;
pub use medication::*;
pub use scan::*;
pub use schedule::*;
pub use user::*;
