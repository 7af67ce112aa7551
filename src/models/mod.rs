pub mod job;
pub mod output;
pub mod request;
pub mod response;

pub use job::*;
pub use output::*;
pub use request::*;
pub use response::*;
