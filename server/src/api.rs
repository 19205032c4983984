pub mod deployment_info;
pub mod generate;

pub use deployment_info::*;
pub use generate::*;
