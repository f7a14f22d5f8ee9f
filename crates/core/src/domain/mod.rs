pub mod agent;
pub mod constraint;
pub mod transaction;
pub mod user;
