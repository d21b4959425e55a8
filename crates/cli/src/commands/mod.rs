pub mod request;
pub mod session;
