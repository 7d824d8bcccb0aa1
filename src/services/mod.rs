pub mod booking;
pub mod driver;
pub mod fanout;
pub mod notify;
pub mod pricing;
pub mod rating;
pub mod resolution;
pub mod session;

#[cfg(test)]
pub(crate) mod fixtures;
