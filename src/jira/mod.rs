pub mod client;
pub mod jql;
pub mod model;
pub mod service;
