pub mod service;
pub mod tracking_code;
