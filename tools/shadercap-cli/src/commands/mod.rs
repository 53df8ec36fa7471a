pub mod capture;
pub mod check;
pub mod config;
