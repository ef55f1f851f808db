//! Core domain types and services.

pub mod account;
pub mod account_service;
pub mod config_validation;
pub mod credentials;
pub mod error;
pub mod predicate;
pub mod stock;
pub mod stock_service;
