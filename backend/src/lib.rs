pub mod booking;
pub mod catalog;
pub mod config;
pub mod db;
pub mod payment;

pub mod error;
pub mod money;
