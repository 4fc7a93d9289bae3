//! Domain types of the wallet and the ports the engine drives.

pub mod balance;
pub mod bank_account;
pub mod payment;
pub mod ports;
pub mod transaction;
