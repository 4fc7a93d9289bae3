pub mod account_writer;
pub mod history_writer;
