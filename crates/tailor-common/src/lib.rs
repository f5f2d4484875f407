pub mod chat;
pub mod embedding;
pub mod error;
pub mod openai;
pub mod usage;
pub mod vectordb;
