pub mod ack;
pub mod decrypted;
pub mod fetch;
pub mod pipeline;
pub mod rest_client;
pub mod validator;
