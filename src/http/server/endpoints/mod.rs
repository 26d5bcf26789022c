pub mod capability;
pub mod client;
pub mod discovery;
pub mod oauth;
