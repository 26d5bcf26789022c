pub mod cli;
pub mod crypto;
pub mod hash;
pub mod random;
