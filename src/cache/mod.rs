pub mod cover;
pub mod fingerprint;
pub mod store;
