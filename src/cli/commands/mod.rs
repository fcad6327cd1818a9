pub mod keystore;
pub mod overrides;
pub mod resolve;
pub mod secret;
pub mod settings;
pub mod show;
