#[cfg(feature = "provider-google")]
pub mod google;

#[cfg(feature = "provider-google")]
pub use google::GoogleGenAi;
