pub mod service;

pub use service::{DeviceSyncData, SettingsSync};
