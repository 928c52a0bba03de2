//! Device capability for the translation cache.
//!
//! The translation cache never owns memory. During layout it asks the device for texture
//! references, and during linking for the concrete address of every global variable a
//! translation touches. [`Device`] is that narrow interface; [`HostDevice`] implements it
//! over process memory for CPU execution.

pub mod device;
pub mod error;
pub mod host;


pub use device::{Device, DeviceAddress, TextureHandle};
pub use error::{Error, Result};
pub use host::{HostDevice, Texture};
