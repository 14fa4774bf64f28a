#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod description;
pub mod direction;
pub mod util;

pub use description::common::{Attribute, ConnectionInformation};
pub use description::media::{MediaDescription, MediaName, RangedPort};
pub use description::session::{Origin, SessionDescription, TimeDescription, Timing};

pub const MEDIA_SECTION_APPLICATION: &str = "application";
pub const MEDIA_SECTION_AUDIO: &str = "audio";
pub const MEDIA_SECTION_VIDEO: &str = "video";
