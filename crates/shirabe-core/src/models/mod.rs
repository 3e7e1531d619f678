pub mod content;
pub mod media;

pub use content::*;
pub use media::*;
