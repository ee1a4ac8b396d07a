pub mod detection;
pub mod image;
pub mod matching;
pub mod record;
