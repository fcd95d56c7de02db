mod author;
mod metadata;

pub use self::author::Author;
pub use self::metadata::Metadata;
