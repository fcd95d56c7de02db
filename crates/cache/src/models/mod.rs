mod book;

pub(crate) use self::book::{BookRow, NEW_BOOK_COLUMNS, NewBookRow};
