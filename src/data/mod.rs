pub mod backup;
pub mod fetcher;
pub mod listing;
pub mod spreadsheet;
