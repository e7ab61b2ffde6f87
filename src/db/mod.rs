pub mod repository;

pub use repository::{Db, StoreError, TableStore};
