pub mod item_table;
pub mod object_store;
