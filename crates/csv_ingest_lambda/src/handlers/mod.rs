pub mod event;
pub mod process_file;
