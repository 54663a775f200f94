pub mod data_item;
pub mod document;
pub mod solution;
