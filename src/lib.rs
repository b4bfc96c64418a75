pub mod config;
pub mod extract;
pub mod fetch;
pub mod history;
pub mod ocr;
pub mod pipeline;
pub mod sheets;
