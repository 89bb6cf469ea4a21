pub mod error_shapes;
pub mod mapping;
pub mod openai_chat;
pub mod openai_completion;
pub mod parts;
pub mod validate;
