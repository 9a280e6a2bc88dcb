pub mod antigravity;
pub mod event;
pub mod openai_chat;
