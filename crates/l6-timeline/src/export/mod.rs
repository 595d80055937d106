pub mod jsonl;
pub mod script;
