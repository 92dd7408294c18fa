pub mod spellcheck;
