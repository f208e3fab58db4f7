pub mod chat;
pub mod create_page;
pub mod decide;
pub mod final_answer;
pub mod generate;
pub mod prepare_rag;
pub mod search;
