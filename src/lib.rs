//! Dispatch intake: turns facility-maintenance dispatch emails and contractor
//! invoices into draft records for human review.

pub mod config;
pub mod error;
pub mod invoice;
pub mod json;
pub mod llm;
pub mod mailbox;
pub mod pipeline;
pub mod store;
