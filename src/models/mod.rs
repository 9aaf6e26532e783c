pub mod confirmation;
pub mod link;
pub mod webhook;
