pub mod attachment;
pub mod event;
pub mod link;
pub mod task;
pub mod ticket;
