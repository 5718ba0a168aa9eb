pub mod backend;
pub mod batch;
pub mod job;
pub mod mountable;
